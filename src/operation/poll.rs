//! Fixed-interval polling shared by operation, status and transport waits.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use crate::gateway::ComputeError;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_ATTEMPTS: u32 = 30;

/// Fixed interval and attempt budget applied to every wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    interval: Duration,
    attempts: u32,
}

impl PollPolicy {
    /// Creates a policy; an attempt budget of zero is raised to one.
    #[must_use]
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self {
            interval,
            attempts: if attempts == 0 { 1 } else { attempts },
        }
    }

    /// Delay between two polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum number of polls.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Total patience: `interval * attempts`.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL, DEFAULT_ATTEMPTS)
    }
}

/// Receives human-readable progress notifications during waits.
pub trait ProgressSink: Send + Sync {
    /// Reports one progress message.
    fn report_progress(&self, message: &str);
}

/// Progress sink that emits `info!` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report_progress(&self, message: &str) {
        info!(target: "gce_machines::progress", "{message}");
    }
}

/// Polls `probe` until it yields a value or the budget runs out.
///
/// The probe runs at most `policy.attempts()` times. Between two probes the
/// elapsed and total wait are reported and the loop sleeps for one interval,
/// so success on the k-th probe produces k-1 progress reports.
pub(crate) async fn poll_until<T, F, Fut>(
    policy: PollPolicy,
    progress: &dyn ProgressSink,
    subject: &str,
    mut probe: F,
) -> Result<T, ComputeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ComputeError>>,
{
    let total = policy.total();
    for attempt in 1..=policy.attempts() {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if attempt == policy.attempts() {
            break;
        }
        let elapsed = policy.interval().saturating_mul(attempt);
        progress.report_progress(&format!("waited {elapsed:?}/{total:?} for {subject}"));
        sleep(policy.interval()).await;
    }

    Err(ComputeError::PollTimeout {
        subject: subject.to_owned(),
        attempts: policy.attempts(),
        waited: total,
    })
}
