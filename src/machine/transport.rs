//! Seams towards the transport and convergence layers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{ConnectionTarget, MachineError, MachineSpec};
use crate::operation::ProgressSink;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Future returned by [`TransportProbe::available`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

/// Future returned by [`ConvergenceCleanup::cleanup`].
pub type CleanupFuture<'a> = Pin<Box<dyn Future<Output = Result<(), MachineError>> + Send + 'a>>;

/// Checks whether a machine accepts connections yet.
pub trait TransportProbe: Send + Sync {
    /// Returns true once the target can be connected to.
    fn available<'a>(&'a self, target: &'a ConnectionTarget) -> ProbeFuture<'a>;
}

/// Probe that opens a TCP connection to the SSH port.
#[derive(Clone, Copy, Debug)]
pub struct TcpProbe {
    connect_timeout: Duration,
}

impl TcpProbe {
    /// Creates a probe giving up on each attempt after `connect_timeout`.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(CONNECT_TIMEOUT)
    }
}

impl TransportProbe for TcpProbe {
    fn available<'a>(&'a self, target: &'a ConnectionTarget) -> ProbeFuture<'a> {
        Box::pin(async move {
            let addr = (target.host.as_str(), target.port);
            let connect = timeout(self.connect_timeout, TcpStream::connect(addr)).await;
            matches!(connect, Ok(Ok(_)))
        })
    }
}

/// Tears down whatever configuration management left behind for a machine.
pub trait ConvergenceCleanup: Send + Sync {
    /// Runs after a machine has been destroyed, whether or not it existed.
    fn cleanup<'a>(
        &'a self,
        progress: &'a dyn ProgressSink,
        spec: &'a MachineSpec,
    ) -> CleanupFuture<'a>;
}

/// Cleanup that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCleanup;

impl ConvergenceCleanup for NoopCleanup {
    fn cleanup<'a>(
        &'a self,
        _progress: &'a dyn ProgressSink,
        _spec: &'a MachineSpec,
    ) -> CleanupFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
