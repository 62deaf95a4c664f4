//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, MutexGuard};

use crate::gateway::{
    ApiRequest, ComputeGateway, ExecutorFuture, RawResponse, RequestExecutor, TransportError,
};
use crate::operation::{PollPolicy, ProgressSink};

/// Project used by scripted gateways.
pub const TEST_PROJECT: &str = "test-project";
/// Zone used by scripted gateways.
pub const TEST_ZONE: &str = "europe-west1-b";

#[derive(Debug, Default)]
struct ScriptState {
    responses: VecDeque<Result<RawResponse, TransportError>>,
    requests: Vec<ApiRequest>,
}

/// Scripted request executor that replays queued responses in FIFO order.
///
/// Every request is recorded so tests can assert on the exact calls made.
#[derive(Clone, Debug, Default)]
pub struct ScriptedExecutor {
    state: Arc<StdMutex<ScriptState>>,
}

impl ScriptedExecutor {
    /// Creates an executor with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response with the given status and JSON body.
    pub fn push_json(&self, status: u16, body: &Value) {
        self.push_raw(status, body.to_string());
    }

    /// Queues a response with an arbitrary body.
    pub fn push_raw(&self, status: u16, body: impl Into<String>) {
        self.lock().responses.push_back(Ok(RawResponse {
            status,
            body: body.into(),
        }));
    }

    /// Queues an executor failure.
    pub fn push_transport_error(&self, message: &str) {
        self.lock()
            .responses
            .push_back(Err(TransportError::Request {
                url: String::from("scripted://compute"),
                message: message.to_owned(),
            }));
    }

    /// Returns a snapshot of all requests recorded so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    /// Number of responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    /// Builds a gateway bound to [`TEST_PROJECT`] and [`TEST_ZONE`] that
    /// shares this executor's script.
    #[must_use]
    pub fn gateway(&self) -> ComputeGateway<Self> {
        ComputeGateway::new(self.clone(), TEST_PROJECT, TEST_ZONE)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestExecutor for ScriptedExecutor {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> ExecutorFuture<'a> {
        let outcome = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.responses.pop_front().unwrap_or_else(|| {
                Err(TransportError::Request {
                    url: format!("scripted://{}/{}", request.service, request.method),
                    message: String::from("no scripted response available"),
                })
            })
        };
        Box::pin(async move { outcome })
    }
}

/// Progress sink that records every message.
#[derive(Clone, Debug, Default)]
pub struct RecordingProgress {
    messages: Arc<StdMutex<Vec<String>>>,
}

impl RecordingProgress {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the messages reported so far.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report_progress(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_owned());
    }
}

/// Poll policy that never sleeps, for deterministic tests.
#[must_use]
pub const fn instant_policy(attempts: u32) -> PollPolicy {
    PollPolicy::new(Duration::ZERO, attempts)
}

/// Produces an operation payload.
#[must_use]
pub fn json_operation(name: &str, status: &str) -> Value {
    json!({ "kind": "compute#operation", "name": name, "status": status })
}

/// Produces an instance payload, optionally carrying a public address.
#[must_use]
pub fn json_instance(name: &str, status: &str, nat_ip: Option<&str>) -> Value {
    let access_configs = nat_ip.map_or_else(Vec::new, |ip| {
        vec![json!({ "name": "External NAT", "type": "ONE_TO_ONE_NAT", "natIP": ip })]
    });
    json!({
        "kind": "compute#instance",
        "id": "4242",
        "name": name,
        "status": status,
        "networkInterfaces": [{ "name": "nic0", "accessConfigs": access_configs }],
    })
}

/// Produces a project payload with common instance metadata.
#[must_use]
pub fn json_project(fingerprint: &str, items: &[(&str, &str)]) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    json!({
        "kind": "compute#project",
        "name": TEST_PROJECT,
        "commonInstanceMetadata": { "fingerprint": fingerprint, "items": items },
    })
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// A `None` value removes the variable for the guard's lifetime.
    pub async fn apply(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::apply"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let optional: Vec<(&str, Option<&str>)> =
            pairs.iter().map(|(key, value)| (*key, Some(*value))).collect();
        Self::apply(&optional).await
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
