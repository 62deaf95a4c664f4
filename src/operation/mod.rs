//! Asynchronous provider operations and the tracker that waits on them.
//!
//! Every mutating call returns an [`Operation`] whose scope is fixed by the
//! service that issued it. [`OperationTracker`] re-fetches the operation from
//! the matching endpoint until it reports `DONE` or the [`PollPolicy`] budget
//! is exhausted.

mod poll;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::gateway::{
    ApiResponse, ComputeError, ComputeGateway, Method, RequestExecutor, Service, parameter,
};

pub(crate) use poll::poll_until;
pub use poll::{PollPolicy, ProgressSink, TracingProgress};

const DONE: &str = "DONE";

/// Endpoint family an operation must be polled from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperationScope {
    /// Operations on project-level resources such as common metadata.
    Global,
    /// Operations on zonal resources such as instances.
    Zone,
}

impl OperationScope {
    /// Service that answers status queries for this scope.
    #[must_use]
    pub const fn service(self) -> Service {
        match self {
            Self::Global => Service::GlobalOperations,
            Self::Zone => Service::ZoneOperations,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationPayload {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    warnings: Vec<WarningPayload>,
}

#[derive(Debug, Deserialize)]
struct WarningPayload {
    #[serde(default)]
    message: String,
}

/// Point-in-time snapshot of a pending server-side action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Operation {
    name: String,
    status: String,
    scope: OperationScope,
    warnings: Vec<String>,
}

impl Operation {
    /// Creates a snapshot from its parts.
    pub fn new(name: impl Into<String>, status: impl Into<String>, scope: OperationScope) -> Self {
        Self {
            name: name.into(),
            status: status.into(),
            scope,
            warnings: Vec::new(),
        }
    }

    /// Decodes an operation from a successful response body.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Malformed`] when the body lacks a `name`.
    pub fn from_value(scope: OperationScope, value: &Value) -> Result<Self, ComputeError> {
        let payload = OperationPayload::deserialize(value)
            .map_err(|err| ComputeError::malformed("operation", err))?;
        Ok(Self {
            name: payload.name,
            status: payload.status,
            scope,
            warnings: payload
                .warnings
                .into_iter()
                .map(|warning| warning.message)
                .filter(|message| !message.is_empty())
                .collect(),
        })
    }

    /// Classifies a response and decodes the operation it carries.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] for error responses or malformed bodies.
    pub fn from_response(
        scope: OperationScope,
        response: &ApiResponse,
    ) -> Result<Self, ComputeError> {
        Self::from_value(scope, response.raise_if_error()?)
    }

    /// Opaque operation identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw status string (`PENDING`, `RUNNING` or `DONE`).
    #[must_use]
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Endpoint family used to poll this operation.
    #[must_use]
    pub const fn scope(&self) -> OperationScope {
        self.scope
    }

    /// Warning messages attached by the provider.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True when the provider reports the operation as finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == DONE
    }
}

/// Polls operations from the endpoint matching their scope.
pub struct OperationTracker<E> {
    gateway: ComputeGateway<E>,
    policy: PollPolicy,
}

impl<E> Clone for OperationTracker<E> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            policy: self.policy,
        }
    }
}

impl<E> std::fmt::Debug for OperationTracker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTracker")
            .field("gateway", &self.gateway)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<E: RequestExecutor> OperationTracker<E> {
    /// Creates a tracker using `policy` for every wait.
    #[must_use]
    pub const fn new(gateway: ComputeGateway<E>, policy: PollPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Poll policy applied by [`Self::wait_for_done`].
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Fetches the current state of `operation` once.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] on transport failure or an error response.
    pub async fn get(&self, operation: &Operation) -> Result<Operation, ComputeError> {
        let scope = operation.scope();
        let response = self
            .gateway
            .call(
                scope.service(),
                Method::Get,
                parameter("operation", operation.name()),
                None,
            )
            .await?;
        Operation::from_response(scope, &response)
    }

    /// Polls `operation` until it is done.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::PollTimeout`] when the attempt budget is
    /// exhausted, or any error raised by [`Self::get`].
    pub async fn wait_for_done(
        &self,
        progress: &dyn ProgressSink,
        operation: &Operation,
    ) -> Result<Operation, ComputeError> {
        let subject = format!("operation {}", operation.name());
        info!(operation = operation.name(), scope = ?operation.scope(), "waiting for operation");
        let done = poll_until(self.policy, progress, &subject, move || async move {
            let current = self.get(operation).await?;
            Ok(current.is_done().then_some(current))
        })
        .await?;
        for message in done.warnings() {
            warn!(operation = done.name(), warning = %message, "operation finished with warning");
        }
        Ok(done)
    }
}
