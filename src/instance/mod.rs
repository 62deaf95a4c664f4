//! Compute instance registry: lookup, creation, deletion and power control.

mod options;
mod types;

use serde_json::Value;
use tracing::info;

use crate::gateway::{
    ApiResponse, ComputeError, ComputeGateway, Method, Parameters, RequestExecutor, Service,
    parameter,
};
use crate::operation::{
    Operation, OperationScope, PollPolicy, ProgressSink, poll_until,
};

pub use options::{
    CreateTemplate, DEFAULT_MACHINE_TYPE, DEFAULT_SOURCE_IMAGE, default_create_options,
    merge_options,
};
pub use types::{AccessConfig, Instance, InstanceStatus, NetworkInterface};

/// Client for the zonal `instances` service.
pub struct InstanceRegistry<E> {
    gateway: ComputeGateway<E>,
    policy: PollPolicy,
}

impl<E> Clone for InstanceRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            policy: self.policy,
        }
    }
}

impl<E> std::fmt::Debug for InstanceRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("gateway", &self.gateway)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<E: RequestExecutor> InstanceRegistry<E> {
    /// Creates a registry; `policy` governs [`Self::wait_for_status`].
    #[must_use]
    pub const fn new(gateway: ComputeGateway<E>, policy: PollPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Zone the registry operates in.
    #[must_use]
    pub fn zone(&self) -> &str {
        self.gateway.zone()
    }

    /// Fetches an instance, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] on transport failure or any error response
    /// other than not-found.
    pub async fn get(&self, name: &str) -> Result<Option<Instance>, ComputeError> {
        let response = self.call(Method::Get, parameter("instance", name), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        Instance::from_value(response.raise_if_error()?).map(Some)
    }

    /// Submits a create request. `options` must be a complete insert body.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] when the provider rejects the request.
    pub async fn create(&self, options: &Value) -> Result<Operation, ComputeError> {
        let name = options.get("name").and_then(Value::as_str).unwrap_or_default();
        info!(instance = name, zone = self.zone(), "creating instance");
        let response = self
            .call(Method::Insert, Parameters::new(), Some(options.clone()))
            .await?;
        Operation::from_response(OperationScope::Zone, &response)
    }

    /// Deletes an instance. Returns `None` when it is already gone.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] on any error response other than not-found.
    pub async fn delete(&self, name: &str) -> Result<Option<Operation>, ComputeError> {
        info!(instance = name, zone = self.zone(), "deleting instance");
        self.operation_call(Method::Delete, name).await
    }

    /// Powers an instance on. Returns `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] on any error response other than not-found.
    pub async fn start(&self, name: &str) -> Result<Option<Operation>, ComputeError> {
        info!(instance = name, zone = self.zone(), "starting instance");
        self.operation_call(Method::Start, name).await
    }

    /// Powers an instance off. Returns `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] on any error response other than not-found.
    pub async fn stop(&self, name: &str) -> Result<Option<Operation>, ComputeError> {
        info!(instance = name, zone = self.zone(), "stopping instance");
        self.operation_call(Method::Stop, name).await
    }

    /// Re-fetches `instance` until it reports `target`.
    ///
    /// An instance that disappears while waiting counts as not having reached
    /// the target yet.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::PollTimeout`] when the budget is exhausted, or
    /// any error raised by [`Self::get`].
    pub async fn wait_for_status(
        &self,
        progress: &dyn ProgressSink,
        instance: &Instance,
        target: &InstanceStatus,
    ) -> Result<Instance, ComputeError> {
        let name = instance.name();
        let subject = format!("instance {name} to become {target}");
        info!(instance = name, target = %target, "waiting for instance status");
        poll_until(self.policy, progress, &subject, move || async move {
            let current = self.get(name).await?;
            Ok(current.filter(|snapshot| snapshot.status() == target))
        })
        .await
    }

    /// Builds the minimal create body for `name` in this registry's zone.
    #[must_use]
    pub fn default_create_options(&self, name: &str, template: &CreateTemplate) -> Value {
        default_create_options(self.zone(), name, template)
    }

    async fn operation_call(
        &self,
        method: Method,
        name: &str,
    ) -> Result<Option<Operation>, ComputeError> {
        let response = self.call(method, parameter("instance", name), None).await?;
        if response.is_not_found() {
            return Ok(None);
        }
        Operation::from_response(OperationScope::Zone, &response).map(Some)
    }

    async fn call(
        &self,
        method: Method,
        parameters: Parameters,
        body: Option<Value>,
    ) -> Result<ApiResponse, ComputeError> {
        Ok(self
            .gateway
            .call(Service::Instances, method, parameters, body)
            .await?)
    }
}

#[cfg(test)]
mod tests;
