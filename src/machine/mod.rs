//! Machine lifecycle: allocate, ready, stop and destroy a named instance.
//!
//! The orchestrator composes the instance registry and the operation tracker.
//! Connecting to the machine and cleaning up after configuration management
//! are delegated to a [`TransportProbe`] and a [`ConvergenceCleanup`].

mod transport;
mod types;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::DriverUrl;
use crate::gateway::{ComputeError, RequestExecutor};
use crate::instance::{
    CreateTemplate, Instance, InstanceRegistry, InstanceStatus, merge_options,
};
use crate::operation::{OperationTracker, PollPolicy, ProgressSink, poll_until};

pub use transport::{
    CleanupFuture, ConvergenceCleanup, NoopCleanup, ProbeFuture, TcpProbe, TransportProbe,
};
pub use types::{
    ConnectionTarget, DEFAULT_SSH_PORT, MachineOptions, MachineReference, MachineSpec,
};

const ROOT_USER: &str = "root";
const SUDO_PREFIX: &str = "sudo ";

/// Errors raised by machine lifecycle operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum MachineError {
    /// Raised when a provider call or wait fails.
    #[error(transparent)]
    Compute(#[from] ComputeError),
    /// Raised when an operation needs an instance that does not exist.
    #[error("machine {name} does not have an instance associated with it, or the instance does not exist")]
    Missing {
        /// Machine name.
        name: String,
    },
    /// Raised when a machine was allocated through a different driver URL.
    #[error(
        "machine {name} belongs to {recorded}, not {current}; destroy it and re-create it on the new driver"
    )]
    DriverMismatch {
        /// Machine name.
        name: String,
        /// Driver URL stored in the machine reference.
        recorded: String,
        /// Driver URL of this orchestrator.
        current: String,
    },
    /// Raised when the machine never became connectable.
    #[error("machine {name} never became connectable: {source}")]
    Transport {
        /// Machine name.
        name: String,
        /// Underlying wait failure.
        #[source]
        source: ComputeError,
    },
    /// Raised by a [`ConvergenceCleanup`] implementation.
    #[error("convergence cleanup failed: {0}")]
    Cleanup(String),
}

impl MachineError {
    /// True when the failure was client-side patience running out.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Compute(source) | Self::Transport { source, .. } => source.is_retryable(),
            Self::Missing { .. } | Self::DriverMismatch { .. } | Self::Cleanup(_) => false,
        }
    }
}

/// Drives named machines through their lifecycle.
pub struct MachineOrchestrator<E, P = TcpProbe, C = NoopCleanup> {
    registry: InstanceRegistry<E>,
    tracker: OperationTracker<E>,
    driver_url: DriverUrl,
    template: CreateTemplate,
    default_username: String,
    probe: P,
    cleanup: C,
}

impl<E, P, C> std::fmt::Debug for MachineOrchestrator<E, P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineOrchestrator")
            .field("registry", &self.registry)
            .field("driver_url", &self.driver_url)
            .field("template", &self.template)
            .field("default_username", &self.default_username)
            .finish_non_exhaustive()
    }
}

impl<E: RequestExecutor> MachineOrchestrator<E> {
    /// Creates an orchestrator probing SSH over TCP and doing no cleanup.
    pub fn new(
        registry: InstanceRegistry<E>,
        tracker: OperationTracker<E>,
        driver_url: DriverUrl,
    ) -> Self {
        Self {
            registry,
            tracker,
            driver_url,
            template: CreateTemplate::default(),
            default_username: String::from("ubuntu"),
            probe: TcpProbe::default(),
            cleanup: NoopCleanup,
        }
    }
}

impl<E, P, C> MachineOrchestrator<E, P, C>
where
    E: RequestExecutor,
    P: TransportProbe,
    C: ConvergenceCleanup,
{
    /// Replaces the machine type and image used for new instances.
    #[must_use]
    pub fn with_template(mut self, template: CreateTemplate) -> Self {
        self.template = template;
        self
    }

    /// Sets the login name used when neither reference nor options name one.
    #[must_use]
    pub fn with_default_username(mut self, username: impl Into<String>) -> Self {
        self.default_username = username.into();
        self
    }

    /// Replaces the transport probe.
    pub fn with_probe<Q: TransportProbe>(self, probe: Q) -> MachineOrchestrator<E, Q, C> {
        MachineOrchestrator {
            registry: self.registry,
            tracker: self.tracker,
            driver_url: self.driver_url,
            template: self.template,
            default_username: self.default_username,
            probe,
            cleanup: self.cleanup,
        }
    }

    /// Replaces the convergence cleanup.
    pub fn with_cleanup<D: ConvergenceCleanup>(self, cleanup: D) -> MachineOrchestrator<E, P, D> {
        MachineOrchestrator {
            registry: self.registry,
            tracker: self.tracker,
            driver_url: self.driver_url,
            template: self.template,
            default_username: self.default_username,
            probe: self.probe,
            cleanup,
        }
    }

    /// Driver URL recorded in new references.
    #[must_use]
    pub const fn driver_url(&self) -> &DriverUrl {
        &self.driver_url
    }

    /// Looks up the instance behind `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::DriverMismatch`] when the machine was allocated
    /// through another driver URL, or [`MachineError::Compute`] when the
    /// lookup fails.
    pub async fn instance_for(&self, spec: &MachineSpec) -> Result<Option<Instance>, MachineError> {
        if let Some(reference) = &spec.reference {
            let current = self.driver_url.to_string();
            if reference.driver_url != current {
                return Err(MachineError::DriverMismatch {
                    name: spec.name.clone(),
                    recorded: reference.driver_url.clone(),
                    current,
                });
            }
        }
        Ok(self.registry.get(&spec.name).await?)
    }

    /// Creates the instance unless it already exists and returns the machine
    /// with its reference.
    ///
    /// An existing instance without a reference is adopted: a reference is
    /// recorded but nothing is created.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError`] when the lookup, the create call or the wait
    /// fails.
    pub async fn allocate(
        &self,
        progress: &dyn ProgressSink,
        spec: &MachineSpec,
        options: &MachineOptions,
    ) -> Result<MachineSpec, MachineError> {
        let name = spec.name.as_str();
        if self.instance_for(spec).await?.is_some() {
            if spec.reference.is_some() {
                info!(machine = name, "instance already allocated");
                return Ok(spec.clone());
            }
            info!(machine = name, "adopting existing instance");
            return Ok(self.recorded(spec, options));
        }

        let defaults = self.registry.default_create_options(name, &self.template);
        let insert = match &options.insert_options {
            Some(overrides) => merge_options(defaults, overrides),
            None => defaults,
        };
        progress.report_progress(&format!(
            "creating instance named {name} in zone {}",
            self.registry.zone()
        ));
        let operation = self.registry.create(&insert).await?;
        self.tracker.wait_for_done(progress, &operation).await?;
        Ok(self.recorded(spec, options))
    }

    /// Starts the instance if needed, waits for it to run and to accept
    /// connections, and returns how to reach it.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Missing`] when there is no instance, or
    /// another [`MachineError`] when a call or wait fails.
    pub async fn ready(
        &self,
        progress: &dyn ProgressSink,
        spec: &MachineSpec,
        options: &MachineOptions,
    ) -> Result<ConnectionTarget, MachineError> {
        let name = spec.name.as_str();
        let instance = self.require_instance(spec).await?;

        if !instance.running() {
            if matches!(
                instance.status(),
                InstanceStatus::Stopping | InstanceStatus::Stopped | InstanceStatus::Terminated
            ) {
                progress.report_progress(&format!(
                    "instance named {name} in zone {} was stopped - starting it",
                    self.registry.zone()
                ));
                self.registry.start(name).await?;
            }
            self.registry
                .wait_for_status(progress, &instance, &InstanceStatus::Running)
                .await?;
        }

        let refreshed = self.require_instance(spec).await?;
        let target = self.connection_target(spec, options, &refreshed)?;
        self.wait_for_transport(progress, name, &target).await?;
        Ok(target)
    }

    /// Powers the instance off and waits until it is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Missing`] when there is no instance, or
    /// another [`MachineError`] when a call or wait fails.
    pub async fn stop(
        &self,
        progress: &dyn ProgressSink,
        spec: &MachineSpec,
    ) -> Result<(), MachineError> {
        let name = spec.name.as_str();
        let instance = self.require_instance(spec).await?;

        if instance.terminated() || instance.stopped() {
            info!(machine = name, "instance already stopped; nothing to do");
            return Ok(());
        }
        if !instance.stopping() {
            progress.report_progress(&format!(
                "stopping instance named {name} in zone {}",
                self.registry.zone()
            ));
            self.registry.stop(name).await?;
        }
        self.registry
            .wait_for_status(progress, &instance, &InstanceStatus::Terminated)
            .await?;
        Ok(())
    }

    /// Deletes the instance unless it is stopping or terminated, then runs
    /// the convergence cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError`] when a call, wait or the cleanup fails.
    pub async fn destroy(
        &self,
        progress: &dyn ProgressSink,
        spec: &MachineSpec,
    ) -> Result<(), MachineError> {
        let name = spec.name.as_str();
        if let Some(instance) = self.instance_for(spec).await?
            && !instance.stopping()
            && !instance.terminated()
        {
            progress.report_progress(&format!(
                "destroying instance named {name} in zone {}",
                self.registry.zone()
            ));
            if let Some(operation) = self.registry.delete(name).await? {
                self.tracker.wait_for_done(progress, &operation).await?;
            }
        }

        self.cleanup.cleanup(progress, spec).await
    }

    /// Builds the connection target for a running instance.
    ///
    /// # Errors
    ///
    /// Returns [`MachineError::Compute`] when the instance has no public
    /// address.
    pub fn connection_target(
        &self,
        spec: &MachineSpec,
        options: &MachineOptions,
        instance: &Instance,
    ) -> Result<ConnectionTarget, MachineError> {
        let reference = spec.reference.as_ref();
        let recorded = reference.and_then(|r| r.ssh_username.as_deref());
        if let (Some(recorded), Some(requested)) = (recorded, options.ssh_username.as_deref())
            && recorded != requested
        {
            warn!(
                machine = spec.name.as_str(),
                recorded, requested, "machine was created with a different SSH username; keeping the recorded one"
            );
        }

        let username = recorded
            .or(options.ssh_username.as_deref())
            .unwrap_or(&self.default_username)
            .to_owned();
        let sudo = reference
            .and_then(|r| r.sudo)
            .or(options.sudo)
            .unwrap_or(username != ROOT_USER);

        Ok(ConnectionTarget {
            host: instance.determine_remote_host()?.to_owned(),
            port: options.ssh_port.unwrap_or(DEFAULT_SSH_PORT),
            username,
            prefix: sudo.then(|| SUDO_PREFIX.to_owned()),
            host_key_alias: format!("{}.GOOGLE", instance.id()),
            key_name: reference
                .and_then(|r| r.key_name.clone())
                .or_else(|| options.key_name.clone()),
            ssh_gateway: reference
                .and_then(|r| r.ssh_gateway.clone())
                .or_else(|| options.ssh_gateway.clone()),
        })
    }

    async fn wait_for_transport(
        &self,
        progress: &dyn ProgressSink,
        name: &str,
        target: &ConnectionTarget,
    ) -> Result<(), MachineError> {
        let policy: PollPolicy = self.tracker.policy();
        let subject = format!("instance {name} to be connectable");
        let mut probes = 0_u32;
        let probe = &self.probe;
        poll_until(policy, progress, &subject, || {
            probes += 1;
            async move { Ok(probe.available(target).await.then_some(())) }
        })
        .await
        .map_err(|source| MachineError::Transport {
            name: name.to_owned(),
            source,
        })?;

        if probes > 1 {
            progress.report_progress(&format!("{name} is now connectable"));
        }
        Ok(())
    }

    async fn require_instance(&self, spec: &MachineSpec) -> Result<Instance, MachineError> {
        self.instance_for(spec)
            .await?
            .ok_or_else(|| MachineError::Missing {
                name: spec.name.clone(),
            })
    }

    fn recorded(&self, spec: &MachineSpec, options: &MachineOptions) -> MachineSpec {
        MachineSpec::with_reference(
            spec.name.clone(),
            MachineReference::record(self.driver_url.to_string(), options),
        )
    }
}
