//! Lifecycle client for Google Compute Engine machines.
//!
//! The crate turns a logical machine name into a running, reachable
//! instance and back: allocate → ready → stop → destroy. It talks to the
//! Compute Engine REST API through a [`ComputeGateway`], waits on
//! asynchronous operations with an [`OperationTracker`], and keeps SSH keys
//! in the project metadata document guarded by its fingerprint.
//!
//! Token signing, SSH transport, and configuration management are left to
//! the caller; the crate consumes them through [`TokenSource`],
//! [`TransportProbe`], and [`ConvergenceCleanup`].

pub mod config;
pub mod credentials;
pub mod files;
pub mod gateway;
pub mod instance;
pub mod key_pair;
pub mod machine;
pub mod metadata;
pub mod operation;
pub mod test_support;

pub use config::{ComputeConfig, ConfigError, DriverUrl};
pub use credentials::{Credentials, CredentialsError, StaticToken, TokenSource};
pub use gateway::{
    ApiRequest, ApiResponse, ComputeError, ComputeGateway, HttpExecutor, Method, RawResponse,
    RequestExecutor, Service, TransportError,
};
pub use instance::{CreateTemplate, Instance, InstanceRegistry, InstanceStatus};
pub use key_pair::{
    KeyPairError, KeyPairOutcome, KeyPairReconciler, KeyPairState, OpenSshPublicKey,
};
pub use machine::{
    ConnectionTarget, ConvergenceCleanup, MachineError, MachineOptions, MachineOrchestrator,
    MachineReference, MachineSpec, NoopCleanup, TcpProbe, TransportProbe,
};
pub use metadata::{ChangePolicy, MetadataItem, ProjectMetadata, ProjectMetadataStore};
pub use operation::{
    Operation, OperationScope, OperationTracker, PollPolicy, ProgressSink, TracingProgress,
};
