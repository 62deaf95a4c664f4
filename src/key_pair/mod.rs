//! Keeps a named SSH key pair in sync with the project's metadata.
//!
//! The project stores every uploaded key in `sshKeys` and remembers which key
//! was uploaded for which resource name. Reconciling a name compares that
//! remembered key with the local one and uploads, leaves alone, replaces or
//! refuses accordingly.

mod public_key;

use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::{ComputeError, RequestExecutor};
use crate::metadata::{ProjectMetadata, ProjectMetadataStore};
use crate::operation::{OperationTracker, ProgressSink};

pub use public_key::OpenSshPublicKey;

/// Errors raised while reconciling key pairs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyPairError {
    /// Raised when a provider call or wait fails.
    #[error(transparent)]
    Compute(#[from] ComputeError),
    /// Raised when the remote key differs and overwriting is not allowed.
    #[error(
        "key pair `{name}` exists remotely with a different key and allow_overwrite is false"
    )]
    Conflict {
        /// Logical key pair name.
        name: String,
    },
    /// Raised when a public key line cannot be parsed.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
    /// Raised when a public key file cannot be read.
    #[error("failed to read public key `{path}`: {message}")]
    Read {
        /// Expanded path of the key file.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Remote state of a named key pair relative to the desired key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyPairState {
    /// No mapping exists for the name.
    Absent,
    /// The mapped key equals the desired key.
    PresentMatching,
    /// The mapped key differs from the desired key.
    PresentDivergent,
}

impl KeyPairState {
    /// Classifies the mapping recorded for `name` in `metadata`.
    #[must_use]
    pub fn of(metadata: &ProjectMetadata, name: &str, desired: &str) -> Self {
        match metadata.ssh_mapping(name) {
            None => Self::Absent,
            Some(remote) if remote == desired => Self::PresentMatching,
            Some(_) => Self::PresentDivergent,
        }
    }
}

/// What [`KeyPairReconciler::reconcile`] did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyPairOutcome {
    /// The key and mapping were uploaded for the first time.
    Uploaded,
    /// The remote key already matched.
    Unchanged,
    /// A divergent remote key was replaced.
    Replaced,
}

/// Reconciles named key pairs against project metadata.
pub struct KeyPairReconciler<E> {
    store: ProjectMetadataStore<E>,
    tracker: OperationTracker<E>,
    fallback_username: String,
}

impl<E> std::fmt::Debug for KeyPairReconciler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairReconciler")
            .field("store", &self.store)
            .field("tracker", &self.tracker)
            .field("fallback_username", &self.fallback_username)
            .finish()
    }
}

impl<E: RequestExecutor> KeyPairReconciler<E> {
    /// Creates a reconciler. `fallback_username` is used for keys whose
    /// comment does not name a user.
    pub fn new(
        store: ProjectMetadataStore<E>,
        tracker: OperationTracker<E>,
        fallback_username: impl Into<String>,
    ) -> Self {
        Self {
            store,
            tracker,
            fallback_username: fallback_username.into(),
        }
    }

    /// Reports the remote state of `name` without changing anything.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::Compute`] when the metadata cannot be fetched.
    pub async fn state(
        &self,
        name: &str,
        desired: &OpenSshPublicKey,
    ) -> Result<KeyPairState, KeyPairError> {
        let metadata = self.store.get().await?;
        Ok(KeyPairState::of(&metadata, name, &desired.to_openssh()))
    }

    /// Ensures the project holds `desired` for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::Conflict`] when a different key is mapped and
    /// `allow_overwrite` is false, or [`KeyPairError::Compute`] when a call
    /// or wait fails.
    pub async fn reconcile(
        &self,
        progress: &dyn ProgressSink,
        name: &str,
        desired: &OpenSshPublicKey,
        allow_overwrite: bool,
    ) -> Result<KeyPairOutcome, KeyPairError> {
        let desired_line = desired.to_openssh();
        let mut metadata = self.store.get().await?;
        let state = KeyPairState::of(&metadata, name, &desired_line);
        let username = desired.username().unwrap_or(&self.fallback_username);

        let outcome = match state {
            KeyPairState::PresentMatching => {
                info!(key_pair = name, "remote key matches; nothing to do");
                return Ok(KeyPairOutcome::Unchanged);
            }
            KeyPairState::PresentDivergent if !allow_overwrite => {
                warn!(key_pair = name, "remote key differs and overwrite is disabled");
                return Err(KeyPairError::Conflict {
                    name: name.to_owned(),
                });
            }
            KeyPairState::PresentDivergent => {
                if let Some(remote) = metadata.ssh_mapping(name).map(str::to_owned) {
                    metadata.delete_ssh_key(&remote);
                }
                KeyPairOutcome::Replaced
            }
            KeyPairState::Absent => KeyPairOutcome::Uploaded,
        };

        info!(key_pair = name, username, "adding key");
        metadata.ensure_key(username, &desired_line);
        metadata.set_ssh_mapping(name, &desired_line);
        self.write(progress, &metadata).await?;
        Ok(outcome)
    }

    /// Removes the key and mapping recorded for `name`.
    ///
    /// Returns false when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::Compute`] when a call or wait fails.
    pub async fn destroy(
        &self,
        progress: &dyn ProgressSink,
        name: &str,
    ) -> Result<bool, KeyPairError> {
        let mut metadata = self.store.get().await?;
        let Some(remote) = metadata.ssh_mapping(name).map(str::to_owned) else {
            info!(key_pair = name, "no key recorded; nothing to delete");
            return Ok(false);
        };

        info!(key_pair = name, "deleting key and mapping");
        metadata.delete_ssh_key(&remote);
        metadata.delete_ssh_mapping(name);
        self.write(progress, &metadata).await?;
        Ok(true)
    }

    async fn write(
        &self,
        progress: &dyn ProgressSink,
        metadata: &ProjectMetadata,
    ) -> Result<(), KeyPairError> {
        if let Some(operation) = self.store.set_common_instance_metadata(metadata).await? {
            self.tracker.wait_for_done(progress, &operation).await?;
        }
        Ok(())
    }
}
