//! Project metadata store holding SSH keys and resource-name mappings.
//!
//! The whole document is guarded by a fingerprint. A write carries the
//! fingerprint captured at fetch time and the provider rejects it if another
//! writer got there first. Nothing here retries on conflict: callers re-fetch
//! and redo their edits.

mod codec;
mod document;

use serde_json::json;
use tracing::{debug, info};

use crate::gateway::{ComputeError, ComputeGateway, Method, Parameters, RequestExecutor, Service};
use crate::operation::{Operation, OperationScope};

pub use codec::{SSH_KEYS_KEY, SSH_MAPPINGS_KEY, decode_pairs, encode_pairs};
pub use document::{ChangePolicy, MetadataItem, ProjectMetadata};

/// Client for the project's common instance metadata.
pub struct ProjectMetadataStore<E> {
    gateway: ComputeGateway<E>,
    policy: ChangePolicy,
}

impl<E> Clone for ProjectMetadataStore<E> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            policy: self.policy,
        }
    }
}

impl<E> std::fmt::Debug for ProjectMetadataStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectMetadataStore")
            .field("gateway", &self.gateway)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<E: RequestExecutor> ProjectMetadataStore<E> {
    /// Creates a store; fetched documents use `policy`.
    #[must_use]
    pub const fn new(gateway: ComputeGateway<E>, policy: ChangePolicy) -> Self {
        Self { gateway, policy }
    }

    /// Fetches the current document.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError`] on transport failure or an error response.
    pub async fn get(&self) -> Result<ProjectMetadata, ComputeError> {
        let response = self
            .gateway
            .call(Service::Projects, Method::Get, Parameters::new(), None)
            .await?;
        ProjectMetadata::from_project(response.raise_if_error()?, self.policy)
    }

    /// Writes `metadata` back if it changed.
    ///
    /// Returns `None` without calling the provider when nothing changed.
    /// Otherwise the full item list and the original fingerprint are sent and
    /// the resulting global operation is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Api`] when the provider rejects the write,
    /// including when the fingerprint is stale.
    pub async fn set_common_instance_metadata(
        &self,
        metadata: &ProjectMetadata,
    ) -> Result<Option<Operation>, ComputeError> {
        if !metadata.changed() {
            debug!("project metadata unchanged; skipping write");
            return Ok(None);
        }

        let items = metadata.items();
        let body = json!({ "items": items, "fingerprint": metadata.fingerprint() });
        info!(
            project = self.gateway.project(),
            items = items.len(),
            "writing project metadata"
        );
        let response = self
            .gateway
            .call(
                Service::Projects,
                Method::SetCommonInstanceMetadata,
                Parameters::new(),
                Some(body),
            )
            .await?;
        Operation::from_response(OperationScope::Global, &response).map(Some)
    }
}
