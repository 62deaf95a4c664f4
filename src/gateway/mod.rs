//! Thin gateway over an authenticated Compute Engine request executor.
//!
//! The gateway turns a logical `(service, method, parameters, body)` call into
//! a [`ApiResponse`] carrying the HTTP status and the decoded JSON body. It
//! never raises for HTTP-level failures; callers classify responses with
//! [`ApiResponse::is_not_found`] and [`ApiResponse::raise_if_error`].

mod error;
mod http;

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

pub use error::{ComputeError, TransportError};
pub use http::{DEFAULT_API_BASE, HttpExecutor};

/// Request parameters keyed by name (for example `instance` or `operation`).
pub type Parameters = BTreeMap<String, String>;

/// Compute Engine services used by this crate.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Service {
    /// Zonal virtual machine instances.
    Instances,
    /// Project resource holding common instance metadata.
    Projects,
    /// Operations scoped to global resources.
    GlobalOperations,
    /// Operations scoped to a single zone.
    ZoneOperations,
}

impl Service {
    /// Returns the discovery name of the service.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Instances => "instances",
            Self::Projects => "projects",
            Self::GlobalOperations => "globalOperations",
            Self::ZoneOperations => "zoneOperations",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods invoked on a [`Service`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    /// Fetch a single resource.
    Get,
    /// Create a resource.
    Insert,
    /// Delete a resource.
    Delete,
    /// Power an instance on.
    Start,
    /// Power an instance off.
    Stop,
    /// Replace the project's common instance metadata.
    SetCommonInstanceMetadata,
}

impl Method {
    /// Returns the discovery name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Insert => "insert",
            Self::Delete => "delete",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::SetCommonInstanceMetadata => "setCommonInstanceMetadata",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved request handed to a [`RequestExecutor`].
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    /// Target service.
    pub service: Service,
    /// Method on the service.
    pub method: Method,
    /// Default parameters merged with the caller's parameters.
    pub parameters: Parameters,
    /// Optional JSON request body.
    pub body: Option<Value>,
}

/// Raw HTTP response returned by a [`RequestExecutor`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Undecoded response body.
    pub body: String,
}

/// Structured response produced by [`ComputeGateway::call`].
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Decoded body, or the decoder's message when the body is not JSON.
    pub body: Result<Value, String>,
    /// Raw body text.
    pub raw: String,
}

impl ApiResponse {
    /// Decodes a raw executor response.
    #[must_use]
    pub fn from_raw(raw: RawResponse) -> Self {
        let body = if raw.body.trim().is_empty() {
            Ok(Value::Object(serde_json::Map::new()))
        } else {
            serde_json::from_str(&raw.body).map_err(|err| err.to_string())
        };
        Self {
            status: raw.status,
            body,
            raw: raw.body,
        }
    }

    /// Returns true when the provider reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns the first error message embedded in the body, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let body = self.body.as_ref().ok()?;
        let error = body.get("error").filter(|value| !value.is_null())?;
        let message = error
            .pointer("/errors/0/message")
            .or_else(|| error.get("message"))
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_owned);
        Some(message)
    }

    /// Returns the decoded body when the call succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Api`] when the status is not 200 or the body
    /// contains an `error` field, and [`ComputeError::Malformed`] when a 200
    /// body is not valid JSON.
    pub fn raise_if_error(&self) -> Result<&Value, ComputeError> {
        if self.status != 200 {
            let message = self
                .error_message()
                .unwrap_or_else(|| String::from("no error details"));
            return Err(self.api_error(message));
        }
        if let Some(message) = self.error_message() {
            return Err(self.api_error(message));
        }
        self.body
            .as_ref()
            .map_err(|message| ComputeError::malformed("compute API", message))
    }

    fn api_error(&self, message: String) -> ComputeError {
        ComputeError::Api {
            status: self.status,
            message,
            body: self.raw.clone(),
        }
    }
}

/// Future returned by [`RequestExecutor::execute`].
pub type ExecutorFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RawResponse, TransportError>> + Send + 'a>>;

/// Authenticated executor that performs the actual HTTP exchange.
pub trait RequestExecutor: Send + Sync {
    /// Executes the request and returns the raw response, whatever its status.
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> ExecutorFuture<'a>;
}

/// Gateway bound to one project and zone.
pub struct ComputeGateway<E> {
    executor: Arc<E>,
    project: String,
    zone: String,
}

impl<E> Clone for ComputeGateway<E> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
            project: self.project.clone(),
            zone: self.zone.clone(),
        }
    }
}

impl<E> fmt::Debug for ComputeGateway<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeGateway")
            .field("project", &self.project)
            .field("zone", &self.zone)
            .finish_non_exhaustive()
    }
}

impl<E: RequestExecutor> ComputeGateway<E> {
    /// Creates a gateway for the given project and zone.
    pub fn new(executor: E, project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self::with_shared(Arc::new(executor), project, zone)
    }

    /// Creates a gateway around an executor that is shared elsewhere.
    pub fn with_shared(
        executor: Arc<E>,
        project: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            project: project.into(),
            zone: zone.into(),
        }
    }

    /// Project every call is scoped to by default.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Zone every call is scoped to by default.
    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    /// Default parameters attached to every call.
    #[must_use]
    pub fn default_parameters(&self) -> Parameters {
        Parameters::from([
            (String::from("project"), self.project.clone()),
            (String::from("zone"), self.zone.clone()),
        ])
    }

    /// Performs a call, merging `parameters` over the default parameters.
    ///
    /// Caller values win on key collisions. HTTP error statuses are returned
    /// as ordinary responses.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the executor cannot complete the
    /// request.
    pub async fn call(
        &self,
        service: Service,
        method: Method,
        parameters: Parameters,
        body: Option<Value>,
    ) -> Result<ApiResponse, TransportError> {
        let mut merged = self.default_parameters();
        merged.extend(parameters);
        let request = ApiRequest {
            service,
            method,
            parameters: merged,
            body,
        };

        debug!(%service, %method, parameters = ?request.parameters, "calling compute API");
        let raw = self.executor.execute(&request).await?;
        debug!(%service, %method, status = raw.status, "compute API responded");
        Ok(ApiResponse::from_raw(raw))
    }
}

/// Builds a single-entry parameter map.
#[must_use]
pub fn parameter(name: &str, value: &str) -> Parameters {
    Parameters::from([(name.to_owned(), value.to_owned())])
}
