//! Error types shared by every Compute Engine client.

use std::time::Duration;

use thiserror::Error;

/// Raised when the request executor itself fails (network, auth, routing).
///
/// Transport failures are never retried by this crate.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when the HTTP request could not be sent or its body read.
    #[error("request to {url} failed: {message}")]
    Request {
        /// URL that was being requested.
        url: String,
        /// Message returned by the HTTP client.
        message: String,
    },
    /// Raised when no REST route exists for a service/method pair.
    #[error("no route for {service}.{method}")]
    UnsupportedRoute {
        /// Logical service name.
        service: String,
        /// Logical method name.
        method: String,
    },
    /// Raised when a route needs a parameter the call did not provide.
    #[error("{service}.{method} requires parameter `{name}`")]
    MissingParameter {
        /// Logical service name.
        service: String,
        /// Logical method name.
        method: String,
        /// Missing parameter name.
        name: String,
    },
    /// Raised when an access token cannot be obtained.
    #[error("failed to obtain access token: {0}")]
    Token(String),
    /// Raised when the HTTP client cannot be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Errors reported by the provider or by the client's own polling loops.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ComputeError {
    /// The underlying executor failed before a response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The provider returned a non-200 status or an embedded `error` field.
    #[error("compute API call failed with status {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// First error message reported by the provider.
        message: String,
        /// Full raw response body, kept for diagnostics.
        body: String,
    },
    /// A polling loop exhausted its attempt budget.
    #[error("{subject} did not complete within {waited:?} ({attempts} attempts)")]
    PollTimeout {
        /// Description of what was being waited on.
        subject: String,
        /// Number of polls performed.
        attempts: u32,
        /// Total time budget that elapsed.
        waited: Duration,
    },
    /// The instance exposes no access configuration with a public address.
    #[error("instance {instance} has no public IP address")]
    NoPublicAddress {
        /// Instance name.
        instance: String,
    },
    /// A successful response did not have the expected shape.
    #[error("malformed {context} response: {message}")]
    Malformed {
        /// Resource or call whose response was malformed.
        context: String,
        /// Decoder message.
        message: String,
    },
}

impl ComputeError {
    /// Returns true when the failure came from client-side patience running
    /// out rather than from the provider.
    ///
    /// Only poll timeouts are retryable; a caller may start a fresh wait.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::PollTimeout { .. })
    }

    pub(crate) fn malformed(context: &str, message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            context: context.to_owned(),
            message: message.to_string(),
        }
    }
}
