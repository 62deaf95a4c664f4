//! `reqwest` executor mapping logical calls onto Compute Engine v1 routes.

use std::time::Duration;

use reqwest::Method as HttpMethod;

use crate::credentials::TokenSource;

use super::{ApiRequest, ExecutorFuture, Method, RawResponse, RequestExecutor, Service};
use super::TransportError;

/// Base URL of the Compute Engine v1 REST API.
pub const DEFAULT_API_BASE: &str = "https://compute.googleapis.com/compute/v1";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor that sends authenticated requests with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpExecutor<T> {
    client: reqwest::Client,
    api_base: String,
    tokens: T,
}

impl<T: TokenSource> HttpExecutor<T> {
    /// Creates an executor targeting `api_base` and authenticating with
    /// `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] when the HTTP client cannot be
    /// built, for example when TLS initialisation fails.
    pub fn new(api_base: impl Into<String>, tokens: T) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| TransportError::Client(err.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            tokens,
        })
    }

    /// Resolves the HTTP method and URL for a request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::UnsupportedRoute`] for unknown service and
    /// method pairs and [`TransportError::MissingParameter`] when a path
    /// segment is not supplied.
    pub fn route(&self, request: &ApiRequest) -> Result<(HttpMethod, String), TransportError> {
        let param = |name: &str| {
            request
                .parameters
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| TransportError::MissingParameter {
                    service: request.service.as_str().to_owned(),
                    method: request.method.as_str().to_owned(),
                    name: name.to_owned(),
                })
        };
        let base = &self.api_base;
        let project = param("project")?;

        let route = match (request.service, request.method) {
            (Service::Instances, Method::Insert) => (
                HttpMethod::POST,
                format!("{base}/projects/{project}/zones/{}/instances", param("zone")?),
            ),
            (Service::Instances, Method::Get | Method::Delete) => {
                let method = if request.method == Method::Get {
                    HttpMethod::GET
                } else {
                    HttpMethod::DELETE
                };
                (
                    method,
                    format!(
                        "{base}/projects/{project}/zones/{}/instances/{}",
                        param("zone")?,
                        param("instance")?
                    ),
                )
            }
            (Service::Instances, Method::Start | Method::Stop) => (
                HttpMethod::POST,
                format!(
                    "{base}/projects/{project}/zones/{}/instances/{}/{}",
                    param("zone")?,
                    param("instance")?,
                    request.method.as_str()
                ),
            ),
            (Service::Projects, Method::Get) => {
                (HttpMethod::GET, format!("{base}/projects/{project}"))
            }
            (Service::Projects, Method::SetCommonInstanceMetadata) => (
                HttpMethod::POST,
                format!("{base}/projects/{project}/setCommonInstanceMetadata"),
            ),
            (Service::GlobalOperations, Method::Get) => (
                HttpMethod::GET,
                format!(
                    "{base}/projects/{project}/global/operations/{}",
                    param("operation")?
                ),
            ),
            (Service::ZoneOperations, Method::Get) => (
                HttpMethod::GET,
                format!(
                    "{base}/projects/{project}/zones/{}/operations/{}",
                    param("zone")?,
                    param("operation")?
                ),
            ),
            (service, method) => {
                return Err(TransportError::UnsupportedRoute {
                    service: service.as_str().to_owned(),
                    method: method.as_str().to_owned(),
                });
            }
        };
        Ok(route)
    }

    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        let (method, url) = self.route(request)?;
        let token = self
            .tokens
            .access_token()
            .map_err(|err| TransportError::Token(err.to_string()))?;

        let mut builder = self.client.request(method, &url).bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Request {
                url: url.clone(),
                message: err.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportError::Request {
                url,
                message: err.to_string(),
            })?;
        Ok(RawResponse { status, body })
    }
}

impl<T: TokenSource> RequestExecutor for HttpExecutor<T> {
    fn execute<'a>(&'a self, request: &'a ApiRequest) -> ExecutorFuture<'a> {
        Box::pin(self.send(request))
    }
}
