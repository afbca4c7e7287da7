//! HTTP seam
//!
//! [`Endpoint`] posts one GraphQL request and reports the raw outcome.
//! It knows nothing about retries or GraphQL semantics; [`super::Transport`]
//! layers those on top.

use crate::config::TaggerConfig;
use crate::error::EndpointError;
use serde::Serialize;
use serde_json::Value;

/// Header carrying the static admin credential
pub const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// GraphQL request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQlRequest {
    /// Operation document
    pub query: String,
    /// Operation variables
    pub variables: Value,
    /// Name of the operation to run
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

/// Raw HTTP outcome of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// `Retry-After` header in whole seconds, when present and numeric
    pub retry_after: Option<u64>,
    /// Response body
    pub body: String,
}

impl RawResponse {
    /// 200 response with a body
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    /// 429 response with an optional hint
    #[must_use]
    pub fn rate_limited(retry_after: Option<u64>) -> Self {
        Self {
            status: 429,
            retry_after,
            body: String::new(),
        }
    }

    /// Response with any status
    #[must_use]
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// Executes one HTTP exchange against the GraphQL endpoint
#[async_trait::async_trait]
pub trait Endpoint: Send + Sync {
    /// Post a request and return whatever came back
    async fn post(&self, request: &GraphQlRequest) -> Result<RawResponse, EndpointError>;
}

/// `reqwest`-backed endpoint
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
    access_token: String,
}

impl HttpEndpoint {
    /// Create endpoint for the configured store
    ///
    /// # Errors
    /// `EndpointError::Network` if the HTTP client cannot be built
    pub fn new(config: &TaggerConfig) -> Result<Self, EndpointError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| EndpointError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: config.graphql_endpoint(),
            access_token: config.access_token.clone(),
        })
    }

    /// Target URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Endpoint for HttpEndpoint {
    async fn post(&self, request: &GraphQlRequest) -> Result<RawResponse, EndpointError> {
        let response = self
            .client
            .post(&self.url)
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.map_err(classify_reqwest)?;

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

fn classify_reqwest(err: reqwest::Error) -> EndpointError {
    if err.is_timeout() {
        EndpointError::Timeout
    } else {
        EndpointError::Network(err.to_string())
    }
}

/// Parse a `Retry-After` value given in whole seconds
///
/// HTTP-date values and fractional seconds are ignored; the caller falls back
/// to its default hint.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}
