//! HTTP transport seam.
//!
//! The orchestrators in [`crate::client`] talk to authorization servers only
//! through [`UdapTransport`]. [`ReqwestTransport`] is the production
//! implementation; tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;

/// Default request timeout for discovery, registration and token requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default maximum response body size (1 MB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl TransportResponse {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Errors raised below the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("Request to {url} timed out")]
    Timeout {
        /// Target URL.
        url: String,
    },

    /// The connection could not be established.
    #[error("Connection to {url} failed: {message}")]
    Connection {
        /// Target URL.
        url: String,
        /// Underlying error.
        message: String,
    },

    /// Any other request or body read failure.
    #[error("Request to {url} failed: {message}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying error.
        message: String,
    },

    /// The response body exceeded the configured limit.
    #[error("Response from {url} exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// Target URL.
        url: String,
        /// The maximum allowed size.
        max_size: usize,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(String),
}

/// HTTP operations used by the UDAP flows.
#[async_trait]
pub trait UdapTransport: Send + Sync {
    /// Performs a GET request expecting a JSON body.
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;

    /// POSTs a JSON document.
    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;

    /// POSTs an `application/x-www-form-urlencoded` body.
    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// [`UdapTransport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    max_response_size: usize,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ClientBuild` if the TLS backend cannot be
    /// initialized.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a transport with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ClientBuild` if the TLS backend cannot be
    /// initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http_client,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        })
    }

    /// Sets the maximum accepted response size.
    #[must_use]
    pub fn with_max_response_size(mut self, size: usize) -> Self {
        self.max_response_size = size;
        self
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<TransportResponse, TransportError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status().as_u16();

        if let Some(len) = response.content_length()
            && len as usize > self.max_response_size
        {
            return Err(TransportError::ResponseTooLarge {
                url: url.to_string(),
                max_size: self.max_response_size,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        if body.len() > self.max_response_size {
            return Err(TransportError::ResponseTooLarge {
                url: url.to_string(),
                max_size: self.max_response_size,
            });
        }

        tracing::debug!(url, status, "received response");

        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl UdapTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        self.send(url, self.http_client.get(url)).await
    }

    async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        self.send(url, self.http_client.post(url).json(body)).await
    }

    async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        self.send(url, self.http_client.post(url).form(fields)).await
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> TransportError {
    tracing::warn!("HTTP request to {} failed: {}", url, error);

    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        TransportError::Connection {
            url: url.to_string(),
            message: error.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
