//! The "fetch bytes from a URL" capability
//!
//! The checker talks to the network only through [`Fetcher`], so tests and
//! embedders can substitute their own transport. [`HttpFetcher`] is the
//! production implementation on top of an async `reqwest` client.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::CheckerConfig;

/// A successful (2xx) HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBody {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedBody {
    pub fn new(content_type: Option<&str>, body: Vec<u8>) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            body,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("response body exceeds {0} bytes")]
    TooLarge(usize),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Failures a retry might cure
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Transport(_) => true,
            FetchError::Status(status) => *status >= 500,
            FetchError::TooLarge(_) | FetchError::InvalidUrl(_) => false,
        }
    }
}

/// Network access used by the checker
///
/// Implementations must return [`FetchError::Status`] for any non-2xx
/// response and must not share per-request state between calls.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// HTTP GET
    async fn get(&self, url: &Url, accept: &str) -> Result<FetchedBody, FetchError>;

    /// HTTP POST of `body` with the given content type
    async fn post(
        &self,
        url: &Url,
        content_type: &str,
        body: Vec<u8>,
        accept: &str,
    ) -> Result<FetchedBody, FetchError>;
}

/// [`Fetcher`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body: usize,
}

impl HttpFetcher {
    /// Create a fetcher
    ///
    /// # Arguments
    /// * `timeout` - Bound on each whole request, body included
    /// * `max_body` - Largest accepted response body in bytes
    pub fn new(timeout: Duration, max_body: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .user_agent(concat!("certcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            timeout,
            max_body,
        })
    }

    pub fn from_config(config: &CheckerConfig) -> Result<Self, FetchError> {
        Self::new(config.fetch_timeout(), config.max_response_size_bytes)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<FetchedBody, FetchError> {
        let exchange = async {
            let mut response = request.send().await.map_err(|e| self.transport(e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            if let Some(length) = response.content_length() {
                if length > self.max_body as u64 {
                    return Err(FetchError::TooLarge(self.max_body));
                }
            }

            let mut body = Vec::new();
            while let Some(chunk) = response.chunk().await.map_err(|e| self.transport(e))? {
                if body.len() + chunk.len() > self.max_body {
                    return Err(FetchError::TooLarge(self.max_body));
                }
                body.extend_from_slice(&chunk);
            }

            Ok(FetchedBody { content_type, body })
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    fn transport(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

fn check_scheme(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::InvalidUrl(format!("unsupported scheme {}", other))),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url, accept: &str) -> Result<FetchedBody, FetchError> {
        check_scheme(url)?;
        debug!(url = %url, "GET");
        let request = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, accept);
        self.execute(request).await
    }

    async fn post(
        &self,
        url: &Url,
        content_type: &str,
        body: Vec<u8>,
        accept: &str,
    ) -> Result<FetchedBody, FetchError> {
        check_scheme(url)?;
        debug!(url = %url, size = body.len(), "POST");
        let request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::ACCEPT, accept)
            .body(body);
        self.execute(request).await
    }
}
