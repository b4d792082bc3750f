//! The transport seam between the resilience engine and the network.

use crate::body::{self, BodyStream};
use crate::{HttpClientConfig, HttpClientError, Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::fmt;
use std::io;
use url::Url;

/// Executes one request and returns one response.
///
/// Implementations own connection setup, TLS and pooling. Errors must be
/// classified into [`TransportError`] variants so the retry evaluator can
/// tell permanent failures from transient ones.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response head with a streaming body.
    async fn execute(&self, request: reqwest::Request)
    -> std::result::Result<RawResponse, TransportError>;
}

/// Response as produced by a [`Transport`], before decompression.
pub struct RawResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Final URL, after redirects.
    pub url: Option<Url>,
    /// Body stream, still content-encoded.
    pub body: BodyStream,
}

impl RawResponse {
    /// Create a response with no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            url: None,
            body: body::empty(),
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Set a buffered body.
    pub fn with_body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = body::full(bytes);
        self
    }

    /// Set a streaming body.
    pub fn with_stream(mut self, stream: BodyStream) -> Self {
        self.body = stream;
        self
    }

    /// Set the response URL.
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }
}

impl fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

/// [`Transport`] backed by a `reqwest` client.
///
/// Automatic decompression is disabled in the underlying client; response
/// bodies are decoded by the client's decompressor registry instead.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an existing `reqwest` client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a `reqwest` client from the HTTP client configuration.
    pub fn from_config(config: &HttpClientConfig) -> Result<Self> {
        let redirect = if config.follow_redirects {
            reqwest::redirect::Policy::limited(config.max_redirects)
        } else {
            reqwest::redirect::Policy::none()
        };

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .redirect(redirect)
            .build()
            .map_err(|e| HttpClientError::RequestBuild(e.to_string()))?;

        Ok(Self::new(client))
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: reqwest::Request,
    ) -> std::result::Result<RawResponse, TransportError> {
        let response = self.client.execute(request).await?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(RawResponse {
            status,
            headers,
            url: Some(url),
            body: Box::pin(body),
        })
    }
}
