//! Request and response interceptors.

use crate::{HttpClientError, Response, Result};
use async_trait::async_trait;
use base64::Engine;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use reqwest::Request;

/// Interceptor trait for modifying requests and responses.
///
/// Request hooks run before every attempt, so they see each retry.
/// Response hooks run once, on the response handed back to the caller.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Intercept and optionally modify the request before sending.
    async fn intercept_request(&self, request: Request) -> Result<Request> {
        Ok(request)
    }

    /// Intercept and optionally modify the final response.
    async fn intercept_response(&self, response: Response) -> Result<Response> {
        Ok(response)
    }
}

/// Logging interceptor that logs requests and responses.
#[derive(Debug, Default)]
pub struct LoggingInterceptor {
    log_headers: bool,
}

impl LoggingInterceptor {
    /// Create a new logging interceptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable logging of headers.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept_request(&self, request: Request) -> Result<Request> {
        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            "Sending HTTP request"
        );

        if self.log_headers {
            for (name, value) in request.headers() {
                tracing::trace!(header = %name, value = ?value, "Request header");
            }
        }

        Ok(request)
    }

    async fn intercept_response(&self, response: Response) -> Result<Response> {
        tracing::debug!(
            status = %response.status(),
            attempts = response.attempts(),
            elapsed = ?response.elapsed(),
            "Received HTTP response"
        );

        if self.log_headers {
            for (name, value) in response.headers() {
                tracing::trace!(header = %name, value = ?value, "Response header");
            }
        }

        Ok(response)
    }
}

/// Authentication interceptor that adds auth headers.
#[derive(Debug)]
pub struct AuthInterceptor {
    header: HeaderName,
    value: HeaderValue,
}

impl AuthInterceptor {
    /// Create a bearer token interceptor.
    pub fn bearer(token: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            header: AUTHORIZATION,
            value: sensitive(&format!("Bearer {}", token.as_ref()))?,
        })
    }

    /// Create a basic auth interceptor.
    pub fn basic(username: impl AsRef<str>, password: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            header: AUTHORIZATION,
            value: basic_credentials(username.as_ref(), Some(password.as_ref()))?,
        })
    }

    /// Create an API key interceptor.
    pub fn api_key(header: impl AsRef<str>, key: impl AsRef<str>) -> Result<Self> {
        let header = HeaderName::from_bytes(header.as_ref().as_bytes())
            .map_err(|e| HttpClientError::Interceptor(e.to_string()))?;
        Ok(Self {
            header,
            value: sensitive(key.as_ref())?,
        })
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    async fn intercept_request(&self, mut request: Request) -> Result<Request> {
        request
            .headers_mut()
            .insert(self.header.clone(), self.value.clone());
        Ok(request)
    }
}

fn sensitive(value: &str) -> Result<HeaderValue> {
    let mut value =
        HeaderValue::try_from(value).map_err(|e| HttpClientError::Interceptor(e.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// `Basic` authorization value for the given credentials.
pub(crate) fn basic_credentials(username: &str, password: Option<&str>) -> Result<HeaderValue> {
    let credentials = format!("{}:{}", username, password.unwrap_or_default());
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
    sensitive(&format!("Basic {encoded}"))
}
