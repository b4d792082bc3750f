//! Request builder.

use crate::body::{RequestBody, RequestStream};
use crate::context::ExecContext;
use crate::execute::PreparedRequest;
use crate::interceptor::basic_credentials;
use crate::{HttpClient, HttpClientError, Response, Result, RetryPolicy};
use http::header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::io;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Retry policy selection for one request.
#[derive(Debug, Default)]
enum RetryChoice {
    /// Use the client default.
    #[default]
    Inherit,
    Policy(RetryPolicy),
    Disabled,
}

/// HTTP request builder.
///
/// Errors from header, body or URL construction are held back and returned
/// by [`send`](RequestBuilder::send).
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: RequestBody,
    timeout: Option<Duration>,
    retry: RetryChoice,
    allow_non_idempotent_retry: bool,
    allow_get_payload: bool,
    allow_delete_payload: bool,
    cancellation: Option<CancellationToken>,
    deadline: Option<Instant>,
    trace: Option<bool>,
    error: Option<HttpClientError>,
}

impl<'a> RequestBuilder<'a> {
    /// Create a new request builder.
    pub(crate) fn new(client: &'a HttpClient, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::empty(),
            timeout: None,
            retry: RetryChoice::Inherit,
            allow_non_idempotent_retry: false,
            allow_get_payload: false,
            allow_delete_payload: false,
            cancellation: None,
            deadline: None,
            trace: None,
            error: None,
        }
    }

    fn fail(mut self, error: HttpClientError) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                self
            }
            (Err(e), _) => self.fail(HttpClientError::RequestBuild(e.to_string())),
            (_, Err(e)) => self.fail(HttpClientError::RequestBuild(e.to_string())),
        }
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a streaming body that can be sent only once.
    ///
    /// A retry that needs the body again fails with
    /// [`HttpClientError::BodyNotReplayable`].
    pub fn body_stream(mut self, stream: RequestStream, len: Option<u64>) -> Self {
        self.body = RequestBody::once(stream, len);
        self
    }

    /// Set a streaming body that `open` produces afresh for every attempt.
    pub fn body_reopenable<F>(mut self, len: Option<u64>, open: F) -> Self
    where
        F: Fn() -> io::Result<RequestStream> + Send + Sync + 'static,
    {
        self.body = RequestBody::reopenable(len, open);
        self
    }

    /// Set the request body as text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = RequestBody::from(text.into());
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        self.encode("application/json", json)
    }

    /// Set the request body as XML.
    pub fn xml<T: Serialize + ?Sized>(self, xml: &T) -> Self {
        self.encode("application/xml", xml)
    }

    /// Encode the body for `content_type` through the client's codecs.
    pub fn encode<T: Serialize + ?Sized>(mut self, content_type: &str, value: &T) -> Self {
        let header = match HeaderValue::try_from(content_type) {
            Ok(header) => header,
            Err(_) => return self.fail(HttpClientError::InvalidMediaType(content_type.into())),
        };
        match self.client.codecs.encode(content_type, value) {
            Ok(bytes) => {
                self.headers.insert(CONTENT_TYPE, header);
                self.body = RequestBody::from(bytes);
                self
            }
            Err(e) => self.fail(e),
        }
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize + ?Sized>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => {
                self.headers.insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                self.body = RequestBody::from(encoded);
                self
            }
            Err(e) => self.fail(HttpClientError::Encode(e.to_string())),
        }
    }

    /// Allow a body on GET requests. Without it the body is dropped.
    pub fn allow_get_payload(mut self, allow: bool) -> Self {
        self.allow_get_payload = allow;
        self
    }

    /// Allow a body on DELETE requests. Without it the body is dropped.
    pub fn allow_delete_payload(mut self, allow: bool) -> Self {
        self.allow_delete_payload = allow;
        self
    }

    /// Set a custom timeout for each attempt of this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Fail with [`HttpClientError::DeadlineExceeded`] if the request, retries
    /// included, has not completed within `after`.
    ///
    /// A duration too large to represent as an instant means no deadline.
    pub fn deadline(mut self, after: Duration) -> Self {
        self.deadline = Instant::now().checked_add(after);
        self
    }

    /// Like [`deadline`](RequestBuilder::deadline), at a fixed instant.
    pub fn deadline_at(mut self, at: Instant) -> Self {
        self.deadline = Some(at);
        self
    }

    /// Abort the request with [`HttpClientError::Cancelled`] when `token`
    /// fires.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Use `policy` instead of the client's default retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryChoice::Policy(policy);
        self
    }

    /// Send this request once, whatever the client's retry policy.
    pub fn no_retry(mut self) -> Self {
        self.retry = RetryChoice::Disabled;
        self
    }

    /// Let a non-idempotent request go through the retry policy.
    pub fn allow_non_idempotent_retry(mut self) -> Self {
        self.allow_non_idempotent_retry = true;
        self
    }

    /// Enable or disable trace collection for this request.
    pub fn trace(mut self, enable: bool) -> Self {
        self.trace = Some(enable);
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl AsRef<str>) -> Self {
        self.header(AUTHORIZATION, format!("Bearer {}", token.as_ref()))
    }

    /// Set basic authentication.
    pub fn basic_auth(mut self, username: impl AsRef<str>, password: Option<&str>) -> Self {
        match basic_credentials(username.as_ref(), password) {
            Ok(value) => {
                self.headers.insert(AUTHORIZATION, value);
                self
            }
            Err(e) => self.fail(HttpClientError::RequestBuild(e.to_string())),
        }
    }

    /// Build the URL with query parameters.
    fn build_url(&self) -> Result<url::Url> {
        let mut url = if let Some(base) = &self.client.config.base_url {
            let base =
                url::Url::parse(base).map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
            base.join(&self.url)
                .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?
        } else {
            url::Url::parse(&self.url).map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?
        };

        if !self.query.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                query_pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    fn payload_allowed(&self) -> bool {
        match self.method {
            Method::GET => self.allow_get_payload,
            Method::DELETE => self.allow_delete_payload,
            Method::POST | Method::PUT | Method::PATCH => true,
            _ => false,
        }
    }

    /// Merge client defaults into the request headers.
    fn build_headers(&self) -> Result<HeaderMap> {
        let config = &self.client.config;
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| HttpClientError::RequestBuild(e.to_string()))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| HttpClientError::RequestBuild(e.to_string()))?;
            headers.insert(name, value);
        }
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        if config.advertise_encodings && !headers.contains_key(ACCEPT_ENCODING) {
            let encodings = self.client.decompressors.accepted_encodings().join(", ");
            if let Ok(value) = HeaderValue::try_from(encodings)
                && !value.is_empty()
            {
                headers.insert(ACCEPT_ENCODING, value);
            }
        }
        Ok(headers)
    }

    fn into_prepared(mut self) -> Result<PreparedRequest> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let url = self.build_url()?;
        let headers = self.build_headers()?;

        let mut body = std::mem::take(&mut self.body);
        if !body.is_empty() && !self.payload_allowed() {
            debug!(method = %self.method, "Dropping request body not allowed for method");
            body = RequestBody::empty();
        }

        let retry = match self.retry {
            RetryChoice::Inherit => self.client.config.retry.clone(),
            RetryChoice::Policy(policy) => Some(policy),
            RetryChoice::Disabled => None,
        }
        .map(|mut policy| {
            policy.allow_non_idempotent |= self.allow_non_idempotent_retry;
            policy
        });

        Ok(PreparedRequest {
            method: self.method,
            url,
            headers,
            body,
            timeout: self.timeout,
            retry,
            ctx: ExecContext::new(self.cancellation, self.deadline),
            trace: self.trace.unwrap_or(self.client.config.trace),
        })
    }

    /// Send the request.
    pub async fn send(self) -> Result<Response> {
        let client = self.client;
        let prepared = self.into_prepared()?;
        client.execute(prepared).await
    }
}
