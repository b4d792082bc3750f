//! HTTP response wrapper.

use crate::body::BodyStream;
use crate::codec::{ContentTypeCodecs, DecompressorRegistry};
use crate::transport::RawResponse;
use crate::trace::TraceInfo;
use crate::{HttpClientError, Result};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::{HeaderMap, StatusCode, header};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// HTTP response wrapper.
///
/// The body is a stream that can be consumed once. Every body accessor
/// takes it; a second read fails with [`HttpClientError::BodyAlreadyRead`].
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Option<Url>,
    body: Option<BodyStream>,
    codecs: Arc<ContentTypeCodecs>,
    attempts: u32,
    elapsed: Duration,
    total_wait: Duration,
    trace: Option<TraceInfo>,
}

impl From<RawResponse> for Response {
    fn from(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            url: raw.url,
            body: Some(raw.body),
            codecs: Arc::new(ContentTypeCodecs::new()),
            attempts: 1,
            elapsed: Duration::ZERO,
            total_wait: Duration::ZERO,
            trace: None,
        }
    }
}

impl Response {
    pub(crate) fn with_codecs(mut self, codecs: Arc<ContentTypeCodecs>) -> Self {
        self.codecs = codecs;
        self
    }

    /// Route the body through the decompressor for its `Content-Encoding`.
    ///
    /// On success the `Content-Encoding` and `Content-Length` headers are
    /// removed, since both describe the encoded form.
    pub(crate) fn decompress(&mut self, registry: &DecompressorRegistry) -> Result<()> {
        let Some(value) = self.headers.get(header::CONTENT_ENCODING) else {
            return Ok(());
        };
        let encoding = String::from_utf8_lossy(value.as_bytes()).into_owned();
        if DecompressorRegistry::is_passthrough(&encoding) {
            return Ok(());
        }

        let body = self.body.take().ok_or(HttpClientError::BodyAlreadyRead)?;
        self.body = Some(registry.wrap(&encoding, body)?);
        self.headers.remove(header::CONTENT_ENCODING);
        self.headers.remove(header::CONTENT_LENGTH);
        Ok(())
    }

    /// Read and discard up to `limit` bytes of the body, then close it.
    pub(crate) async fn drain(&mut self, limit: usize) {
        let Some(mut body) = self.body.take() else {
            return;
        };
        let mut read = 0;
        while read < limit {
            match body.next().await {
                Some(Ok(chunk)) => read += chunk.len(),
                _ => break,
            }
        }
    }

    pub(crate) fn set_outcome(&mut self, attempts: u32, elapsed: Duration, total_wait: Duration) {
        self.attempts = attempts;
        self.elapsed = elapsed;
        self.total_wait = total_wait;
    }

    pub(crate) fn set_trace(&mut self, trace: TraceInfo) {
        self.trace = Some(trace);
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response was a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response was a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL, when the transport reported one.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    /// Check if the body has been consumed.
    pub fn is_read(&self) -> bool {
        self.body.is_none()
    }

    /// Number of attempts it took to produce this response.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wall-clock time from the first attempt to this response.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Time spent sleeping between attempts.
    pub fn total_wait(&self) -> Duration {
        self.total_wait
    }

    /// Get the request trace.
    ///
    /// Fails with [`HttpClientError::TraceNotEnabled`] unless tracing was
    /// enabled on the client or the request.
    pub fn trace_info(&self) -> Result<&TraceInfo> {
        self.trace.as_ref().ok_or(HttpClientError::TraceNotEnabled)
    }

    /// Take the body as a stream of decoded chunks.
    pub fn bytes_stream(&mut self) -> Result<BodyStream> {
        self.body.take().ok_or(HttpClientError::BodyAlreadyRead)
    }

    /// Read the whole body.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        let mut body = self.bytes_stream()?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Read the body as UTF-8 text.
    pub async fn text(&mut self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|e| HttpClientError::Decode(e.to_string()))
    }

    /// Parse the body as JSON.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| HttpClientError::Decode(e.to_string()))
    }

    /// Parse the body as XML.
    pub async fn xml<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes().await?;
        quick_xml::de::from_reader(bytes.as_ref())
            .map_err(|e| HttpClientError::Decode(e.to_string()))
    }

    /// Decode the body according to its `Content-Type`.
    ///
    /// JSON and XML are decoded directly; other media types go through the
    /// client's registered decoders. The body is left unread when no decoder
    /// matches.
    pub async fn decode<T: DeserializeOwned>(&mut self) -> Result<T> {
        let content_type = self
            .content_type()
            .ok_or_else(|| HttpClientError::InvalidMediaType(String::new()))?
            .to_string();
        if !self.codecs.can_decode(&content_type)? {
            return Err(HttpClientError::CodecNotFound(
                crate::codec::normalize_media_type(&content_type)?,
            ));
        }

        let bytes = self.bytes().await?;
        self.codecs.decode(&content_type, &bytes)
    }

    /// Turn a 4xx or 5xx response into an error carrying the body text.
    pub async fn error_for_status(mut self) -> Result<Self> {
        if self.status.is_client_error() || self.status.is_server_error() {
            let message = self
                .text()
                .await
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    self.status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                });
            Err(HttpClientError::Status {
                status: self.status.as_u16(),
                message,
            })
        } else {
            Ok(self)
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("url", &self.url)
            .field("attempts", &self.attempts)
            .field("elapsed", &self.elapsed)
            .field("is_read", &self.is_read())
            .finish_non_exhaustive()
    }
}
