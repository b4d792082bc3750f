//! HTTP client implementation.

use crate::body::BodyStream;
use crate::codec::{ContentTypeCodecs, DecompressorRegistry};
use crate::interceptor::Interceptor;
use crate::transport::{ReqwestTransport, Transport};
use crate::{CircuitBreaker, HttpClientConfig, RequestBuilder, Result};
use bytes::Bytes;
use http::Method;
use std::fmt;
use std::sync::Arc;

/// HTTP client with retry, circuit breaker, decompression and content
/// negotiation.
///
/// Cloning is cheap; clones share the transport, the circuit breaker and the
/// codec registries.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: Arc<HttpClientConfig>,
    pub(crate) circuit_breaker: Option<Arc<CircuitBreaker>>,
    pub(crate) decompressors: Arc<DecompressorRegistry>,
    pub(crate) codecs: Arc<ContentTypeCodecs>,
    pub(crate) interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl HttpClient {
    /// Create a new HTTP client backed by `reqwest`.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let transport = ReqwestTransport::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client that sends requests through a custom transport.
    pub fn with_transport(config: HttpClientConfig, transport: Arc<dyn Transport>) -> Self {
        let circuit_breaker = config
            .circuit_breaker
            .as_ref()
            .map(|cb_config| Arc::new(CircuitBreaker::new(cb_config.clone())));

        Self {
            transport,
            config: Arc::new(config),
            circuit_breaker,
            decompressors: Arc::new(DecompressorRegistry::new()),
            codecs: Arc::new(ContentTypeCodecs::new()),
            interceptors: Arc::new(Vec::new()),
        }
    }

    /// Create a new HTTP client with default configuration.
    pub fn default_client() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    /// Add an interceptor. Interceptors run in the order they were added.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        Arc::make_mut(&mut self.interceptors).push(Arc::new(interceptor));
        self
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Get the circuit breaker, if one is configured.
    pub fn circuit_breaker(&self) -> Option<&CircuitBreaker> {
        self.circuit_breaker.as_deref()
    }

    /// Get the decompressor registry.
    pub fn decompressors(&self) -> &DecompressorRegistry {
        &self.decompressors
    }

    /// Get the content-type codec registry.
    pub fn codecs(&self) -> &ContentTypeCodecs {
        &self.codecs
    }

    /// Register or replace the decompressor for a `Content-Encoding` value.
    pub fn register_decompressor<F>(&self, encoding: &str, decompress: F)
    where
        F: Fn(BodyStream) -> Result<BodyStream> + Send + Sync + 'static,
    {
        self.decompressors.register(encoding, decompress);
    }

    /// Register or replace the encoder for a media type.
    pub fn register_encoder<F>(&self, media_type: &str, encode: F) -> Result<()>
    where
        F: Fn(&serde_json::Value) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.codecs.register_encoder(media_type, encode)
    }

    /// Register or replace the decoder for a media type.
    pub fn register_decoder<F>(&self, media_type: &str, decode: F) -> Result<()>
    where
        F: Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.codecs.register_decoder(media_type, decode)
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("circuit_breaker", &self.circuit_breaker.as_ref().map(|cb| cb.state()))
            .field("decompressors", &self.decompressors)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}
