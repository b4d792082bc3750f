//! # Bulwark HTTP
//!
//! A resilient HTTP client layer. Requests go through a pluggable transport
//! wrapped in failure handling: retries with jittered exponential backoff,
//! a shared circuit breaker, idempotency-aware retry gating, streaming
//! response decompression and content-type negotiation.
//!
//! ## Features
//!
//! - **Retry with Backoff**: exponential backoff with full, equal or
//!   decorrelated jitter, honouring `Retry-After` on 429 and 503
//! - **Circuit Breaker**: rejects requests while a dependency is failing and
//!   probes it again after a timeout
//! - **Idempotency**: POST, PATCH and CONNECT are only retried on request
//! - **Cancellation**: per-request cancellation tokens and deadlines
//! - **Decompression**: gzip, deflate, zlib and brotli, extensible per client
//! - **Codecs**: JSON and XML built in, custom media types by registration
//! - **Interceptors**: request/response hooks for logging and auth
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bulwark_http::{HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?;
//!
//!     let mut response = client
//!         .get("https://api.example.com/users")
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     println!("Body: {}", response.text().await?);
//!     Ok(())
//! }
//! ```
//!
//! ## With Retry and Circuit Breaker
//!
//! ```rust,no_run
//! use bulwark_http::{
//!     Backoff, CircuitBreakerConfig, HttpClient, HttpClientConfig, JitterStrategy, RetryPolicy,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backoff = Backoff::new(
//!         Duration::from_millis(100),
//!         Duration::from_secs(2),
//!         JitterStrategy::DecorrelatedJitter,
//!     );
//!     let config = HttpClientConfig::builder()
//!         .timeout(Duration::from_secs(30))
//!         .retry(RetryPolicy::with_backoff_strategy(4, backoff))
//!         .circuit_breaker(CircuitBreakerConfig::default())
//!         .build();
//!
//!     let client = HttpClient::new(config)?;
//!
//!     // POST is not idempotent, so retries must be requested explicitly.
//!     let response = client
//!         .post("https://api.example.com/orders")
//!         .json(&serde_json::json!({"item": "widget", "quantity": 5}))
//!         .allow_non_idempotent_retry()
//!         .deadline(Duration::from_secs(10))
//!         .send()
//!         .await?;
//!
//!     println!("Took {} attempts", response.attempts());
//!     Ok(())
//! }
//! ```

mod backoff;
mod body;
mod circuit_breaker;
mod client;
mod codec;
mod config;
mod context;
mod decompress;
mod error;
mod execute;
mod interceptor;
mod request;
mod response;
mod retry;
mod trace;
mod transport;

pub use backoff::{
    Backoff, DEFAULT_GROWTH, DEFAULT_MAX_WAIT, DEFAULT_MIN_WAIT, JitterStrategy, parse_retry_after,
};
pub use body::{BodyStream, RequestBody, RequestStream};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, TripPredicate};
pub use client::HttpClient;
pub use codec::{
    ContentTypeCodecs, DecodeFn, DecompressFn, DecompressorRegistry, EncodeFn,
    normalize_media_type,
};
pub use config::{HttpClientConfig, HttpClientConfigBuilder};
pub use error::{HttpClientError, Result, RetryExhausted, TransportError};
pub use interceptor::{AuthInterceptor, Interceptor, LoggingInterceptor};
pub use request::RequestBuilder;
pub use response::Response;
pub use retry::{
    ExhaustionPolicy, RetryCondition, RetryPolicy, default_retry_condition, is_idempotent,
    status_is_retryable,
};
pub use trace::{AttemptTrace, TraceInfo};
pub use transport::{RawResponse, ReqwestTransport, Transport};

/// Stream decoders usable with [`HttpClient::register_decompressor`].
pub mod decoders {
    #[cfg(feature = "brotli")]
    pub use crate::decompress::brotli;
    pub use crate::decompress::{deflate, gzip, zlib};
}

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use bulwark_http::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::{Backoff, JitterStrategy};
    pub use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
    pub use crate::client::HttpClient;
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder};
    pub use crate::error::{HttpClientError, Result, RetryExhausted, TransportError};
    pub use crate::interceptor::Interceptor;
    pub use crate::request::RequestBuilder;
    pub use crate::response::Response;
    pub use crate::retry::{ExhaustionPolicy, RetryPolicy};
    pub use crate::transport::{RawResponse, Transport};
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
    pub use tokio_util::sync::CancellationToken;
}
