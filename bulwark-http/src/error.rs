//! HTTP client error types.

use http::Method;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// Circuit breaker is open, the request was rejected before any attempt.
    #[error("Circuit breaker is open, request rejected")]
    BreakerOpen,

    /// The transport failed to produce a response.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The caller's deadline passed before the request completed.
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// No codec is registered for a Content-Encoding or media type.
    #[error("No codec registered for {0:?}")]
    CodecNotFound(String),

    /// All permitted attempts failed.
    #[error(transparent)]
    RetryExhausted(Box<RetryExhausted>),

    /// A one-shot request body cannot be sent a second time.
    #[error("Request body is not replayable and cannot be retried")]
    BodyNotReplayable,

    /// The response body was already consumed.
    #[error("Response body is already read")]
    BodyAlreadyRead,

    /// Trace information was requested but tracing was not enabled.
    #[error("Trace is not enabled for this request")]
    TraceNotEnabled,

    /// Response carried an error status.
    #[error("Response error: {status} - {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Request building error.
    #[error("Failed to build request: {0}")]
    RequestBuild(String),

    /// Content-Type header could not be parsed.
    #[error("Invalid media type: {0:?}")]
    InvalidMediaType(String),

    /// Body encoding failed.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Body decoding failed.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Interceptor error.
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// I/O error while reading a body.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for HttpClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(TransportError::from(err))
    }
}

impl From<RetryExhausted> for HttpClientError {
    fn from(err: RetryExhausted) -> Self {
        Self::RetryExhausted(Box::new(err))
    }
}

impl HttpClientError {
    /// Check if this error is a circuit breaker rejection.
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, Self::BreakerOpen)
    }

    /// Check if the request was cancelled or ran past its deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Check if this is a transport timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout(_)))
    }

    /// Get the retry exhaustion details, if any.
    pub fn retry_exhausted(&self) -> Option<&RetryExhausted> {
        match self {
            Self::RetryExhausted(e) => Some(e),
            _ => None,
        }
    }

    /// Get the HTTP status code if this is a status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Terminal error returned when every permitted attempt failed.
#[derive(Debug, Error)]
#[error("{method} {url} failed after {attempts} attempts (waited {total_wait:?})")]
pub struct RetryExhausted {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total time spent sleeping between attempts.
    pub total_wait: Duration,
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: Url,
    /// The error or status of the final attempt.
    #[source]
    pub last_error: Option<Box<HttpClientError>>,
}

/// Failure reported by a [`Transport`](crate::Transport).
///
/// Certificate, redirect, header and scheme failures are configuration
/// problems and are never retried. The rest are retried when temporary.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// TLS certificate verification failed.
    #[error("certificate verification failed: {0}")]
    Certificate(String),

    /// Redirect policy violated or redirect limit reached.
    #[error("redirect policy violated: {0}")]
    Redirect(String),

    /// Header name or value rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// URL scheme is not supported by the transport.
    #[error("unsupported protocol scheme: {0}")]
    UnsupportedScheme(String),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport gave up waiting.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Any other failure.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
        /// Whether trying again may succeed.
        temporary: bool,
    },
}

impl TransportError {
    /// Create an unclassified error.
    pub fn other(message: impl Into<String>, temporary: bool) -> Self {
        Self::Other {
            message: message.into(),
            temporary,
        }
    }

    /// Check if this is a certificate verification failure.
    pub fn is_certificate(&self) -> bool {
        matches!(self, Self::Certificate(_))
    }

    /// Errors caused by configuration rather than a transient fault.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Certificate(_)
                | Self::Redirect(_)
                | Self::InvalidHeader(_)
                | Self::UnsupportedScheme(_)
        )
    }

    /// Check if the transport considers this failure temporary.
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) => true,
            Self::Other { temporary, .. } => *temporary,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let chain = error_chain(&err);
        let lowered = chain.to_ascii_lowercase();

        if lowered.contains("certificate") || lowered.contains("unknownissuer") {
            Self::Certificate(chain)
        } else if err.is_redirect() {
            Self::Redirect(chain)
        } else if lowered.contains("scheme") {
            Self::UnsupportedScheme(chain)
        } else if lowered.contains("invalid header") || lowered.contains("header value") {
            Self::InvalidHeader(chain)
        } else if err.is_timeout() {
            Self::Timeout(chain)
        } else if err.is_connect() {
            Self::Connect(chain)
        } else {
            Self::Other {
                message: chain,
                temporary: err.is_request() && !err.is_builder(),
            }
        }
    }
}

/// Flatten an error and its sources into one message.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
