//! Request and response body types.
//!
//! Response bodies are byte streams that can be consumed once. Request bodies
//! describe whether they can be sent again, which decides if a retry is
//! possible at all.

use crate::{HttpClientError, Result};
use bytes::Bytes;
use futures::stream::{self, Stream};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

/// Streaming response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Streaming request body handed to the transport.
pub type RequestStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

type OpenFn = Arc<dyn Fn() -> io::Result<RequestStream> + Send + Sync>;

/// Build a response body from a single buffer.
pub fn full(bytes: impl Into<Bytes>) -> BodyStream {
    let bytes = bytes.into();
    if bytes.is_empty() {
        return empty();
    }
    Box::pin(stream::iter(Some(Ok(bytes))))
}

/// An empty response body.
pub fn empty() -> BodyStream {
    Box::pin(stream::empty())
}

/// Outgoing request body.
///
/// Buffered and reopenable bodies can be sent on every attempt. A one-shot
/// stream is sent once; a retry that needs it again fails with
/// [`HttpClientError::BodyNotReplayable`].
#[derive(Default)]
pub struct RequestBody {
    kind: BodyKind,
}

#[derive(Default)]
enum BodyKind {
    #[default]
    Empty,
    Bytes(Bytes),
    Reopenable {
        open: OpenFn,
        len: Option<u64>,
    },
    OneShot {
        stream: Option<RequestStream>,
        len: Option<u64>,
    },
}

impl RequestBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A buffered body.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self {
            kind: BodyKind::Bytes(bytes),
        }
    }

    /// A streaming body that `open` can produce again for every attempt.
    pub fn reopenable<F>(len: Option<u64>, open: F) -> Self
    where
        F: Fn() -> io::Result<RequestStream> + Send + Sync + 'static,
    {
        Self {
            kind: BodyKind::Reopenable {
                open: Arc::new(open),
                len,
            },
        }
    }

    /// A streaming body that can be sent exactly once.
    pub fn once(stream: RequestStream, len: Option<u64>) -> Self {
        Self {
            kind: BodyKind::OneShot {
                stream: Some(stream),
                len,
            },
        }
    }

    /// Check if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self.kind, BodyKind::Empty)
    }

    /// Body length, when known up front.
    pub fn size_hint(&self) -> Option<u64> {
        match &self.kind {
            BodyKind::Empty => Some(0),
            BodyKind::Bytes(bytes) => Some(bytes.len() as u64),
            BodyKind::Reopenable { len, .. } | BodyKind::OneShot { len, .. } => *len,
        }
    }

    /// Check if the body can be sent more than once.
    pub fn is_replayable(&self) -> bool {
        !matches!(self.kind, BodyKind::OneShot { .. })
    }

    /// Produce the transport body for the given 1-indexed attempt.
    pub(crate) fn for_attempt(&mut self, attempt: u32) -> Result<Option<reqwest::Body>> {
        match &mut self.kind {
            BodyKind::Empty => Ok(None),
            BodyKind::Bytes(bytes) => Ok(Some(reqwest::Body::from(bytes.clone()))),
            BodyKind::Reopenable { open, .. } => {
                let stream = open()?;
                Ok(Some(reqwest::Body::wrap_stream(stream)))
            }
            BodyKind::OneShot { stream, .. } => {
                if attempt > 1 {
                    return Err(HttpClientError::BodyNotReplayable);
                }
                stream
                    .take()
                    .map(|s| Some(reqwest::Body::wrap_stream(s)))
                    .ok_or(HttpClientError::BodyNotReplayable)
            }
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            BodyKind::Empty => "empty",
            BodyKind::Bytes(_) => "bytes",
            BodyKind::Reopenable { .. } => "reopenable",
            BodyKind::OneShot { .. } => "one-shot",
        };
        f.debug_struct("RequestBody")
            .field("kind", &kind)
            .field("size_hint", &self.size_hint())
            .finish()
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::from_bytes(text)
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Self::from_bytes(text)
    }
}
