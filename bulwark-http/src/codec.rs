//! Decompressor and content-type codec registries.

use crate::body::BodyStream;
use crate::decompress;
use crate::{HttpClientError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Transform wrapping an encoded body stream in its decoder.
pub type DecompressFn = Arc<dyn Fn(BodyStream) -> Result<BodyStream> + Send + Sync>;

/// Encoder for a registered media type.
pub type EncodeFn = Arc<dyn Fn(&serde_json::Value) -> Result<Bytes> + Send + Sync>;

/// Decoder for a registered media type.
pub type DecodeFn = Arc<dyn Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync>;

const IDENTITY: &str = "identity";

/// Concurrent map from a `Content-Encoding` value to its decompressor.
///
/// Keys are matched exactly after trimming surrounding whitespace. A
/// multi-token value such as `"gzip, zlib"` is one opaque key; register a
/// transform for it that performs the whole decode chain.
pub struct DecompressorRegistry {
    entries: RwLock<HashMap<String, DecompressFn>>,
}

impl DecompressorRegistry {
    /// Create a registry with the built-in `gzip`, `x-gzip`, `deflate`,
    /// `zlib` and (with the `brotli` feature) `br` decompressors.
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("gzip", decompress::gzip);
        registry.register("x-gzip", decompress::gzip);
        registry.register("deflate", decompress::deflate);
        registry.register("zlib", decompress::zlib);
        #[cfg(feature = "brotli")]
        registry.register("br", decompress::brotli);
        registry
    }

    /// Create a registry with no decompressors.
    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace the decompressor for `encoding`.
    pub fn register<F>(&self, encoding: impl AsRef<str>, decompress: F)
    where
        F: Fn(BodyStream) -> Result<BodyStream> + Send + Sync + 'static,
    {
        self.entries
            .write()
            .insert(encoding.as_ref().trim().to_string(), Arc::new(decompress));
    }

    /// Look up the decompressor for `encoding`.
    pub fn get(&self, encoding: &str) -> Option<DecompressFn> {
        self.entries.read().get(encoding.trim()).cloned()
    }

    /// Check if `encoding` needs no transform.
    pub fn is_passthrough(encoding: &str) -> bool {
        let encoding = encoding.trim();
        encoding.is_empty() || encoding == IDENTITY
    }

    /// Wrap `body` in the decoder for `encoding`.
    ///
    /// Passthrough encodings return the body unchanged; an unregistered
    /// encoding fails with [`HttpClientError::CodecNotFound`].
    pub fn wrap(&self, encoding: &str, body: BodyStream) -> Result<BodyStream> {
        if Self::is_passthrough(encoding) {
            return Ok(body);
        }
        let decompress = self
            .get(encoding)
            .ok_or_else(|| HttpClientError::CodecNotFound(encoding.trim().to_string()))?;
        decompress(body)
    }

    /// Single-token encodings suitable for an `Accept-Encoding` header.
    pub fn accepted_encodings(&self) -> Vec<String> {
        let mut encodings: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|k| !k.contains(','))
            .cloned()
            .collect();
        encodings.sort();
        encodings
    }
}

impl Default for DecompressorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        f.debug_struct("DecompressorRegistry")
            .field("encodings", &keys)
            .finish()
    }
}

/// Media type family with a built-in fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FastPath {
    Json,
    Xml,
}

fn fast_path(media_type: &str) -> Option<FastPath> {
    match media_type {
        "application/json" => Some(FastPath::Json),
        "application/xml" | "text/xml" => Some(FastPath::Xml),
        mt if mt.ends_with("+json") => Some(FastPath::Json),
        mt if mt.ends_with("+xml") => Some(FastPath::Xml),
        _ => None,
    }
}

/// Normalize a `Content-Type` value to its bare, lowercased media type.
///
/// ```
/// use bulwark_http::normalize_media_type;
///
/// assert_eq!(
///     normalize_media_type("Application/JSON; charset=utf-8").unwrap(),
///     "application/json"
/// );
/// ```
pub fn normalize_media_type(content_type: &str) -> Result<String> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let valid = media_type.split_once('/').is_some_and(|(ty, sub)| {
        !ty.is_empty()
            && !sub.is_empty()
            && !media_type.contains(char::is_whitespace)
            && !sub.contains('/')
    });

    if valid {
        Ok(media_type)
    } else {
        Err(HttpClientError::InvalidMediaType(content_type.to_string()))
    }
}

/// Content-type negotiation for request and response bodies.
///
/// JSON and XML are handled directly through serde. Any other media type
/// needs a registered encoder or decoder, which exchange values as
/// [`serde_json::Value`].
pub struct ContentTypeCodecs {
    encoders: RwLock<HashMap<String, EncodeFn>>,
    decoders: RwLock<HashMap<String, DecodeFn>>,
}

impl ContentTypeCodecs {
    /// Create an empty codec registry.
    pub fn new() -> Self {
        Self {
            encoders: RwLock::new(HashMap::new()),
            decoders: RwLock::new(HashMap::new()),
        }
    }

    /// Register or replace the encoder for a media type.
    pub fn register_encoder<F>(&self, media_type: &str, encode: F) -> Result<()>
    where
        F: Fn(&serde_json::Value) -> Result<Bytes> + Send + Sync + 'static,
    {
        let key = normalize_media_type(media_type)?;
        self.encoders.write().insert(key, Arc::new(encode));
        Ok(())
    }

    /// Register or replace the decoder for a media type.
    pub fn register_decoder<F>(&self, media_type: &str, decode: F) -> Result<()>
    where
        F: Fn(&[u8]) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        let key = normalize_media_type(media_type)?;
        self.decoders.write().insert(key, Arc::new(decode));
        Ok(())
    }

    /// Check if bodies of this content type can be decoded.
    pub fn can_decode(&self, content_type: &str) -> Result<bool> {
        let media_type = normalize_media_type(content_type)?;
        Ok(fast_path(&media_type).is_some() || self.decoders.read().contains_key(&media_type))
    }

    /// Encode `value` for the given content type.
    pub fn encode<T: Serialize + ?Sized>(&self, content_type: &str, value: &T) -> Result<Bytes> {
        let media_type = normalize_media_type(content_type)?;
        match fast_path(&media_type) {
            Some(FastPath::Json) => serde_json::to_vec(value)
                .map(Bytes::from)
                .map_err(|e| HttpClientError::Encode(e.to_string())),
            Some(FastPath::Xml) => quick_xml::se::to_string(value)
                .map(Bytes::from)
                .map_err(|e| HttpClientError::Encode(e.to_string())),
            None => {
                let encode = self
                    .encoders
                    .read()
                    .get(&media_type)
                    .cloned()
                    .ok_or(HttpClientError::CodecNotFound(media_type))?;
                let value =
                    serde_json::to_value(value).map_err(|e| HttpClientError::Encode(e.to_string()))?;
                encode(&value)
            }
        }
    }

    /// Decode `body` of the given content type.
    pub fn decode<T: DeserializeOwned>(&self, content_type: &str, body: &[u8]) -> Result<T> {
        let media_type = normalize_media_type(content_type)?;
        match fast_path(&media_type) {
            Some(FastPath::Json) => {
                serde_json::from_slice(body).map_err(|e| HttpClientError::Decode(e.to_string()))
            }
            Some(FastPath::Xml) => {
                quick_xml::de::from_reader(body).map_err(|e| HttpClientError::Decode(e.to_string()))
            }
            None => {
                let decode = self
                    .decoders
                    .read()
                    .get(&media_type)
                    .cloned()
                    .ok_or(HttpClientError::CodecNotFound(media_type))?;
                let value = decode(body)?;
                serde_json::from_value(value).map_err(|e| HttpClientError::Decode(e.to_string()))
            }
        }
    }
}

impl Default for ContentTypeCodecs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentTypeCodecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTypeCodecs")
            .field("encoders", &self.encoders.read().len())
            .field("decoders", &self.decoders.read().len())
            .finish()
    }
}
