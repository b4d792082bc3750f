//! Streaming decompression of response bodies.
//!
//! Each decoder is fed chunks as they arrive from the transport and yields
//! whatever output it can produce, so a body is never buffered whole just to
//! be decompressed.

use crate::body::BodyStream;
use crate::Result;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::io::{self, Write};

#[cfg(feature = "brotli")]
const BROTLI_BUFFER_SIZE: usize = 4096;

/// Internal decoder state.
#[allow(clippy::large_enum_variant)]
enum Decoder {
    Gzip(flate2::write::GzDecoder<Vec<u8>>),
    Deflate(flate2::write::DeflateDecoder<Vec<u8>>),
    Zlib(flate2::write::ZlibDecoder<Vec<u8>>),
    #[cfg(feature = "brotli")]
    Brotli(Box<brotli::DecompressorWriter<Vec<u8>>>),
}

impl Decoder {
    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            Self::Gzip(d) => d.write_all(chunk).and_then(|_| d.flush()),
            Self::Deflate(d) => d.write_all(chunk).and_then(|_| d.flush()),
            Self::Zlib(d) => d.write_all(chunk).and_then(|_| d.flush()),
            #[cfg(feature = "brotli")]
            Self::Brotli(d) => d.write_all(chunk).and_then(|_| d.flush()),
        }
    }

    fn take_output(&mut self) -> Bytes {
        let buf = match self {
            Self::Gzip(d) => d.get_mut(),
            Self::Deflate(d) => d.get_mut(),
            Self::Zlib(d) => d.get_mut(),
            #[cfg(feature = "brotli")]
            Self::Brotli(d) => d.get_mut(),
        };
        Bytes::from(std::mem::take(buf))
    }

    fn finish(self) -> io::Result<Bytes> {
        let out = match self {
            Self::Gzip(d) => d.finish()?,
            Self::Deflate(d) => d.finish()?,
            Self::Zlib(d) => d.finish()?,
            #[cfg(feature = "brotli")]
            Self::Brotli(d) => (*d).into_inner().map_err(|_| {
                io::Error::new(io::ErrorKind::UnexpectedEof, "truncated brotli stream")
            })?,
        };
        Ok(Bytes::from(out))
    }
}

struct DecodeState {
    body: BodyStream,
    decoder: Option<Decoder>,
    seen_input: bool,
}

fn decode_stream(body: BodyStream, decoder: Decoder) -> BodyStream {
    let state = DecodeState {
        body,
        decoder: Some(decoder),
        seen_input: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            let decoder = state.decoder.as_mut()?;
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    state.seen_input = true;
                    if let Err(e) = decoder.write(&chunk) {
                        state.decoder = None;
                        return Some((Err(e), state));
                    }
                    let out = decoder.take_output();
                    if !out.is_empty() {
                        return Some((Ok(out), state));
                    }
                }
                Some(Err(e)) => {
                    state.decoder = None;
                    return Some((Err(e), state));
                }
                None => {
                    let decoder = state.decoder.take()?;
                    // An empty body carries no encoded payload at all.
                    if !state.seen_input {
                        return None;
                    }
                    return match decoder.finish() {
                        Ok(out) if out.is_empty() => None,
                        Ok(out) => Some((Ok(out), state)),
                        Err(e) => Some((Err(e), state)),
                    };
                }
            }
        }
    }))
}

/// Decode a `gzip` body.
pub fn gzip(body: BodyStream) -> Result<BodyStream> {
    Ok(decode_stream(
        body,
        Decoder::Gzip(flate2::write::GzDecoder::new(Vec::new())),
    ))
}

/// Decode a raw DEFLATE (`deflate`) body.
pub fn deflate(body: BodyStream) -> Result<BodyStream> {
    Ok(decode_stream(
        body,
        Decoder::Deflate(flate2::write::DeflateDecoder::new(Vec::new())),
    ))
}

/// Decode a zlib-wrapped (`zlib`) body.
pub fn zlib(body: BodyStream) -> Result<BodyStream> {
    Ok(decode_stream(
        body,
        Decoder::Zlib(flate2::write::ZlibDecoder::new(Vec::new())),
    ))
}

/// Decode a brotli (`br`) body.
#[cfg(feature = "brotli")]
pub fn brotli(body: BodyStream) -> Result<BodyStream> {
    Ok(decode_stream(
        body,
        Decoder::Brotli(Box::new(brotli::DecompressorWriter::new(
            Vec::new(),
            BROTLI_BUFFER_SIZE,
        ))),
    ))
}
