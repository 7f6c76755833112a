/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io::{self, Write};
use std::mem;

use flate2::write::{GzDecoder, ZlibDecoder};
use http::HeaderMap;
use http::header::CONTENT_ENCODING;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to decode {encoding} encoded content: {source}")]
pub struct HttpBodyDecodeError {
    encoding: &'static str,
    #[source]
    source: io::Error,
}

/// Streaming content-decoding filter over the framed body bytes.
///
/// Selected from the `Content-Encoding` response header. Identity and
/// unknown encodings need no decoder and map to `None`.
pub enum ContentDecoder {
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl ContentDecoder {
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let encoding = headers.get(CONTENT_ENCODING)?.to_str().ok()?;
        match encoding.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(ContentDecoder::Gzip(GzDecoder::new(Vec::new()))),
            "deflate" => Some(ContentDecoder::Deflate(ZlibDecoder::new(Vec::new()))),
            _ => None,
        }
    }

    fn encoding(&self) -> &'static str {
        match self {
            ContentDecoder::Gzip(_) => "gzip",
            ContentDecoder::Deflate(_) => "deflate",
        }
    }

    /// Push framed bytes through the decoder, returning whatever decoded
    /// output became available.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<u8>, HttpBodyDecodeError> {
        let r = match self {
            ContentDecoder::Gzip(d) => d.write_all(data).map(|_| mem::take(d.get_mut())),
            ContentDecoder::Deflate(d) => d.write_all(data).map(|_| mem::take(d.get_mut())),
        };
        r.map_err(|e| HttpBodyDecodeError {
            encoding: self.encoding(),
            source: e,
        })
    }

    /// Flush buffered decoder state once the framed body hit its end.
    pub fn finish(self) -> Result<Vec<u8>, HttpBodyDecodeError> {
        let encoding = self.encoding();
        let r = match self {
            ContentDecoder::Gzip(d) => d.finish(),
            ContentDecoder::Deflate(d) => d.finish(),
        };
        r.map_err(|e| HttpBodyDecodeError {
            encoding,
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use http::HeaderValue;

    fn headers_with_encoding(v: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(v));
        headers
    }

    #[test]
    fn no_decoder_needed() {
        assert!(ContentDecoder::from_headers(&HeaderMap::new()).is_none());
        assert!(ContentDecoder::from_headers(&headers_with_encoding("identity")).is_none());
        assert!(ContentDecoder::from_headers(&headers_with_encoding("br")).is_none());
    }

    #[test]
    fn decode_gzip_split() {
        let plain = b"a plain text body that is a bit longer than a line";
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentDecoder::from_headers(&headers_with_encoding("gzip")).unwrap();
        let mut out = Vec::new();
        // feed in two slices to exercise the streaming path
        let (a, b) = compressed.split_at(compressed.len() / 2);
        out.extend_from_slice(&decoder.decode(a).unwrap());
        out.extend_from_slice(&decoder.decode(b).unwrap());
        out.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(out.as_slice(), plain);
    }

    #[test]
    fn decode_deflate() {
        let plain = b"deflate encoded body";
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(plain).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoder = ContentDecoder::from_headers(&headers_with_encoding("deflate")).unwrap();
        let mut out = decoder.decode(&compressed).unwrap();
        out.extend_from_slice(&decoder.finish().unwrap());
        assert_eq!(out.as_slice(), plain);
    }

    #[test]
    fn decode_garbage() {
        let mut decoder = ContentDecoder::from_headers(&headers_with_encoding("gzip")).unwrap();
        let decoded = decoder.decode(b"this is not a gzip stream at all");
        let r = decoded.and_then(|_| decoder.finish());
        assert!(r.is_err());
    }
}
