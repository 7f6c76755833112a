/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::str::FromStr;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use tokio::io::AsyncBufRead;

use aq_io_ext::LimitedBufReadExt;

use super::HttpResponseParseError;
use crate::{HttpBodyType, HttpHeaderLine, HttpLineParseError, HttpStatusLine};

/// Parsed head of an HTTP/1.x response: status line, header block and the
/// body framing decision derived from them.
#[derive(Debug)]
pub struct HttpClientResponse {
    pub version: Version,
    pub code: u16,
    pub reason: String,
    pub headers: HeaderMap,
    keep_alive: bool,
    content_length: u64,
    has_content_length: bool,
    invalid_content_length: bool,
    chunked_transfer: bool,
    connection_close: bool,
    connection_keep_alive: bool,
}

async fn read_header_line<R>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    max_line_length: usize,
) -> Result<(), HttpResponseParseError>
where
    R: AsyncBufRead + Unpin,
{
    line_buf.clear();
    let (found, nr) = reader
        .limited_read_until(b'\n', max_line_length, line_buf)
        .await?;
    if nr == 0 {
        return Err(HttpResponseParseError::RemoteClosed);
    }
    if !found {
        return if nr < max_line_length {
            Err(HttpResponseParseError::RemoteClosed)
        } else {
            Err(HttpResponseParseError::LineTooLong(max_line_length))
        };
    }
    Ok(())
}

fn is_header_end_line(line_buf: &[u8]) -> bool {
    (line_buf.len() == 1 && line_buf[0] == b'\n')
        || (line_buf.len() == 2 && line_buf[0] == b'\r' && line_buf[1] == b'\n')
}

impl HttpClientResponse {
    fn new(version: Version, code: u16, reason: String, keep_alive: bool) -> Self {
        HttpClientResponse {
            version,
            code,
            reason,
            headers: HeaderMap::new(),
            keep_alive,
            content_length: 0,
            has_content_length: false,
            invalid_content_length: false,
            chunked_transfer: false,
            connection_close: false,
            connection_keep_alive: false,
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    fn expect_no_body(&self, method: &Method) -> bool {
        self.code < 200 || self.code == 204 || self.code == 304 || method.eq(&Method::HEAD)
    }

    /// Body framing per rfc9112 Section 6.3. `None` means no body at all.
    pub fn body_type(&self, method: &Method) -> Option<HttpBodyType> {
        if self.expect_no_body(method) {
            None
        } else if self.chunked_transfer {
            Some(HttpBodyType::Chunked)
        } else if self.has_content_length {
            if self.content_length > 0 {
                Some(HttpBodyType::ContentLength(self.content_length))
            } else {
                None
            }
        } else {
            Some(HttpBodyType::ReadUntilEnd)
        }
    }

    /// Read and parse a response head.
    ///
    /// 100 Continue replies are consumed transparently: their header block is
    /// discarded and the next status line is read, until a non-100 status is
    /// obtained. The line length ceiling applies to every line, and the
    /// header count ceiling to all informational and final blocks combined.
    pub async fn parse<R>(
        reader: &mut R,
        method: &Method,
        keep_alive: bool,
        max_line_length: usize,
        max_header_count: usize,
    ) -> Result<Self, HttpResponseParseError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line_buf = Vec::<u8>::with_capacity(1024);
        let mut header_count = 0usize;

        let mut rsp = loop {
            read_header_line(reader, &mut line_buf, max_line_length).await?;
            let rsp = Self::build_from_status_line(line_buf.as_slice(), keep_alive)?;
            if rsp.code != 100 {
                break rsp;
            }

            // discard the header block of the 100 Continue reply
            loop {
                read_header_line(reader, &mut line_buf, max_line_length).await?;
                if is_header_end_line(line_buf.as_slice()) {
                    break;
                }
                header_count += 1;
                if header_count > max_header_count {
                    return Err(HttpResponseParseError::TooManyHeaders(max_header_count));
                }
            }
        };

        // a line starting with whitespace folds into the previous field
        // value, so a header is parsed only once its whole value is in
        let mut pending = Vec::<u8>::new();
        loop {
            read_header_line(reader, &mut line_buf, max_line_length).await?;
            if is_header_end_line(line_buf.as_slice()) {
                if !pending.is_empty() {
                    rsp.parse_header_line(pending.as_slice())?;
                }
                break;
            }
            header_count += 1;
            if header_count > max_header_count {
                return Err(HttpResponseParseError::TooManyHeaders(max_header_count));
            }

            if matches!(line_buf.first().copied(), Some(b' ') | Some(b'\t'))
                && !pending.is_empty()
            {
                while matches!(pending.last().copied(), Some(b'\r') | Some(b'\n')) {
                    pending.pop();
                }
                pending.push(b' ');
                pending.extend_from_slice(line_buf.as_slice().trim_ascii_start());
                continue;
            }

            if !pending.is_empty() {
                rsp.parse_header_line(pending.as_slice())?;
            }
            pending.clear();
            pending.extend_from_slice(line_buf.as_slice());
        }

        rsp.post_check_and_fix(method);
        Ok(rsp)
    }

    fn build_from_status_line(
        line_buf: &[u8],
        keep_alive: bool,
    ) -> Result<Self, HttpResponseParseError> {
        let status = match HttpStatusLine::parse(line_buf) {
            Ok(status) => status,
            Err(HttpLineParseError::UnsupportedVersion) => {
                return Err(HttpResponseParseError::UnknownProtocol);
            }
            Err(e) => return Err(HttpResponseParseError::BadStatusLine(e)),
        };
        let version = match status.version {
            0 => Version::HTTP_10,
            1 => Version::HTTP_11,
            _ => unreachable!(),
        };

        Ok(HttpClientResponse::new(
            version,
            status.code,
            status.reason.to_string(),
            keep_alive,
        ))
    }

    fn parse_header_line(&mut self, line_buf: &[u8]) -> Result<(), HttpResponseParseError> {
        let header =
            HttpHeaderLine::parse(line_buf).map_err(HttpResponseParseError::InvalidHeaderLine)?;
        self.handle_header(header)
    }

    fn handle_header(&mut self, header: HttpHeaderLine) -> Result<(), HttpResponseParseError> {
        let name = HeaderName::from_str(header.name).map_err(|_| {
            HttpResponseParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderName)
        })?;

        match name.as_str() {
            "connection" => {
                let value = header.value.to_lowercase();
                for v in value.as_str().split(',') {
                    match v.trim() {
                        "close" => self.connection_close = true,
                        "keep-alive" => self.connection_keep_alive = true,
                        _ => {}
                    }
                }
            }
            "transfer-encoding" => {
                if header.value.eq_ignore_ascii_case("chunked") {
                    self.chunked_transfer = true;
                }
            }
            "content-length" => {
                // a negative or unparsable value is treated as if absent
                if let Ok(content_length) = u64::from_str(header.value) {
                    if self.has_content_length && self.content_length != content_length {
                        self.invalid_content_length = true;
                    }
                    self.has_content_length = true;
                    self.content_length = content_length;
                }
            }
            _ => {}
        }

        let value = HeaderValue::from_str(header.value).map_err(|_| {
            HttpResponseParseError::InvalidHeaderLine(HttpLineParseError::InvalidHeaderValue)
        })?;
        self.headers.append(name, value);
        Ok(())
    }

    /// do some necessary check and fix
    fn post_check_and_fix(&mut self, method: &Method) {
        if self.version == Version::HTTP_10 && !self.connection_keep_alive {
            self.keep_alive = false;
        }
        if self.connection_close {
            self.keep_alive = false;
        }

        if self.invalid_content_length {
            self.has_content_length = false;
        }

        if !self.expect_no_body(method) && !self.chunked_transfer && !self.has_content_length {
            // there is no way to know the body end except eof,
            // so the connection cannot be reused
            self.keep_alive = false;
        }
    }
}
