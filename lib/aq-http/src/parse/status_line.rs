/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use atoi::FromRadix10;

use super::HttpLineParseError;

pub struct HttpStatusLine<'a> {
    /// 0 for HTTP/1.0 (and HTTP/0.9 replies), 1 for any HTTP/1.x with x >= 1
    pub version: u8,
    pub code: u16,
    pub reason: &'a str,
}

impl<'a> HttpStatusLine<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<HttpStatusLine<'a>, HttpLineParseError> {
        const MINIMAL_LENGTH: usize = 13; // HTTP/1.x XYZ\n

        if buf.len() < MINIMAL_LENGTH {
            return Err(HttpLineParseError::NotLongEnough);
        }

        let Some(p) = memchr::memchr(b' ', buf) else {
            return Err(HttpLineParseError::NoDelimiterFound(' '));
        };
        let version = Self::parse_version(&buf[0..p])?;

        let left = &buf[p + 1..];
        let (code, len) = u16::from_radix_10(left);
        if len != 3 || !(100..=999).contains(&code) {
            return Err(HttpLineParseError::InvalidStatusCode);
        }
        match left.get(len).copied() {
            None | Some(b' ') | Some(b'\r') | Some(b'\n') => {}
            Some(_) => return Err(HttpLineParseError::InvalidStatusCode),
        }
        let reason = std::str::from_utf8(&left[len..])?.trim();

        Ok(HttpStatusLine {
            version,
            code,
            reason,
        })
    }

    fn parse_version(buf: &[u8]) -> Result<u8, HttpLineParseError> {
        let Some(v) = buf.strip_prefix(b"HTTP/") else {
            return Err(HttpLineParseError::InvalidVersion);
        };
        match v {
            // some servers still reply with 0.9, treat it as 1.0
            b"1.0" | b"0.9" => Ok(0),
            _ => {
                // any HTTP/1.x with x >= 1 is handled with HTTP/1.1 semantics
                if let Some(minor) = v.strip_prefix(b"1.") {
                    if !minor.is_empty() && minor.iter().all(|c| c.is_ascii_digit()) {
                        return Ok(1);
                    }
                }
                Err(HttpLineParseError::UnsupportedVersion)
            }
        }
    }
}
