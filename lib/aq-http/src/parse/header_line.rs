/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use super::HttpLineParseError;

pub struct HttpHeaderLine<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> HttpHeaderLine<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<HttpHeaderLine<'a>, HttpLineParseError> {
        let line = std::str::from_utf8(buf)?;
        let Some(p) = memchr::memchr(b':', line.as_bytes()) else {
            return Err(HttpLineParseError::NoDelimiterFound(':'));
        };

        let name = line[0..p].trim();
        let value = line[p + 1..].trim();

        Ok(HttpHeaderLine { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple() {
        let h = HttpHeaderLine::parse(b"Content-Length: 30\r\n").unwrap();
        assert_eq!(h.name, "Content-Length");
        assert_eq!(h.value, "30");
    }

    #[test]
    fn no_value() {
        let h = HttpHeaderLine::parse(b"X-Empty:\r\n").unwrap();
        assert_eq!(h.name, "X-Empty");
        assert_eq!(h.value, "");
    }

    #[test]
    fn no_delimiter() {
        assert!(HttpHeaderLine::parse(b"broken header line\r\n").is_err());
    }
}
