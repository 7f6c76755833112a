/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::config::RetryLimit;
use crate::error::HttpClientError;

/// One logical request. Immutable once handed to the executor: a redirect
/// derives a new request instead of mutating the dispatched one.
#[derive(Clone)]
pub struct HttpRequest {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<Bytes>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) pool_acquire_timeout: Option<Duration>,
    pub(crate) retry: Option<RetryLimit>,
    pub(crate) follow_redirect: Option<bool>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            connect_timeout: None,
            read_timeout: None,
            pool_acquire_timeout: None,
            retry: None,
            follow_redirect: None,
        }
    }

    pub fn parse(method: Method, url: &str) -> Result<Self, HttpClientError> {
        let url = Url::parse(url).map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
        Ok(HttpRequest::new(method, url))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    pub fn set_body(&mut self, body: Bytes) {
        self.body = Some(body);
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = Some(timeout);
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = Some(timeout);
    }

    pub fn set_pool_acquire_timeout(&mut self, timeout: Duration) {
        self.pool_acquire_timeout = Some(timeout);
    }

    pub fn set_retry(&mut self, retry: RetryLimit) {
        self.retry = Some(retry);
    }

    pub fn set_follow_redirect(&mut self, follow: bool) {
        self.follow_redirect = Some(follow);
    }
}

/// Serialize the request line and header block.
///
/// `Host`, `Content-Length` and `Connection` are always derived from the
/// target and body, caller supplied values for them are skipped.
pub(crate) fn serialize_request_head(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    body: Option<&Bytes>,
) -> Vec<u8> {
    let mut buf = Vec::<u8>::with_capacity(1024);

    match url.query() {
        Some(query) => {
            let _ = write!(buf, "{} {}?{} HTTP/1.1\r\n", method, url.path(), query);
        }
        None => {
            let _ = write!(buf, "{} {} HTTP/1.1\r\n", method, url.path());
        }
    }

    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => {
            let _ = write!(buf, "Host: {host}:{port}\r\n");
        }
        None => {
            let _ = write!(buf, "Host: {host}\r\n");
        }
    }

    for (name, value) in headers.iter() {
        match name.as_str() {
            "host" | "content-length" | "connection" => continue,
            _ => {}
        }
        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    if let Some(body) = body {
        let _ = write!(buf, "Content-Length: {}\r\n", body.len());
    }
    buf.extend_from_slice(b"Connection: keep-alive\r\n\r\n");

    buf
}
