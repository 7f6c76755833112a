/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io;
use std::mem;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Version};
use tokio::io::AsyncReadExt;
use url::Url;

use aq_http::client::HttpClientResponse;
use aq_http::{ContentDecoder, HttpBodyReader, HttpBodyType};

use crate::HttpClientError;
use crate::pool::PooledConnection;

const BODY_READ_CHUNK_SIZE: usize = 8192;

enum BodyState {
    /// body not yet fetched; empty framing holds no connection at all
    Pending {
        conn: Option<PooledConnection>,
        body_type: Option<HttpBodyType>,
    },
    Fetched(Bytes),
    Consumed,
}

/// A response with its one-shot body gate.
///
/// The body is not accessible until [`fetch_body`](Self::fetch_body) drained
/// it; fetching is a suspending step and happens exactly once. While the body
/// is unfetched this response keeps its connection checked out of the pool,
/// draining (or dropping the response) gives it back.
pub struct HttpResponse {
    code: u16,
    reason: String,
    version: Version,
    headers: HeaderMap,
    url: Url,
    read_timeout: Duration,
    body_line_max_length: usize,
    body: BodyState,
}

impl std::fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("code", &self.code)
            .field("reason", &self.reason)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .field("url", &self.url)
            .field("read_timeout", &self.read_timeout)
            .field("body_line_max_length", &self.body_line_max_length)
            .finish_non_exhaustive()
    }
}

impl HttpResponse {
    pub(crate) fn new(
        head: HttpClientResponse,
        method: &Method,
        url: Url,
        mut conn: PooledConnection,
        read_timeout: Duration,
        body_line_max_length: usize,
    ) -> Self {
        let body_type = head.body_type(method);
        let conn = match body_type {
            Some(_) => Some(conn),
            None => {
                // nothing to drain, give the connection back right away
                conn.connection().response_done();
                conn.release();
                None
            }
        };
        HttpResponse {
            code: head.code,
            reason: head.reason,
            version: head.version,
            headers: head.headers,
            url,
            read_timeout,
            body_line_max_length,
            body: BodyState::Pending { conn, body_type },
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The redirect target, when this response is a redirect reply.
    pub fn redirect_location(&self) -> Option<&str> {
        match self.code {
            301 | 302 | 303 | 307 | 308 => self
                .headers
                .get(http::header::LOCATION)
                .and_then(|v| v.to_str().ok()),
            _ => None,
        }
    }

    /// Drain and decode the whole body.
    ///
    /// Suspends until the body end is reached, then hands the connection
    /// back to its pool (or closes it when it is not reusable). May be
    /// called exactly once.
    pub async fn fetch_body(&mut self) -> Result<Bytes, HttpClientError> {
        let (conn, body_type) = match mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Pending { conn, body_type } => (conn, body_type),
            other => {
                self.body = other;
                return Err(HttpClientError::DoubleConsumption);
            }
        };

        let data = match (conn, body_type) {
            (Some(mut conn), Some(body_type)) => match self.drain(&mut conn, body_type).await {
                Ok(data) => {
                    conn.connection().response_done();
                    conn.release();
                    data
                }
                Err(e) => {
                    // the connection is out of sync, discard it
                    conn.connection().close();
                    return Err(e);
                }
            },
            _ => Bytes::new(),
        };

        self.body = BodyState::Fetched(data.clone());
        Ok(data)
    }

    async fn drain(
        &self,
        conn: &mut PooledConnection,
        body_type: HttpBodyType,
    ) -> Result<Bytes, HttpClientError> {
        let peer = conn.connection().peer().to_string();
        let mut decoder = ContentDecoder::from_headers(&self.headers);
        let mut out = Vec::<u8>::new();
        let mut read_buf = [0u8; BODY_READ_CHUNK_SIZE];

        let mut reader = HttpBodyReader::new(
            &mut conn.connection().reader,
            body_type,
            self.body_line_max_length,
        );
        loop {
            let nr = match tokio::time::timeout(self.read_timeout, reader.read(&mut read_buf)).await
            {
                Ok(Ok(nr)) => nr,
                Ok(Err(e)) => {
                    return Err(match (e.kind(), body_type) {
                        (io::ErrorKind::UnexpectedEof, HttpBodyType::ContentLength(expected)) => {
                            HttpClientError::IncompleteRead {
                                partial: Bytes::from(out),
                                expected,
                            }
                        }
                        _ => HttpClientError::BodyFraming { peer, source: e },
                    });
                }
                Err(_) => return Err(HttpClientError::ReadTimeout { peer }),
            };
            if nr == 0 {
                break;
            }
            match &mut decoder {
                Some(d) => out.extend_from_slice(&d.decode(&read_buf[0..nr])?),
                None => out.extend_from_slice(&read_buf[0..nr]),
            }
        }

        if let Some(d) = decoder {
            out.extend_from_slice(&d.finish()?);
        }
        Ok(Bytes::from(out))
    }

    /// Take the fetched body. Fails if [`fetch_body`](Self::fetch_body) was
    /// not called yet, and again after the single successful take.
    pub fn body(&mut self) -> Result<Bytes, HttpClientError> {
        match mem::replace(&mut self.body, BodyState::Consumed) {
            BodyState::Fetched(data) => Ok(data),
            pending @ BodyState::Pending { .. } => {
                self.body = pending;
                Err(HttpClientError::DoubleConsumption)
            }
            BodyState::Consumed => Err(HttpClientError::DoubleConsumption),
        }
    }
}
