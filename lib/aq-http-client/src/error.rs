/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io;

use bytes::Bytes;
use thiserror::Error;

use aq_http::HttpBodyDecodeError;
use aq_http::client::HttpResponseParseError;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("request for {url} routed through the pool for {pool}")]
    HostChanged { pool: String, url: String },
    #[error("no pool connection to {peer} available")]
    PoolExhausted { peer: String },
    #[error("timed out connecting to {peer}")]
    ConnectTimeout { peer: String },
    #[error("timed out reading from {peer}")]
    ReadTimeout { peer: String },
    #[error("connection to {peer} failed: {source:?}")]
    ConnectionError {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("max retries exceeded for {url}")]
    MaxRetriesExceeded {
        url: String,
        #[source]
        source: Option<Box<HttpClientError>>,
    },
    #[error("protocol error from {peer}: {source}")]
    Protocol {
        peer: String,
        #[source]
        source: HttpResponseParseError,
    },
    #[error("response body framing error from {peer}: {source:?}")]
    BodyFraming {
        peer: String,
        #[source]
        source: io::Error,
    },
    #[error("incomplete read: got {} bytes, expected {expected}", .partial.len())]
    IncompleteRead { partial: Bytes, expected: u64 },
    #[error(transparent)]
    Decode(#[from] HttpBodyDecodeError),
    #[error("a new request may not be dispatched while the response is pending")]
    ResponseNotReady,
    #[error("response content not yet fetched, or already consumed")]
    DoubleConsumption,
}

impl HttpClientError {
    /// Transient transport failures: the reply never arrived, so the request
    /// may be retried against a fresh connection.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HttpClientError::ConnectTimeout { .. }
                | HttpClientError::ReadTimeout { .. }
                | HttpClientError::ConnectionError { .. }
        )
    }

    /// Timeouts keep their specific kind even on the last attempt, they are
    /// never wrapped into a max-retries error.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HttpClientError::ConnectTimeout { .. } | HttpClientError::ReadTimeout { .. }
        )
    }

}
