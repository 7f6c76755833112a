/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io;

use futures_util::FutureExt;
use http::Method;
use tokio::io::AsyncWriteExt;

use aq_http::client::{HttpClientResponse, HttpResponseParseError};
use aq_io_ext::LimitedBufReadExt;

use crate::HttpClientError;
use crate::connect::{HttpConnectionReader, HttpConnectionWriter};
use crate::pool::PoolKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    RequestSent,
    ResponseActive,
    Closed,
}

/// One client connection, owning the transport and the exchange lifecycle.
///
/// Exactly one exchange may be in flight: Idle -> RequestSent ->
/// ResponseActive -> Idle again once the response body is fully drained, or
/// Closed on any transport or protocol failure and when the exchange decided
/// the connection is not reusable.
pub struct HttpClientConnection {
    peer: PoolKey,
    pub(crate) reader: HttpConnectionReader,
    writer: HttpConnectionWriter,
    state: ConnectionState,
    will_close: bool,
}

impl HttpClientConnection {
    pub(crate) fn new(
        peer: PoolKey,
        reader: HttpConnectionReader,
        writer: HttpConnectionWriter,
    ) -> Self {
        HttpClientConnection {
            peer,
            reader,
            writer,
            state: ConnectionState::Idle,
            will_close: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn will_close(&self) -> bool {
        self.will_close
    }

    pub(crate) fn peer(&self) -> &PoolKey {
        &self.peer
    }

    /// Idempotent. The transport is released when the connection is dropped,
    /// a closed connection is never handed out again by its pool.
    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub(crate) async fn send_request(
        &mut self,
        head: &[u8],
        body: Option<&[u8]>,
    ) -> Result<(), HttpClientError> {
        match self.state {
            ConnectionState::Idle => {}
            ConnectionState::RequestSent | ConnectionState::ResponseActive => {
                return Err(HttpClientError::ResponseNotReady);
            }
            ConnectionState::Closed => {
                return Err(HttpClientError::ConnectionError {
                    peer: self.peer.to_string(),
                    source: io::Error::new(io::ErrorKind::NotConnected, "connection closed"),
                });
            }
        }

        if let Err(e) = self.write_request(head, body).await {
            self.state = ConnectionState::Closed;
            return Err(HttpClientError::ConnectionError {
                peer: self.peer.to_string(),
                source: e,
            });
        }
        self.state = ConnectionState::RequestSent;
        Ok(())
    }

    async fn write_request(&mut self, head: &[u8], body: Option<&[u8]>) -> io::Result<()> {
        self.writer.write_all(head).await?;
        if let Some(body) = body {
            self.writer.write_all(body).await?;
        }
        self.writer.flush().await
    }

    pub(crate) async fn recv_response(
        &mut self,
        method: &Method,
        max_line_length: usize,
        max_header_count: usize,
    ) -> Result<HttpClientResponse, HttpClientError> {
        if self.state != ConnectionState::RequestSent {
            return Err(HttpClientError::ResponseNotReady);
        }
        match HttpClientResponse::parse(
            &mut self.reader,
            method,
            true,
            max_line_length,
            max_header_count,
        )
        .await
        {
            Ok(rsp) => {
                self.will_close = !rsp.keep_alive();
                self.state = ConnectionState::ResponseActive;
                Ok(rsp)
            }
            Err(e) => {
                self.state = ConnectionState::Closed;
                // a reply that never arrived is a transport failure, only a
                // malformed one is a protocol failure
                Err(match e {
                    HttpResponseParseError::RemoteClosed => HttpClientError::ConnectionError {
                        peer: self.peer.to_string(),
                        source: io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "remote closed before a full reply",
                        ),
                    },
                    HttpResponseParseError::IoFailed(io_err) => HttpClientError::ConnectionError {
                        peer: self.peer.to_string(),
                        source: io_err,
                    },
                    e => HttpClientError::Protocol {
                        peer: self.peer.to_string(),
                        source: e,
                    },
                })
            }
        }
    }

    /// The response body was fully drained, the connection may go back idle.
    pub(crate) fn response_done(&mut self) {
        if self.state == ConnectionState::ResponseActive {
            self.state = if self.will_close {
                ConnectionState::Closed
            } else {
                ConnectionState::Idle
            };
        }
    }

    /// An idle parked connection must not have pending input: readable data
    /// or eof means the server closed or corrupted it while parked.
    pub(crate) fn is_reusable(&mut self) -> bool {
        if self.state != ConnectionState::Idle || self.will_close {
            return false;
        }
        self.reader.fill_wait_data().now_or_never().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;
    use tokio::net::{TcpListener, TcpStream};

    async fn connected_pair() -> (HttpClientConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (r, w) = client.into_split();
        let conn = HttpClientConnection::new(
            PoolKey::new("127.0.0.1", addr.port()),
            BufReader::new(r),
            w,
        );
        (conn, server)
    }

    #[tokio::test]
    async fn reject_overlapping_requests() {
        let (mut conn, _server) = connected_pair().await;

        conn.send_request(b"GET / HTTP/1.1\r\n\r\n", None)
            .await
            .unwrap();
        assert_eq!(conn.state(), ConnectionState::RequestSent);

        let err = conn
            .send_request(b"GET / HTTP/1.1\r\n\r\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::ResponseNotReady));
    }

    #[tokio::test]
    async fn reject_response_before_request() {
        let (mut conn, _server) = connected_pair().await;

        let err = conn
            .recv_response(&Method::GET, 4096, 64)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::ResponseNotReady));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut conn, _server) = connected_pair().await;

        conn.close();
        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);

        let err = conn
            .send_request(b"GET / HTTP/1.1\r\n\r\n", None)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::ConnectionError { .. }));
    }
}
