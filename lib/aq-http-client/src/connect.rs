/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::HttpClientError;
use crate::connection::HttpClientConnection;
use crate::pool::PoolKey;

pub type HttpConnectionReader = BufReader<OwnedReadHalf>;
pub type HttpConnectionWriter = OwnedWriteHalf;

pub(crate) struct HttpConnector {
    key: PoolKey,
}

impl HttpConnector {
    pub(crate) fn new(key: PoolKey) -> Self {
        HttpConnector { key }
    }

    async fn select_peer_addr(&self) -> io::Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.key.host(), self.key.port())).await?;
        addrs
            .next()
            .ok_or_else(|| io::Error::other("no resolved socket address"))
    }

    pub(crate) async fn create(
        &self,
        connect_timeout: Duration,
    ) -> Result<HttpClientConnection, HttpClientError> {
        let peer = self
            .select_peer_addr()
            .await
            .map_err(|e| HttpClientError::ConnectionError {
                peer: self.key.to_string(),
                source: e,
            })?;
        match tokio::time::timeout(connect_timeout, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => {
                let (r, w) = stream.into_split();
                Ok(HttpClientConnection::new(
                    self.key.clone(),
                    BufReader::new(r),
                    w,
                ))
            }
            Ok(Err(e)) => Err(HttpClientError::ConnectionError {
                peer: self.key.to_string(),
                source: e,
            }),
            Err(_) => Err(HttpClientError::ConnectTimeout {
                peer: self.key.to_string(),
            }),
        }
    }
}
