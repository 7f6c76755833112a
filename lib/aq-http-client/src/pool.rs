/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::Method;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::HttpClientError;
use crate::config::{HttpClientConfig, RetryLimit};
use crate::connect::HttpConnector;
use crate::connection::{ConnectionState, HttpClientConnection};
use crate::request::{HttpRequest, serialize_request_head};
use crate::response::HttpResponse;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PoolKey {
    host: String,
    port: u16,
}

impl PoolKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        PoolKey {
            host: host.into(),
            port,
        }
    }

    pub(crate) fn from_url(url: &Url) -> Result<Self, HttpClientError> {
        let host = url
            .host_str()
            .ok_or_else(|| HttpClientError::InvalidUrl("no host in url".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(80);
        Ok(PoolKey::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

type IdleQueue = Arc<Mutex<VecDeque<HttpClientConnection>>>;

/// A connection checked out of its pool, together with the capacity permit.
///
/// Dropping it discards the connection and frees the capacity slot. Calling
/// [`release`](Self::release) parks the connection for reuse instead, if it
/// went back to the idle state.
pub(crate) struct PooledConnection {
    conn: HttpClientConnection,
    idle: IdleQueue,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(conn: HttpClientConnection, idle: IdleQueue, permit: OwnedSemaphorePermit) -> Self {
        PooledConnection {
            conn,
            idle,
            _permit: permit,
        }
    }

    pub(crate) fn connection(&mut self) -> &mut HttpClientConnection {
        &mut self.conn
    }

    pub(crate) fn release(self) {
        let PooledConnection {
            conn,
            idle,
            _permit,
        } = self;
        if conn.state() == ConnectionState::Idle && !conn.will_close() {
            // a poisoned lock just drops the connection instead
            if let Ok(mut queue) = idle.lock() {
                queue.push_back(conn);
            }
        }
        // the capacity permit is freed here, waking one waiting acquire
    }
}

struct RequestSettings {
    connect_timeout: Duration,
    read_timeout: Duration,
    pool_acquire_timeout: Duration,
    retry: RetryLimit,
    follow_redirect: bool,
}

impl RequestSettings {
    fn resolve(req: &HttpRequest, config: &HttpClientConfig) -> Self {
        RequestSettings {
            connect_timeout: req.connect_timeout.unwrap_or(config.connect_timeout()),
            read_timeout: req.read_timeout.unwrap_or(config.read_timeout()),
            pool_acquire_timeout: req
                .pool_acquire_timeout
                .unwrap_or(config.pool_acquire_timeout()),
            retry: req.retry.unwrap_or(config.default_retry()),
            follow_redirect: req.follow_redirect.unwrap_or(config.follow_redirect()),
        }
    }
}

/// Capacity bounded connection pool for one (host, port).
///
/// At most `pool_capacity` connections are outstanding at any moment, idle
/// ones included. Waiters are served in fifo order by the semaphore, so no
/// acquire starves while the pool turns over, and a caller that waited past
/// the acquire timeout fails with `PoolExhausted` on its own without
/// affecting anyone else's budget.
pub struct HttpConnectionPool {
    key: PoolKey,
    config: Arc<HttpClientConfig>,
    connector: HttpConnector,
    semaphore: Arc<Semaphore>,
    idle: IdleQueue,
}

impl HttpConnectionPool {
    pub fn new(key: PoolKey, config: Arc<HttpClientConfig>) -> Self {
        let connector = HttpConnector::new(key.clone());
        let semaphore = Arc::new(Semaphore::new(config.pool_capacity()));
        HttpConnectionPool {
            key,
            config,
            connector,
            semaphore,
            idle: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    async fn acquire(
        &self,
        pool_acquire_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<PooledConnection, HttpClientError> {
        let acquire = self.semaphore.clone().acquire_owned();
        let permit = match tokio::time::timeout(pool_acquire_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            // the semaphore is never closed; treat it as exhausted anyway
            Ok(Err(_)) | Err(_) => {
                return Err(HttpClientError::PoolExhausted {
                    peer: self.key.to_string(),
                });
            }
        };

        loop {
            let candidate = match self.idle.lock() {
                Ok(mut queue) => queue.pop_front(),
                Err(_) => None,
            };
            match candidate {
                Some(mut conn) => {
                    if conn.is_reusable() {
                        log::debug!("reusing idle connection to {}", self.key);
                        return Ok(PooledConnection::new(conn, self.idle.clone(), permit));
                    }
                    // the server closed it while parked, try the next one
                }
                None => break,
            }
        }

        let conn = self.connector.create(connect_timeout).await?;
        Ok(PooledConnection::new(conn, self.idle.clone(), permit))
    }

    fn assert_same_host(&self, url: &Url) -> Result<(), HttpClientError> {
        let key = PoolKey::from_url(url)?;
        if key != self.key {
            return Err(HttpClientError::HostChanged {
                pool: self.key.to_string(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    /// Execute one request against this pool's host.
    ///
    /// Transient transport failures discard the connection and are retried
    /// against a fresh one while the retry budget lasts; protocol failures
    /// and pool exhaustion surface immediately. Redirects are followed here
    /// only while they stay on this pool's host.
    pub async fn request(&self, req: &HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let settings = RequestSettings::resolve(req, &self.config);
        let mut method = req.method.clone();
        let mut url = req.url.clone();
        let mut body = req.body.clone();
        let mut retry = settings.retry;
        let mut redirects_left = self.config.max_redirects();

        loop {
            self.assert_same_host(&url)?;

            match self.send_once(&method, &url, req, body.as_ref(), &settings).await {
                Ok(rsp) => {
                    if settings.follow_redirect {
                        if let Some(location) = rsp.redirect_location() {
                            if redirects_left == 0 {
                                return Err(HttpClientError::MaxRetriesExceeded {
                                    url: url.to_string(),
                                    source: None,
                                });
                            }
                            redirects_left -= 1;
                            let next = url
                                .join(location)
                                .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
                            // rfc9110 Section 15.4.4: a 303 rewrites the
                            // method to GET and drops the body
                            if rsp.code() == 303 {
                                method = Method::GET;
                                body = None;
                            }
                            log::info!("redirecting {url} -> {next}");
                            url = next;
                            continue;
                        }
                    }
                    return Ok(rsp);
                }
                Err(e) if e.is_retryable() => match retry {
                    // with retries disabled the transport failure still
                    // surfaces as its wrapped kind, never as max-retries
                    RetryLimit::Disabled => return Err(e),
                    RetryLimit::Limit(0) => {
                        return Err(if e.is_timeout() {
                            e
                        } else {
                            HttpClientError::MaxRetriesExceeded {
                                url: url.to_string(),
                                source: Some(Box::new(e)),
                            }
                        });
                    }
                    RetryLimit::Limit(left) => {
                        retry = RetryLimit::Limit(left - 1);
                        log::warn!(
                            "retrying ({left} attempts remain) after connection broken by '{e}': {url}"
                        );
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        req: &HttpRequest,
        body: Option<&bytes::Bytes>,
        settings: &RequestSettings,
    ) -> Result<HttpResponse, HttpClientError> {
        let mut conn = self
            .acquire(settings.pool_acquire_timeout, settings.connect_timeout)
            .await?;

        let head = serialize_request_head(method, url, &req.headers, body);
        conn.connection()
            .send_request(head.as_slice(), body.map(|b| b.as_ref()))
            .await?;

        let recv = conn.connection().recv_response(
            method,
            self.config.max_line_length(),
            self.config.max_header_count(),
        );
        let rsp_head = match tokio::time::timeout(settings.read_timeout, recv).await {
            Ok(Ok(rsp)) => rsp,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                conn.connection().close();
                return Err(HttpClientError::ReadTimeout {
                    peer: self.key.to_string(),
                });
            }
        };

        log::debug!(
            "\"{} {} {:?}\" {} from {}",
            method,
            url,
            rsp_head.version,
            rsp_head.code,
            self.key
        );

        Ok(HttpResponse::new(
            rsp_head,
            method,
            url.clone(),
            conn,
            settings.read_timeout,
            self.config.body_line_max_length(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request_head(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut byte = [0u8; 1];
        while !data.ends_with(b"\r\n\r\n") {
            let nr = stream.read(&mut byte).await.unwrap();
            if nr == 0 {
                break;
            }
            data.extend_from_slice(&byte);
        }
        String::from_utf8(data).unwrap()
    }

    fn pool_to(addr: std::net::SocketAddr, config: HttpClientConfig) -> HttpConnectionPool {
        HttpConnectionPool::new(
            PoolKey::new(addr.ip().to_string(), addr.port()),
            Arc::new(config),
        )
    }

    fn request_to(addr: std::net::SocketAddr, path: &str) -> HttpRequest {
        let url = Url::parse(&format!("http://{addr}{path}")).unwrap();
        HttpRequest::new(Method::GET, url)
    }

    #[tokio::test]
    async fn reuse_idle_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let server_accepted = accepted.clone();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            server_accepted.fetch_add(1, Ordering::Relaxed);
            for _ in 0..2 {
                let _ = read_request_head(&mut stream).await;
                stream
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: keep-alive\r\n\r\nhello",
                    )
                    .await
                    .unwrap();
            }
        });

        let pool = pool_to(addr, HttpClientConfig::default());

        for _ in 0..2 {
            let mut rsp = pool.request(&request_to(addr, "/")).await.unwrap();
            assert_eq!(rsp.code(), 200);
            let body = rsp.fetch_body().await.unwrap();
            assert_eq!(body.as_ref(), b"hello");
        }
        assert_eq!(accepted.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn will_close_connection_is_not_reused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let server_accepted = accepted.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                server_accepted.fetch_add(1, Ordering::Relaxed);
                let _ = read_request_head(&mut stream).await;
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nbye")
                    .await
                    .unwrap();
            }
        });

        let pool = pool_to(addr, HttpClientConfig::default());

        for _ in 0..2 {
            let mut rsp = pool.request(&request_to(addr, "/")).await.unwrap();
            let body = rsp.fetch_body().await.unwrap();
            assert_eq!(body.as_ref(), b"bye");
        }
        assert_eq!(accepted.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn pool_exhausted_on_capacity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    loop {
                        let head = read_request_head(&mut stream).await;
                        if head.is_empty() {
                            break;
                        }
                        stream
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                            .await
                            .unwrap();
                    }
                });
            }
        });

        let mut config = HttpClientConfig::default();
        config.set_pool_capacity(1);
        config.set_pool_acquire_timeout(Duration::from_millis(50));
        let pool = pool_to(addr, config);

        // the first response is still open, so its connection stays checked out
        let rsp1 = pool.request(&request_to(addr, "/")).await.unwrap();
        let err = pool.request(&request_to(addr, "/")).await.unwrap_err();
        assert!(matches!(err, HttpClientError::PoolExhausted { .. }));

        // dropping the open response frees the slot again
        drop(rsp1);
        let mut rsp2 = pool.request(&request_to(addr, "/")).await.unwrap();
        assert_eq!(rsp2.fetch_body().await.unwrap().as_ref(), b"ok");
    }

    #[tokio::test]
    async fn draining_the_body_releases_the_slot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for _ in 0..2 {
                let _ = read_request_head(&mut stream).await;
                stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                    .await
                    .unwrap();
            }
        });

        let mut config = HttpClientConfig::default();
        config.set_pool_capacity(1);
        config.set_pool_acquire_timeout(Duration::from_millis(200));
        let pool = pool_to(addr, config);

        let mut rsp1 = pool.request(&request_to(addr, "/")).await.unwrap();
        rsp1.fetch_body().await.unwrap();

        let mut rsp2 = pool.request(&request_to(addr, "/")).await.unwrap();
        assert_eq!(rsp2.fetch_body().await.unwrap().as_ref(), b"ok");
    }

    #[tokio::test]
    async fn retry_on_connection_broken_by_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let server_accepted = accepted.clone();

        tokio::spawn(async move {
            // break the first connection without a reply, serve the second
            let (stream, _) = listener.accept().await.unwrap();
            server_accepted.fetch_add(1, Ordering::Relaxed);
            drop(stream);

            let (mut stream, _) = listener.accept().await.unwrap();
            server_accepted.fetch_add(1, Ordering::Relaxed);
            let _ = read_request_head(&mut stream).await;
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let pool = pool_to(addr, HttpClientConfig::default());
        let mut req = request_to(addr, "/");
        req.set_retry(RetryLimit::Limit(1));

        let mut rsp = pool.request(&req).await.unwrap();
        assert_eq!(rsp.fetch_body().await.unwrap().as_ref(), b"ok");
        assert_eq!(accepted.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn retries_exhausted_wraps_the_last_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                drop(stream);
            }
        });

        let pool = pool_to(addr, HttpClientConfig::default());
        let mut req = request_to(addr, "/");
        req.set_retry(RetryLimit::Limit(0));

        let err = pool.request(&req).await.unwrap_err();
        assert!(matches!(err, HttpClientError::MaxRetriesExceeded { .. }));
    }

    #[tokio::test]
    async fn retries_disabled_keeps_a_stable_error_surface() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                drop(stream);
            }
        });

        let pool = pool_to(addr, HttpClientConfig::default());
        let mut req = request_to(addr, "/");
        req.set_retry(RetryLimit::Disabled);

        let err = pool.request(&req).await.unwrap_err();
        assert!(matches!(err, HttpClientError::ConnectionError { .. }));
    }

    #[tokio::test]
    async fn read_timeout_is_not_wrapped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            // accept and stay silent
            let (mut stream, _) = listener.accept().await.unwrap();
            let _ = read_request_head(&mut stream).await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let pool = pool_to(addr, HttpClientConfig::default());
        let mut req = request_to(addr, "/");
        req.set_retry(RetryLimit::Limit(0));
        req.set_read_timeout(Duration::from_millis(50));

        let err = pool.request(&req).await.unwrap_err();
        assert!(matches!(err, HttpClientError::ReadTimeout { .. }));
    }

    #[tokio::test]
    async fn redirect_303_rewrites_method_to_get() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let head = read_request_head(&mut stream).await;
            assert!(head.starts_with("POST /submit "));
            // consume the request body
            let mut body = [0u8; 4];
            stream.read_exact(&mut body).await.unwrap();
            stream
                .write_all(
                    b"HTTP/1.1 303 See Other\r\nLocation: /done\r\nContent-Length: 0\r\n\r\n",
                )
                .await
                .unwrap();

            let head = read_request_head(&mut stream).await;
            assert!(head.starts_with("GET /done "));
            assert!(!head.contains("Content-Length"));
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\ndone")
                .await
                .unwrap();
        });

        let pool = pool_to(addr, HttpClientConfig::default());
        let url = Url::parse(&format!("http://{addr}/submit")).unwrap();
        let mut req = HttpRequest::new(Method::POST, url);
        req.set_body(bytes::Bytes::from_static(b"data"));

        let mut rsp = pool.request(&req).await.unwrap();
        assert_eq!(rsp.code(), 200);
        assert_eq!(rsp.fetch_body().await.unwrap().as_ref(), b"done");
    }

    #[tokio::test]
    async fn redirect_302_preserves_method() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let head = read_request_head(&mut stream).await;
            assert!(head.starts_with("POST /a "));
            let mut body = [0u8; 4];
            stream.read_exact(&mut body).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 302 Found\r\nLocation: /b\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();

            let head = read_request_head(&mut stream).await;
            assert!(head.starts_with("POST /b "));
            let mut body = [0u8; 4];
            stream.read_exact(&mut body).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
        });

        let pool = pool_to(addr, HttpClientConfig::default());
        let url = Url::parse(&format!("http://{addr}/a")).unwrap();
        let mut req = HttpRequest::new(Method::POST, url);
        req.set_body(bytes::Bytes::from_static(b"data"));

        let mut rsp = pool.request(&req).await.unwrap();
        assert_eq!(rsp.fetch_body().await.unwrap().as_ref(), b"ok");
    }

    #[tokio::test]
    async fn redirect_budget_exhausted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            loop {
                let head = read_request_head(&mut stream).await;
                if head.is_empty() {
                    break;
                }
                stream
                    .write_all(
                        b"HTTP/1.1 302 Found\r\nLocation: /loop\r\nContent-Length: 0\r\n\r\n",
                    )
                    .await
                    .unwrap();
            }
        });

        let mut config = HttpClientConfig::default();
        config.set_max_redirects(2);
        let pool = pool_to(addr, config);

        let err = pool.request(&request_to(addr, "/loop")).await.unwrap_err();
        assert!(matches!(
            err,
            HttpClientError::MaxRetriesExceeded { source: None, .. }
        ));
    }

    #[tokio::test]
    async fn same_host_is_asserted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pool = pool_to(addr, HttpClientConfig::default());
        let url = Url::parse("http://example.net/").unwrap();
        let err = pool
            .request(&HttpRequest::new(Method::GET, url))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpClientError::HostChanged { .. }));
    }
}
