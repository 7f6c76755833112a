/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use tokio::sync::Mutex;
use url::Url;

use crate::HttpClientError;
use crate::config::HttpClientConfig;
use crate::pool::{HttpConnectionPool, PoolKey};
use crate::request::HttpRequest;
use crate::response::HttpResponse;

/// Pool manager: routes each request to the connection pool of its target
/// host and follows redirects across hosts.
pub struct HttpClient {
    config: Arc<HttpClientConfig>,
    pools: Mutex<HashMap<PoolKey, Arc<HttpConnectionPool>>>,
}

impl Default for HttpClient {
    fn default() -> Self {
        HttpClient::new(HttpClientConfig::default())
    }
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Self {
        HttpClient {
            config: Arc::new(config),
            pools: Mutex::new(HashMap::new()),
        }
    }

    async fn pool_for(&self, key: &PoolKey) -> Arc<HttpConnectionPool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(key) {
            return pool.clone();
        }
        let pool = Arc::new(HttpConnectionPool::new(key.clone(), self.config.clone()));
        pools.insert(key.clone(), pool.clone());
        pool
    }

    fn check_scheme(url: &Url) -> Result<(), HttpClientError> {
        match url.scheme() {
            "http" => Ok(()),
            // https transport is not implemented
            s => Err(HttpClientError::UnsupportedScheme(s.to_string())),
        }
    }

    /// Execute one logical request to completion, suspending the caller
    /// until the response head is in (or the request failed).
    pub async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let follow_redirect = req
            .follow_redirect
            .unwrap_or(self.config.follow_redirect());
        let mut redirects_left = self.config.max_redirects();

        // redirects hop across pools, handle them here and not pool side
        let mut req = req;
        req.follow_redirect = Some(false);

        loop {
            Self::check_scheme(&req.url)?;
            let key = PoolKey::from_url(&req.url)?;
            let pool = self.pool_for(&key).await;
            let rsp = pool.request(&req).await?;

            if !follow_redirect {
                return Ok(rsp);
            }
            let Some(location) = rsp.redirect_location() else {
                return Ok(rsp);
            };
            if redirects_left == 0 {
                return Err(HttpClientError::MaxRetriesExceeded {
                    url: req.url.to_string(),
                    source: None,
                });
            }
            redirects_left -= 1;
            let next = req
                .url
                .join(location)
                .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?;
            if rsp.code() == 303 {
                req.method = Method::GET;
                req.body = None;
            }
            log::info!("redirecting {} -> {next}", req.url);
            req.url = next;
        }
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
    ) -> Result<HttpResponse, HttpClientError> {
        self.execute(HttpRequest::parse(method, url)?).await
    }

    pub async fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        self.request(Method::GET, url).await
    }

    pub async fn head(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        self.request(Method::HEAD, url).await
    }

    pub async fn options(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        self.request(Method::OPTIONS, url).await
    }

    pub async fn delete(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        self.request(Method::DELETE, url).await
    }

    pub async fn post(&self, url: &str, body: Bytes) -> Result<HttpResponse, HttpClientError> {
        let mut req = HttpRequest::parse(Method::POST, url)?;
        req.set_body(body);
        self.execute(req).await
    }

    pub async fn put(&self, url: &str, body: Bytes) -> Result<HttpResponse, HttpClientError> {
        let mut req = HttpRequest::parse(Method::PUT, url)?;
        req.set_body(body);
        self.execute(req).await
    }

    pub async fn patch(&self, url: &str, body: Bytes) -> Result<HttpResponse, HttpClientError> {
        let mut req = HttpRequest::parse(Method::PATCH, url)?;
        req.set_body(body);
        self.execute(req).await
    }
}
