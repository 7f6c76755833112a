/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::time::Duration;

/// Retry budget for transient transport failures.
///
/// `Disabled` is distinct from `Limit(0)`: with retries disabled a transport
/// failure surfaces as a connection error, while a zero limit surfaces a
/// max-retries error after the first failed attempt. Timeouts keep their own
/// error kind in both cases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryLimit {
    Disabled,
    Limit(u32),
}

impl Default for RetryLimit {
    fn default() -> Self {
        RetryLimit::Limit(3)
    }
}

#[derive(Clone, Debug)]
pub struct HttpClientConfig {
    pool_capacity: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
    pool_acquire_timeout: Duration,
    max_line_length: usize,
    max_header_count: usize,
    body_line_max_length: usize,
    default_retry: RetryLimit,
    follow_redirect: bool,
    max_redirects: u32,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        HttpClientConfig {
            pool_capacity: 10,
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(30),
            pool_acquire_timeout: Duration::from_secs(10),
            max_line_length: 65536,
            max_header_count: 100,
            body_line_max_length: 2048,
            default_retry: RetryLimit::default(),
            follow_redirect: true,
            max_redirects: 3,
        }
    }
}

impl HttpClientConfig {
    /// Max outstanding connections per (host, port) pool.
    #[inline]
    pub fn set_pool_capacity(&mut self, count: usize) {
        self.pool_capacity = count;
    }

    #[inline]
    pub fn pool_capacity(&self) -> usize {
        self.pool_capacity
    }

    #[inline]
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[inline]
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    #[inline]
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Max time a caller may wait for a free pool slot.
    #[inline]
    pub fn set_pool_acquire_timeout(&mut self, timeout: Duration) {
        self.pool_acquire_timeout = timeout;
    }

    #[inline]
    pub fn pool_acquire_timeout(&self) -> Duration {
        self.pool_acquire_timeout
    }

    /// Ceiling for a single status or header line, in bytes.
    #[inline]
    pub fn set_max_line_length(&mut self, len: usize) {
        self.max_line_length = len;
    }

    #[inline]
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Ceiling for the header count, informational and final blocks combined.
    #[inline]
    pub fn set_max_header_count(&mut self, count: usize) {
        self.max_header_count = count;
    }

    #[inline]
    pub fn max_header_count(&self) -> usize {
        self.max_header_count
    }

    /// Ceiling for chunk size and trailer lines inside a response body.
    #[inline]
    pub fn set_body_line_max_length(&mut self, len: usize) {
        self.body_line_max_length = len;
    }

    #[inline]
    pub fn body_line_max_length(&self) -> usize {
        self.body_line_max_length
    }

    #[inline]
    pub fn set_default_retry(&mut self, retry: RetryLimit) {
        self.default_retry = retry;
    }

    #[inline]
    pub fn default_retry(&self) -> RetryLimit {
        self.default_retry
    }

    #[inline]
    pub fn set_follow_redirect(&mut self, follow: bool) {
        self.follow_redirect = follow;
    }

    #[inline]
    pub fn follow_redirect(&self) -> bool {
        self.follow_redirect
    }

    /// Redirect hop budget, counted separately from the retry budget.
    #[inline]
    pub fn set_max_redirects(&mut self, count: u32) {
        self.max_redirects = count;
    }

    #[inline]
    pub fn max_redirects(&self) -> u32 {
        self.max_redirects
    }
}
