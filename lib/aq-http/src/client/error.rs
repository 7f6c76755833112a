/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io;

use thiserror::Error;

use crate::HttpLineParseError;

#[derive(Debug, Error)]
pub enum HttpResponseParseError {
    #[error("remote closed")]
    RemoteClosed,
    #[error("too long line, should be less than {0}")]
    LineTooLong(usize),
    #[error("got more than {0} headers")]
    TooManyHeaders(usize),
    #[error("bad status line: {0}")]
    BadStatusLine(HttpLineParseError),
    #[error("unknown protocol version")]
    UnknownProtocol,
    #[error("invalid header line: {0}")]
    InvalidHeaderLine(HttpLineParseError),
    #[error("io failed: {0:?}")]
    IoFailed(#[from] io::Error),
}
