/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

/// How the end of a response body is located on the wire.
///
/// An empty body (204/304/1xx replies, replies to HEAD, zero content-length)
/// has no framing mode at all and is represented as `Option<HttpBodyType>`
/// being `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpBodyType {
    ContentLength(u64),
    Chunked,
    ReadUntilEnd,
}

mod reader;
pub use reader::HttpBodyReader;

mod decode;
pub use decode::{ContentDecoder, HttpBodyDecodeError};
