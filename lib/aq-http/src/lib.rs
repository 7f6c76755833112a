/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

mod parse;
pub use parse::{HttpChunkedLine, HttpHeaderLine, HttpLineParseError, HttpStatusLine};

mod body;
pub use body::{ContentDecoder, HttpBodyDecodeError, HttpBodyReader, HttpBodyType};

pub mod client;
