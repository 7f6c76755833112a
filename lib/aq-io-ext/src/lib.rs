/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

mod read_until;
use read_until::LimitedReadUntil;

mod wait_data;
use wait_data::FillWaitData;

/// Bounded buffered-read helpers used by line oriented protocol parsers.
pub trait LimitedBufReadExt: tokio::io::AsyncBufRead {
    /// Read bytes into `buf` until `delimiter` is seen or `max_len` bytes
    /// have been consumed.
    ///
    /// Returns `(found, nr)`, where `found` tells whether the delimiter was
    /// reached within the limit and `nr` is the number of bytes consumed.
    /// `nr == 0` means the underlying reader hit EOF before any data.
    fn limited_read_until<'a>(
        &'a mut self,
        delimiter: u8,
        max_len: usize,
        buf: &'a mut Vec<u8>,
    ) -> LimitedReadUntil<'a, Self>
    where
        Self: Unpin,
    {
        LimitedReadUntil::new(self, delimiter, max_len, buf)
    }

    /// Wait until the reader is readable without consuming anything.
    ///
    /// Resolves to `Ok(true)` if buffered data is available and `Ok(false)`
    /// on EOF.
    fn fill_wait_data(&mut self) -> FillWaitData<'_, Self>
    where
        Self: Unpin,
    {
        FillWaitData::new(self)
    }
}

impl<R: tokio::io::AsyncBufRead + ?Sized> LimitedBufReadExt for R {}
