/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2026 aq project authors
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::BufMut;
use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

use super::HttpBodyType;
use crate::HttpChunkedLine;

enum NextReadType {
    EndOfFile,
    UntilEnd,
    FixedLength,
    ChunkSize,
    ChunkData,
    ChunkDataEnd(u8),
    Trailer,
}

/// Decoded reader for a response body.
///
/// Yields the body payload bytes only: chunk framing lines, the chunk end
/// whitespace and any trailer block are consumed and discarded. The reader
/// keeps its position across polls, so a caller with a small buffer may
/// resume in the middle of a chunk.
pub struct HttpBodyReader<'a, R> {
    stream: &'a mut R,
    body_type: HttpBodyType,
    next_read_type: NextReadType,
    body_line_max_len: usize,

    left_data_size: u64,
    chunk_size_line: Vec<u8>,

    trailer_line_length: usize,
    trailer_last_char: u8,

    finished: bool,
}

impl<'a, R> HttpBodyReader<'a, R>
where
    R: AsyncBufRead + Unpin,
{
    const DEFAULT_LINE_SIZE: usize = 64;

    pub fn new(stream: &'a mut R, body_type: HttpBodyType, body_line_max_len: usize) -> Self {
        let mut left_data_size = 0u64;
        let next_read_type = match &body_type {
            HttpBodyType::ContentLength(size) => {
                left_data_size = *size;
                NextReadType::FixedLength
            }
            HttpBodyType::Chunked => NextReadType::ChunkSize,
            HttpBodyType::ReadUntilEnd => NextReadType::UntilEnd,
        };
        HttpBodyReader {
            stream,
            body_type,
            next_read_type,
            body_line_max_len,
            left_data_size,
            chunk_size_line: Vec::with_capacity(Self::DEFAULT_LINE_SIZE),
            trailer_line_length: 0,
            trailer_last_char: 0,
            finished: matches!(body_type, HttpBodyType::ContentLength(0)),
        }
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn poll_eof(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let old_remaining = buf.remaining();
        ready!(Pin::new(&mut *self.stream).poll_read(cx, buf))?;
        if old_remaining == buf.remaining() {
            // io closed, which indicates the end of body
            self.finished = true;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_fixed(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let buf_len = self.left_data_size.min(buf.remaining() as u64) as usize;
        let mut limited_buf = ReadBuf::new(buf.initialize_unfilled_to(buf_len));
        ready!(Pin::new(&mut *self.stream).poll_read(cx, &mut limited_buf))?;
        let nr = limited_buf.filled().len();
        if nr == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "reader closed while reading fixed length body",
            )));
        }
        buf.advance(nr);
        self.left_data_size -= nr as u64;
        if self.left_data_size == 0 {
            self.finished = true;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_chunked(&mut self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            match self.next_read_type {
                NextReadType::EndOfFile => {
                    self.finished = true;
                    return Poll::Ready(Ok(()));
                }
                NextReadType::ChunkSize => {
                    let mut reader = Pin::new(&mut *self.stream);
                    let cache = ready!(reader.as_mut().poll_fill_buf(cx))?;
                    if cache.is_empty() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "reader closed while reading chunk size line",
                        )));
                    }
                    match memchr::memchr(b'\n', cache) {
                        Some(p) => {
                            if self.chunk_size_line.len() + p + 1 > self.body_line_max_len {
                                return Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "chunk size line too long",
                                )));
                            }
                            self.chunk_size_line.put_slice(&cache[0..=p]);
                            reader.as_mut().consume(p + 1);
                            // protocol synchronization is lost on a bad size line,
                            // the caller has to close the connection
                            let chunk = HttpChunkedLine::parse(self.chunk_size_line.as_slice())
                                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                            if chunk.chunk_size == 0 {
                                self.trailer_line_length = 0;
                                self.trailer_last_char = 0;
                                self.next_read_type = NextReadType::Trailer;
                            } else {
                                self.left_data_size = chunk.chunk_size;
                                self.next_read_type = NextReadType::ChunkData;
                            }
                            self.chunk_size_line.clear();
                        }
                        None => {
                            let len = cache.len();
                            if self.chunk_size_line.len() + len > self.body_line_max_len {
                                return Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "chunk size line too long",
                                )));
                            }
                            self.chunk_size_line.put_slice(cache);
                            reader.as_mut().consume(len);
                        }
                    }
                }
                NextReadType::ChunkData => {
                    if buf.remaining() == 0 {
                        return Poll::Ready(Ok(()));
                    }
                    let to_read = self.left_data_size.min(buf.remaining() as u64) as usize;
                    let mut limited_buf = ReadBuf::new(buf.initialize_unfilled_to(to_read));
                    ready!(Pin::new(&mut *self.stream).poll_read(cx, &mut limited_buf))?;
                    let nr = limited_buf.filled().len();
                    if nr == 0 {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "reader closed while reading chunk data",
                        )));
                    }
                    buf.advance(nr);
                    self.left_data_size -= nr as u64;
                    if self.left_data_size == 0 {
                        self.next_read_type = NextReadType::ChunkDataEnd(b'\r');
                    }
                }
                NextReadType::ChunkDataEnd(char) => {
                    let mut reader = Pin::new(&mut *self.stream);
                    let cache = ready!(reader.as_mut().poll_fill_buf(cx))?;
                    if cache.is_empty() {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "reader closed while reading chunk data end whitespace",
                        )));
                    }
                    match cache[0] {
                        b'\r' if char == b'\r' => {
                            reader.as_mut().consume(1);
                            self.next_read_type = NextReadType::ChunkDataEnd(b'\n');
                        }
                        b'\n' => {
                            reader.as_mut().consume(1);
                            self.next_read_type = NextReadType::ChunkSize;
                        }
                        _ => {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "invalid chunk data ending",
                            )));
                        }
                    }
                }
                NextReadType::Trailer => {
                    let mut reader = Pin::new(&mut *self.stream);
                    let cache = ready!(reader.as_mut().poll_fill_buf(cx))?;
                    if cache.is_empty() {
                        // a vanishingly small number of servers EOF without
                        // sending the trailer end line
                        self.next_read_type = NextReadType::EndOfFile;
                        continue;
                    }
                    match memchr::memchr(b'\n', cache) {
                        Some(p) => {
                            if self.trailer_line_length + p + 1 > self.body_line_max_len {
                                return Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "trailer line too long",
                                )));
                            }
                            let blank_line = match (self.trailer_line_length, p) {
                                (0, 0) => true,
                                (0, 1) => cache[0] == b'\r',
                                (1, 0) => self.trailer_last_char == b'\r',
                                _ => false,
                            };
                            reader.as_mut().consume(p + 1);
                            self.trailer_line_length = 0;
                            self.trailer_last_char = 0;
                            if blank_line {
                                self.next_read_type = NextReadType::EndOfFile;
                            }
                        }
                        None => {
                            let len = cache.len();
                            if self.trailer_line_length + len > self.body_line_max_len {
                                return Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "trailer line too long",
                                )));
                            }
                            self.trailer_line_length += len;
                            self.trailer_last_char = cache[len - 1];
                            reader.as_mut().consume(len);
                        }
                    }
                }
                _ => unreachable!(),
            }
        }
    }
}

impl<R> AsyncRead for HttpBodyReader<'_, R>
where
    R: AsyncBufRead + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = &mut *self;
        if me.finished || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        match me.body_type {
            HttpBodyType::ReadUntilEnd => me.poll_eof(cx, buf),
            HttpBodyType::ContentLength(_) => me.poll_fixed(cx, buf),
            HttpBodyType::Chunked => {
                let old_remaining = buf.remaining();
                match me.poll_chunked(cx, buf) {
                    Poll::Pending => {
                        if buf.remaining() < old_remaining {
                            Poll::Ready(Ok(()))
                        } else {
                            Poll::Pending
                        }
                    }
                    r => r,
                }
            }
        }
    }
}
