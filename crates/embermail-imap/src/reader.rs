//! Streaming line-and-literal reader.
//!
//! IMAP responses interleave CRLF-terminated lines with `{N}` literals of
//! exactly N raw octets, which must be consumed byte-exactly regardless of
//! embedded line endings. The reader keeps an index-based scratch buffer
//! and an explicit remaining-octet counter, so parsing resumes cleanly at
//! any chunk boundary. Large literals are never buffered whole: they can be
//! drained in bounded chunks through a [`ChunkConsumer`].

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use embermail_core::Transport;

use crate::{Error, Result};

/// Ceiling for literals the engine will buffer in memory (header blocks and
/// MIME probes). Body content is streamed instead.
const MAX_BUFFERED_LITERAL: usize = 256 * 1024;

/// Consumer for literal content drained in bounded chunks.
pub(crate) trait ChunkConsumer: Send {
    /// Receives the next chunk of raw literal octets.
    fn consume(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// Buffered reader over the transport.
pub(crate) struct LineReader<T: Transport> {
    pub(crate) transport: T,
    buf: BytesMut,
    chunk_size: usize,
    io_timeout: Duration,
}

impl<T: Transport> LineReader<T> {
    pub(crate) fn new(transport: T, chunk_size: usize, io_timeout: Duration) -> Self {
        Self {
            transport,
            buf: BytesMut::new(),
            chunk_size: chunk_size.max(16),
            io_timeout,
        }
    }

    /// Drops buffered bytes, e.g. after a reconnect.
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    /// Returns true if a full line or buffered input is ready, or the
    /// transport reports readable bytes.
    pub(crate) async fn poll_available(&mut self) -> Result<usize> {
        if !self.buf.is_empty() {
            return Ok(self.buf.len());
        }
        Ok(self.transport.available().await?)
    }

    /// Reads one line, stripping the terminating CRLF.
    pub(crate) async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.buf.split_to(pos + 2);
                return Ok(String::from_utf8_lossy(&line[..line.len() - 2]).into_owned());
            }
            self.fill().await?;
        }
    }

    /// Reads exactly `len` literal octets into memory.
    ///
    /// Used for header blocks and MIME probes, which are small by
    /// construction; anything larger should stream.
    pub(crate) async fn read_literal(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > MAX_BUFFERED_LITERAL {
            return Err(Error::ParseFailed(format!(
                "literal of {len} octets exceeds the buffered limit"
            )));
        }
        let mut out = Vec::with_capacity(len);
        let mut remaining = len;
        while remaining > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = remaining.min(self.buf.len());
            out.extend_from_slice(&self.buf.split_to(take));
            remaining -= take;
        }
        Ok(out)
    }

    /// Drains exactly `len` literal octets through `consumer` in chunks of
    /// at most the configured chunk size.
    pub(crate) async fn stream_literal<K: ChunkConsumer>(
        &mut self,
        len: usize,
        consumer: &mut K,
    ) -> Result<()> {
        let mut remaining = len;
        while remaining > 0 {
            if self.buf.is_empty() {
                self.fill().await?;
            }
            let take = remaining.min(self.buf.len()).min(self.chunk_size);
            let chunk = self.buf.split_to(take);
            consumer.consume(&chunk).await?;
            remaining -= take;
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; self.chunk_size];
        let n = tokio::time::timeout(self.io_timeout, self.transport.read(&mut chunk))
            .await
            .map_err(|_| embermail_core::Error::ReadTimeout(self.io_timeout))??;
        if n == 0 {
            return Err(embermail_core::Error::ConnectionClosed.into());
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(())
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<()> {
        tokio::time::timeout(self.io_timeout, self.transport.write(data))
            .await
            .map_err(|_| embermail_core::Error::ReadTimeout(self.io_timeout))??;
        Ok(())
    }
}

/// Parses a trailing `{N}` or `{N+}` literal announcement on a line.
pub(crate) fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end();
    if !trimmed.ends_with('}') {
        return None;
    }
    let open = trimmed.rfind('{')?;
    let inner = &trimmed[open + 1..trimmed.len() - 1];
    let inner = inner.strip_suffix('+').unwrap_or(inner);
    inner.parse().ok()
}
