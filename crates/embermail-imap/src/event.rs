//! Caller-facing observation capabilities and content sinks.

use std::future::Future;

use embermail_core::storage::{Storage, StorageSink, StorageTier};
use embermail_mime::{PartInfo, extension_for_mime};

use crate::{Error, Result};

/// Mailbox change kinds reported while listening or polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingKind {
    /// A message arrived.
    New,
    /// A message was expunged.
    Removed,
    /// A message's metadata changed (unsolicited FETCH).
    Fetched,
}

/// One mailbox change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingEvent {
    /// What changed.
    pub kind: PollingKind,
    /// Message number the change applies to.
    pub message_number: u32,
    /// Raw command argument accompanying the change (e.g. FETCH attrs).
    pub argument: String,
}

/// Observer for IMAP session activity.
///
/// One observer per session; default methods ignore everything.
pub trait ImapEvents: Send {
    /// Progress and outcome notifications.
    fn status(&mut self, _info: &str, _success: bool) {}

    /// Raw response lines, tagged with the command's correlation tag;
    /// pairs with custom commands.
    fn response(&mut self, _tag: &str, _line: &str) {}

    /// Mailbox change events from IDLE or polling.
    fn polling(&mut self, _event: &PollingEvent) {}
}

/// Observer that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoImapEvents;

impl ImapEvents for NoImapEvents {}

/// Receives decoded part content in bounded chunks during a fetch.
///
/// The engine never buffers a full part; each chunk is handed over as soon
/// as it is decoded and must not be retained past the call.
pub trait MimeSink: Send {
    /// Announces a part whose content will follow.
    fn begin_part(&mut self, part: &PartInfo) -> impl Future<Output = Result<()>> + Send;

    /// Receives the next decoded chunk of the announced part.
    fn data(&mut self, part: &PartInfo, chunk: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Closes the announced part.
    fn end_part(&mut self, part: &PartInfo) -> impl Future<Output = Result<()>> + Send;
}

/// [`MimeSink`] buffering each part in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Completed parts with their decoded content.
    pub parts: Vec<(PartInfo, Vec<u8>)>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded content of the part at `number`, if fetched.
    #[must_use]
    pub fn content(&self, number: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(part, _)| part.number.as_str() == number)
            .map(|(_, data)| data.as_slice())
    }
}

impl MimeSink for MemorySink {
    async fn begin_part(&mut self, part: &PartInfo) -> Result<()> {
        self.parts.push((part.clone(), Vec::new()));
        Ok(())
    }

    async fn data(&mut self, _part: &PartInfo, chunk: &[u8]) -> Result<()> {
        if let Some((_, buf)) = self.parts.last_mut() {
            buf.extend_from_slice(chunk);
        }
        Ok(())
    }

    async fn end_part(&mut self, _part: &PartInfo) -> Result<()> {
        Ok(())
    }
}

/// [`MimeSink`] writing each part to storage and keeping a file-name
/// manifest.
pub struct StorageMimeSink<'a, S: Storage + Sync> {
    storage: &'a S,
    tier: StorageTier,
    directory: String,
    manifest: Vec<String>,
    current: Option<S::Sink>,
    unnamed_count: usize,
}

impl<'a, S: Storage + Sync> StorageMimeSink<'a, S> {
    /// Creates a sink writing under `directory` on `tier`.
    pub fn new(storage: &'a S, tier: StorageTier, directory: impl Into<String>) -> Self {
        Self {
            storage,
            tier,
            directory: directory.into(),
            manifest: Vec::new(),
            current: None,
            unnamed_count: 0,
        }
    }

    /// File names written so far, in fetch order.
    #[must_use]
    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    /// The manifest as a newline-separated list for persistence.
    #[must_use]
    pub fn manifest_text(&self) -> String {
        self.manifest.join("\n")
    }

    fn file_name(&mut self, part: &PartInfo) -> String {
        if let Some(name) = &part.filename {
            return name.clone();
        }
        self.unnamed_count += 1;
        let ext = extension_for_mime(&part.content_type).unwrap_or("bin");
        format!("part-{}.{ext}", part.number.as_str().replace('.', "-"))
    }
}

impl<S: Storage + Sync> MimeSink for StorageMimeSink<'_, S> {
    async fn begin_part(&mut self, part: &PartInfo) -> Result<()> {
        let name = self.file_name(part);
        let path = format!("{}/{}", self.directory.trim_end_matches('/'), name);
        let sink = self
            .storage
            .open_write(self.tier, &path, false)
            .await
            .map_err(Error::Transport)?;
        self.current = Some(sink);
        self.manifest.push(name);
        Ok(())
    }

    async fn data(&mut self, _part: &PartInfo, chunk: &[u8]) -> Result<()> {
        if let Some(sink) = self.current.as_mut() {
            sink.write_chunk(chunk).await.map_err(Error::Transport)?;
        }
        Ok(())
    }

    async fn end_part(&mut self, _part: &PartInfo) -> Result<()> {
        if let Some(sink) = self.current.take() {
            sink.close().await.map_err(Error::Transport)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embermail_mime::PartNumber;

    fn part(number: &str, content_type: &str) -> PartInfo {
        let mut part = PartInfo::new(PartNumber::parse(number).unwrap());
        part.content_type = content_type.to_string();
        part
    }

    #[tokio::test]
    async fn test_memory_sink_collects_per_part() {
        let mut sink = MemorySink::new();
        let one = part("1", "text/plain");
        let two = part("2", "text/html");

        sink.begin_part(&one).await.unwrap();
        sink.data(&one, b"hello ").await.unwrap();
        sink.data(&one, b"world").await.unwrap();
        sink.end_part(&one).await.unwrap();

        sink.begin_part(&two).await.unwrap();
        sink.data(&two, b"<p>x</p>").await.unwrap();
        sink.end_part(&two).await.unwrap();

        assert_eq!(sink.content("1"), Some(b"hello world".as_slice()));
        assert_eq!(sink.content("2"), Some(b"<p>x</p>".as_slice()));
        assert_eq!(sink.content("3"), None);
    }

    #[tokio::test]
    async fn test_storage_sink_manifest() {
        let dir = std::env::temp_dir().join("embermail-imap-sink-test");
        let storage = embermail_core::FsStorage::new(&dir);
        let mut sink = StorageMimeSink::new(&storage, StorageTier::Internal, "fetched");

        let mut named = part("1.2", "application/pdf");
        named.filename = Some("report.pdf".to_string());
        sink.begin_part(&named).await.unwrap();
        sink.data(&named, b"%PDF").await.unwrap();
        sink.end_part(&named).await.unwrap();

        let unnamed = part("1.3", "image/png");
        sink.begin_part(&unnamed).await.unwrap();
        sink.data(&unnamed, b"png-bytes").await.unwrap();
        sink.end_part(&unnamed).await.unwrap();

        assert_eq!(sink.manifest(), &["report.pdf", "part-1-3.png"]);
        assert_eq!(sink.manifest_text(), "report.pdf\npart-1-3.png");
    }
}
