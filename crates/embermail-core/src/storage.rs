//! Storage capability for attachment sources and fetch sinks.
//!
//! The engines never materialize whole attachments: outbound content is read
//! from a [`StorageSource`] in bounded chunks, and fetched content is written
//! to a [`StorageSink`] chunk by chunk. Paths are interpreted relative to a
//! [`StorageTier`], mirroring hosts that split an always-present internal
//! filesystem from removable media.

#![allow(clippy::missing_errors_doc)]

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{Error, Result};

/// Storage tier a path is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageTier {
    /// Always-present storage (internal flash on the original targets).
    Internal,
    /// Removable media; may be absent at runtime.
    Removable,
}

/// A filesystem-like capability keyed by tier and path string.
pub trait Storage: Send {
    /// Chunked reader handle.
    type Source: StorageSource;
    /// Chunked writer handle.
    type Sink: StorageSink;

    /// Returns true if `path` exists on `tier`.
    fn exists(&self, tier: StorageTier, path: &str) -> impl Future<Output = bool> + Send;

    /// Opens `path` on `tier` for chunked reading.
    fn open_read(
        &self,
        tier: StorageTier,
        path: &str,
    ) -> impl Future<Output = Result<Self::Source>> + Send;

    /// Opens `path` on `tier` for writing, truncating or appending.
    fn open_write(
        &self,
        tier: StorageTier,
        path: &str,
        append: bool,
    ) -> impl Future<Output = Result<Self::Sink>> + Send;

    /// Deletes `path` on `tier`.
    fn remove(&self, tier: StorageTier, path: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Chunked read handle produced by [`Storage::open_read`].
pub trait StorageSource: Send {
    /// Reads the next chunk into `buf`, returning 0 at end of content.
    fn read_chunk(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Total content size, when the backend knows it.
    fn size(&self) -> Option<u64>;

    /// Releases the handle.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Chunked write handle produced by [`Storage::open_write`].
pub trait StorageSink: Send {
    /// Appends a chunk of bytes.
    fn write_chunk(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Flushes and releases the handle.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

/// Default [`Storage`] over the host filesystem.
///
/// Each tier maps to a root directory; a tier without a configured root is
/// reported as unavailable rather than falling back to the other.
#[derive(Debug, Clone)]
pub struct FsStorage {
    internal_root: PathBuf,
    removable_root: Option<PathBuf>,
}

impl FsStorage {
    /// Creates a storage capability rooted at `internal_root`.
    pub fn new(internal_root: impl Into<PathBuf>) -> Self {
        Self {
            internal_root: internal_root.into(),
            removable_root: None,
        }
    }

    /// Adds a root directory for the removable tier.
    #[must_use]
    pub fn with_removable_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.removable_root = Some(root.into());
        self
    }

    fn resolve(&self, tier: StorageTier, path: &str) -> Result<PathBuf> {
        let root = match tier {
            StorageTier::Internal => &self.internal_root,
            StorageTier::Removable => self.removable_root.as_ref().ok_or_else(|| {
                Error::StorageUnavailable("removable tier has no configured root".into())
            })?,
        };
        Ok(root.join(path.trim_start_matches('/')))
    }
}

impl Storage for FsStorage {
    type Source = FsSource;
    type Sink = FsSink;

    async fn exists(&self, tier: StorageTier, path: &str) -> bool {
        match self.resolve(tier, path) {
            Ok(resolved) => fs::try_exists(resolved).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn open_read(&self, tier: StorageTier, path: &str) -> Result<FsSource> {
        let resolved = self.resolve(tier, path)?;
        let file = fs::File::open(&resolved)
            .await
            .map_err(|e| storage_error(&resolved, &e))?;
        let size = file.metadata().await.ok().map(|m| m.len());
        Ok(FsSource { file, size })
    }

    async fn open_write(&self, tier: StorageTier, path: &str, append: bool) -> Result<FsSink> {
        let resolved = self.resolve(tier, path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_error(parent, &e))?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&resolved)
            .await
            .map_err(|e| storage_error(&resolved, &e))?;
        Ok(FsSink { file })
    }

    async fn remove(&self, tier: StorageTier, path: &str) -> Result<()> {
        let resolved = self.resolve(tier, path)?;
        fs::remove_file(&resolved)
            .await
            .map_err(|e| storage_error(&resolved, &e))
    }
}

fn storage_error(path: &Path, err: &std::io::Error) -> Error {
    Error::StorageUnavailable(format!("{}: {err}", path.display()))
}

/// Chunked file reader.
pub struct FsSource {
    file: fs::File,
    size: Option<u64>,
}

impl StorageSource for FsSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf).await?)
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}

/// Chunked file writer.
pub struct FsSink {
    file: fs::File,
}

impl StorageSink for FsSink {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        Ok(())
    }

    async fn close(mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_chunks() {
        let dir = std::env::temp_dir().join("embermail-core-storage-test");
        let storage = FsStorage::new(&dir);

        let mut sink = storage
            .open_write(StorageTier::Internal, "out/attach.bin", false)
            .await
            .unwrap();
        sink.write_chunk(b"hello ").await.unwrap();
        sink.write_chunk(b"chunks").await.unwrap();
        sink.close().await.unwrap();

        assert!(storage.exists(StorageTier::Internal, "out/attach.bin").await);

        let mut source = storage
            .open_read(StorageTier::Internal, "out/attach.bin")
            .await
            .unwrap();
        assert_eq!(source.size(), Some(12));

        let mut content = Vec::new();
        let mut buf = [0u8; 5];
        loop {
            let n = source.read_chunk(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            content.extend_from_slice(&buf[..n]);
        }
        assert_eq!(content, b"hello chunks");

        storage
            .remove(StorageTier::Internal, "out/attach.bin")
            .await
            .unwrap();
        assert!(!storage.exists(StorageTier::Internal, "out/attach.bin").await);
    }

    #[tokio::test]
    async fn test_removable_tier_without_root_is_unavailable() {
        let storage = FsStorage::new("/tmp");
        let result = storage.open_read(StorageTier::Removable, "x").await;
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
    }
}
