//! # embermail-core
//!
//! Shared capabilities for the embermail protocol engines: the byte-stream
//! [`Transport`] the SMTP and IMAP engines drive, the [`Storage`] capability
//! used as a source/sink for attachment bytes, and the bounded
//! [`ReconnectPolicy`] both engines consult after a dropped connection.
//!
//! The engines never open sockets or files themselves; they are generic over
//! these traits so callers can substitute their own connection establishment,
//! TLS upgrade, or storage backend. [`TlsTransport`] and [`FsStorage`] are the
//! default implementations for ordinary hosts.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod error;
mod retry;
pub mod storage;
pub mod transport;

pub use error::{Error, Result};
pub use retry::ReconnectPolicy;
pub use storage::{FsStorage, Storage, StorageSink, StorageSource, StorageTier};
pub use transport::{ScriptedTransport, StreamTransport, TlsTransport, Transport};

/// Default size of the reusable working buffer for chunked reads and writes.
///
/// Streaming operations in both engines move data through a buffer of this
/// size, so peak memory stays proportional to it rather than to message or
/// attachment size. Tune per host via the engine configs.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
