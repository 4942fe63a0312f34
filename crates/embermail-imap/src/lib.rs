//! # embermail-imap
//!
//! IMAP client engine for constrained hosts: a caller-owned session that
//! authenticates, browses, searches, and fetches mailbox content over a
//! pluggable transport, parsing responses incrementally from the byte
//! stream.
//!
//! ## Highlights
//!
//! - **Tagged correlation**: every command carries a monotonically
//!   generated tag; responses are matched by tag and classified OK/NO/BAD
//! - **Streaming literals**: `{N}` literals are consumed byte-exactly;
//!   header-sized ones are buffered, body content is drained to a
//!   [`MimeSink`] in bounded chunks through transfer decoding and charset
//!   transcoding
//! - **Multipart discovery**: the part tree is walked one `BODY.PEEK[n.MIME]`
//!   probe at a time with an explicit multipart-level stack
//! - **Folder snapshots**: SELECT/EXAMINE re-parses the selected-folder
//!   state wholesale; re-selecting the same folder within the debounce
//!   window skips the round trip
//! - **IDLE and polling**: change events (`new`/`removed`/`fetched`) with a
//!   non-blocking check and an always-returning stop
//!
//! ## Quick Start
//!
//! ```ignore
//! use embermail_core::TlsTransport;
//! use embermail_imap::{FetchOptions, ImapConfig, ImapSession, MemorySink, MessageId};
//!
//! #[tokio::main]
//! async fn main() -> embermail_imap::Result<()> {
//!     let config = ImapConfig::new("imap.example.com", 993)
//!         .credentials("user@example.com", "password");
//!     let mut session = ImapSession::new(TlsTransport::new(), config);
//!     session.connect().await?;
//!
//!     let snapshot = session.select_folder("INBOX", true).await?;
//!     println!("{} messages", snapshot.msg_count);
//!
//!     let unseen = session.search("UNSEEN", false).await?;
//!     if let Some(&seq) = unseen.first() {
//!         let mut sink = MemorySink::new();
//!         let fetched = session
//!             .fetch_message(MessageId::Seq(seq), &FetchOptions::default(), &mut sink)
//!             .await?;
//!         println!("Subject: {}", fetched.header.subject);
//!     }
//!
//!     session.logout().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
mod event;
mod fetch;
pub mod parser;
mod reader;
pub mod sasl;
mod session;
pub mod types;

pub use error::{Error, Result};
pub use event::{
    ImapEvents, MemorySink, MimeSink, NoImapEvents, PollingEvent, PollingKind, StorageMimeSink,
};
pub use fetch::{FetchOptions, FetchedMessage, MessageId};
pub use parser::headers::MessageHeader;
pub use session::{Credentials, ImapConfig, ImapSession, ImapState, Security};
pub use types::{AuthMechanism, CapabilitySet, Flag, Flags, FolderInfo, FolderSnapshot};
