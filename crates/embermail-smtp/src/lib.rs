//! # embermail-smtp
//!
//! SMTP client engine for constrained hosts: a caller-owned session state
//! machine that turns an [`embermail_mime::Message`] into a protocol
//! exchange and an encoded byte stream over a pluggable transport.
//!
//! ## Highlights
//!
//! - **Session lifecycle**: greeting, EHLO/HELO, STARTTLS upgrade, AUTH
//!   negotiation in capability-advertised order (PLAIN, LOGIN, XOAUTH2)
//! - **Bounded-memory sends**: attachments are read from their source in
//!   fixed-size chunks and base64-encoded on the fly
//! - **Chunked transfer**: BDAT framing when the server advertises CHUNKING,
//!   dot-stuffed DATA otherwise
//! - **Atomic transactions**: a failure anywhere in a send aborts the whole
//!   transaction and records one failed result
//! - **Observability**: status and raw-response observers, per-send audit
//!   records with cumulative counters
//!
//! ## Quick Start
//!
//! ```ignore
//! use embermail_core::TlsTransport;
//! use embermail_mime::{Mailbox, Message, TextBody};
//! use embermail_smtp::{SmtpConfig, SmtpSession};
//!
//! #[tokio::main]
//! async fn main() -> embermail_smtp::Result<()> {
//!     let config = SmtpConfig::new("smtp.example.com", 465)
//!         .credentials("user@example.com", "password");
//!     let mut session = SmtpSession::new(TlsTransport::new(), config);
//!     session.connect().await?;
//!
//!     let mut msg = Message::new(Mailbox::new("User", "user@example.com"));
//!     msg.add_recipient(Mailbox::address("friend@example.com"));
//!     msg.subject = "Hello".to_string();
//!     msg.text = Some(TextBody::plain("Hello from embermail!"));
//!
//!     session.send(&msg).await?;
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
pub mod event;
pub mod parser;
mod result;
pub mod sasl;
mod send;
mod session;
pub mod types;

pub use error::{Error, Result};
pub use event::{NoEvents, SendStatus, SmtpEvents};
pub use result::{SendRecord, SendingResults};
pub use session::{
    Credentials, Security, SendPhase, SessionState, SmtpConfig, SmtpSession,
};
pub use types::{AuthMechanism, Capabilities, Reply, ReplyCode, is_valid_address};
