//! # embermail-mime
//!
//! The message model and codec subsystem shared by the embermail engines.
//!
//! ## Outbound
//!
//! [`Message`] is the caller-built representation of an email: envelope,
//! plain/HTML bodies, attachments (sequential, parallel, inline), and nested
//! RFC 822 messages. The SMTP engine borrows it read-only during a send and
//! reads attachment content lazily in bounded chunks.
//!
//! ## Inbound
//!
//! [`PartNumber`] and [`PartInfo`] mirror a fetched message's multipart tree
//! as dot-separated part paths ("1.2.3"), the form the IMAP engine discovers
//! them in.
//!
//! ## Codecs
//!
//! [`encoding`] holds pure transforms with no session dependency: streaming
//! base64 and quoted-printable in both directions (chunk-boundary safe),
//! RFC 2047 encoded-word handling, RFC 3676 flowed text, and charset
//! transcoding to UTF-8 (Latin-1, TIS-620, passthrough with a caller hook
//! for anything else).

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod boundary;
mod content_type;
mod error;
mod message;
mod part;

pub mod charset;
pub mod encoding;
pub mod flowed;
pub mod render;
pub mod rfc2047;

pub use boundary::{generate_boundary, generate_content_id};
pub use charset::{Charset, CharsetHook, NoCharsetHook};
pub use content_type::{DEFAULT_MIME, extension_for_mime, mime_for_filename};
pub use error::{Error, Result};
pub use message::{Attachment, AttachmentSource, Mailbox, Message, TextBody};
pub use part::{PartDisposition, PartInfo, PartNumber, TransferEncoding, is_subpart};
pub use render::{BodySink, Renderer, VecSink, render_to_vec};
