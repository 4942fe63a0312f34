//! Error types for the MIME library.

use thiserror::Error;

/// Errors that can occur while building or decoding MIME content.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid base64 input.
    #[error("Invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Invalid quoted-printable or encoded-word input.
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Decoded bytes are not valid UTF-8.
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// A part number path is not a dot-separated list of indices.
    #[error("Invalid part number: {0}")]
    InvalidPartNumber(String),

    /// An attachment carries neither a blob nor a file path.
    #[error("Attachment '{0}' has no content source")]
    AttachmentSourceMissing(String),

    /// Storage backend failure while streaming attachment content.
    #[error(transparent)]
    Storage(#[from] embermail_core::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
