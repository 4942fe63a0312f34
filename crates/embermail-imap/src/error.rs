//! Error types for IMAP operations.

/// Result type alias for IMAP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// IMAP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (connect, TLS, timeout, dropped peer).
    #[error(transparent)]
    Transport(#[from] embermail_core::Error),

    /// Codec or message model failure.
    #[error(transparent)]
    Mime(#[from] embermail_mime::Error),

    /// Server answered a tagged command with NO or BAD.
    #[error("Command rejected ({status}): {message}")]
    CommandRejected {
        /// `NO` (operational) or `BAD` (protocol).
        status: &'static str,
        /// Server text.
        message: String,
    },

    /// No advertised authentication mechanism matches the configured
    /// credentials.
    #[error("No supported authentication mechanism")]
    NoSupportedAuth,

    /// The server refused the credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Malformed response grammar. Aborts only the current response's
    /// extraction; the session remains usable.
    #[error("Parse failed: {0}")]
    ParseFailed(String),

    /// The operation is not valid in the session's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// No mailbox folder is selected for a folder-scoped operation.
    #[error("No mailbox selected")]
    NoMailboxSelected,
}

impl Error {
    pub(crate) fn no(message: impl Into<String>) -> Self {
        Self::CommandRejected {
            status: "NO",
            message: message.into(),
        }
    }

    pub(crate) fn bad(message: impl Into<String>) -> Self {
        Self::CommandRejected {
            status: "BAD",
            message: message.into(),
        }
    }
}
