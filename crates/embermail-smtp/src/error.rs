//! Error types for SMTP operations.

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure (connect, TLS, timeout, dropped peer).
    #[error(transparent)]
    Transport(#[from] embermail_core::Error),

    /// Message model or codec failure.
    #[error(transparent)]
    Mime(#[from] embermail_mime::Error),

    /// Server rejected a command with a 4xx/5xx reply.
    #[error("Command rejected {code}: {message}")]
    CommandRejected {
        /// Reply code (e.g. 550).
        code: u16,
        /// Error text from the server.
        message: String,
    },

    /// No advertised authentication mechanism matches the configured
    /// credentials.
    #[error("No supported authentication mechanism")]
    NoSupportedAuth,

    /// The server refused the credentials.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Every recipient was syntactically invalid or rejected.
    #[error("No valid recipients")]
    NoValidRecipients,

    /// The sender address is missing or syntactically invalid.
    #[error("No valid sender")]
    NoValidSender,

    /// Malformed server reply.
    #[error("Parse failed: {0}")]
    ParseFailed(String),

    /// The operation is not valid in the session's current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Creates a `CommandRejected` from a reply code and message.
    #[must_use]
    pub fn rejected(code: u16, message: impl Into<String>) -> Self {
        Self::CommandRejected {
            code,
            message: message.into(),
        }
    }
}
