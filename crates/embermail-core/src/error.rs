//! Error types shared by the transport and storage capabilities.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by transport and storage implementations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network or file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS setup failed: {0}")]
    TlsSetup(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Could not establish the connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The transport is not connected.
    #[error("Not connected")]
    NotConnected,

    /// A read did not complete within the configured timeout.
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// The requested storage tier or path is not usable.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
