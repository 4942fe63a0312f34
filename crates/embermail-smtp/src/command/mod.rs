//! SMTP command builder.

use crate::types::AuthMechanism;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// EHLO command.
    Ehlo {
        /// Client hostname.
        hostname: String,
    },
    /// HELO fallback for servers rejecting EHLO.
    Helo {
        /// Client hostname.
        hostname: String,
    },
    /// STARTTLS command.
    StartTls,
    /// AUTH command with optional initial response.
    Auth {
        /// SASL mechanism.
        mechanism: AuthMechanism,
        /// Base64 initial response.
        initial_response: Option<String>,
    },
    /// MAIL FROM command.
    MailFrom {
        /// Envelope sender address.
        from: String,
        /// Message size declaration (SIZE extension).
        size: Option<usize>,
    },
    /// RCPT TO command.
    RcptTo {
        /// Envelope recipient address.
        to: String,
    },
    /// DATA command.
    Data,
    /// BDAT chunk frame header (RFC 3030).
    Bdat {
        /// Octet count of the following frame.
        size: usize,
        /// Marks the final frame of the message.
        last: bool,
    },
    /// RSET command.
    Rset,
    /// NOOP command.
    Noop,
    /// QUIT command.
    Quit,
    /// Caller-supplied raw command line (without CRLF).
    Raw(String),
}

impl Command {
    /// Serializes the command to wire bytes, CRLF-terminated.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let line = match self {
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => initial_response.as_ref().map_or_else(
                || format!("AUTH {}", mechanism.as_str()),
                |resp| format!("AUTH {} {resp}", mechanism.as_str()),
            ),
            Self::MailFrom { from, size } => size.map_or_else(
                || format!("MAIL FROM:<{from}>"),
                |n| format!("MAIL FROM:<{from}> SIZE={n}"),
            ),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Data => "DATA".to_string(),
            Self::Bdat { size, last } => {
                if *last {
                    format!("BDAT {size} LAST")
                } else {
                    format!("BDAT {size}")
                }
            }
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
            Self::Raw(line) => line.clone(),
        };

        let mut buf = line.into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }
}
