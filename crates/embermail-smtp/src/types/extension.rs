//! EHLO capability parsing.

use crate::types::Reply;

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN (RFC 4616).
    Plain,
    /// LOGIN (legacy two-step plaintext).
    Login,
    /// XOAUTH2 (Google/Microsoft bearer-token SASL).
    XOAuth2,
    /// CRAM-MD5 challenge-response.
    CramMd5,
}

impl AuthMechanism {
    /// Parses a mechanism name from an EHLO AUTH line.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    /// Returns the mechanism name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
            Self::CramMd5 => "CRAM-MD5",
        }
    }
}

/// Server capabilities discovered from the EHLO response.
///
/// Refreshed once per connection (and again after STARTTLS, which resets
/// the advertised set).
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Authentication mechanisms in advertised order.
    pub auth: Vec<AuthMechanism>,
    /// Maximum message size, if advertised with a value.
    pub size_limit: Option<usize>,
    /// BDAT chunked transfer (RFC 3030).
    pub chunking: bool,
    /// Command pipelining.
    pub pipelining: bool,
    /// 8-bit MIME transport.
    pub eight_bit_mime: bool,
    /// TLS upgrade available.
    pub starttls: bool,
    /// Delivery status notifications.
    pub dsn: bool,
    /// UTF-8 addresses.
    pub utf8: bool,
}

impl Capabilities {
    /// Parses capabilities from an EHLO reply, skipping the greeting line.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let mut caps = Self::default();
        for line in reply.message.iter().skip(1) {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            match keyword.to_uppercase().as_str() {
                "STARTTLS" => caps.starttls = true,
                "AUTH" => caps.auth = words.filter_map(AuthMechanism::parse).collect(),
                "SIZE" => caps.size_limit = words.next().and_then(|s| s.parse().ok()),
                "CHUNKING" => caps.chunking = true,
                "PIPELINING" => caps.pipelining = true,
                "8BITMIME" => caps.eight_bit_mime = true,
                "DSN" => caps.dsn = true,
                "SMTPUTF8" => caps.utf8 = true,
                _ => {}
            }
        }
        caps
    }
}
