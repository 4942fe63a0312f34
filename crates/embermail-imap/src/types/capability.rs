//! Server capability set.

/// Authentication mechanisms the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMechanism {
    /// AUTHENTICATE PLAIN.
    Plain,
    /// AUTHENTICATE LOGIN (legacy two-step).
    Login,
    /// AUTHENTICATE XOAUTH2.
    XOAuth2,
    /// CRAM-MD5-class challenge digest.
    CramMd5,
}

impl AuthMechanism {
    /// Parses an `AUTH=<name>` capability token.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            "CRAM-MD5" => Some(Self::CramMd5),
            _ => None,
        }
    }

    /// Mechanism name as sent in AUTHENTICATE.
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

/// Capabilities advertised by the server, refreshed once per connection
/// after the greeting (and again after authentication).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    /// IMAP4rev1 protocol level.
    pub imap4rev1: bool,
    /// IDLE extension (RFC 2177).
    pub idle: bool,
    /// LITERAL+ non-synchronizing literals (RFC 7888).
    pub literal_plus: bool,
    /// MULTIAPPEND (RFC 3502).
    pub multi_append: bool,
    /// UIDPLUS (RFC 4315).
    pub uid_plus: bool,
    /// STARTTLS upgrade available.
    pub starttls: bool,
    /// LOGIN command disabled by policy.
    pub login_disabled: bool,
    /// Authentication mechanisms in advertised order.
    pub auth: Vec<AuthMechanism>,
}

impl CapabilitySet {
    /// Parses the token list of a CAPABILITY response.
    #[must_use]
    pub fn parse(tokens: &[&str]) -> Self {
        let mut caps = Self::default();
        for token in tokens {
            let upper = token.to_uppercase();
            match upper.as_str() {
                "IMAP4REV1" | "IMAP4REV2" => caps.imap4rev1 = true,
                "IDLE" => caps.idle = true,
                "LITERAL+" => caps.literal_plus = true,
                "MULTIAPPEND" => caps.multi_append = true,
                "UIDPLUS" => caps.uid_plus = true,
                "STARTTLS" => caps.starttls = true,
                "LOGINDISABLED" => caps.login_disabled = true,
                _ => {
                    if let Some(mech) = upper.strip_prefix("AUTH=")
                        && let Some(mech) = AuthMechanism::parse(mech)
                    {
                        caps.auth.push(mech);
                    }
                }
            }
        }
        caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typical_line() {
        let caps = CapabilitySet::parse(&[
            "IMAP4rev1",
            "IDLE",
            "LITERAL+",
            "AUTH=PLAIN",
            "AUTH=XOAUTH2",
            "MULTIAPPEND",
        ]);
        assert!(caps.imap4rev1);
        assert!(caps.idle);
        assert!(caps.literal_plus);
        assert!(caps.multi_append);
        assert_eq!(
            caps.auth,
            vec![AuthMechanism::Plain, AuthMechanism::XOAuth2]
        );
        assert!(!caps.login_disabled);
    }

    #[test]
    fn test_unknown_tokens_ignored() {
        let caps = CapabilitySet::parse(&["X-GM-EXT-1", "AUTH=NTLM"]);
        assert!(caps.auth.is_empty());
        assert!(!caps.idle);
    }
}
