//! Envelope address validation.

/// Checks an address for basic RFC 5321 envelope syntax.
///
/// Invalid recipients are skipped (not fatal) during a send, so this check
/// decides which addresses reach `RCPT TO` at all: exactly one `@`,
/// non-empty local part, and a dotted domain without whitespace or control
/// characters.
#[must_use]
pub fn is_valid_address(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    if addr
        .bytes()
        .any(|b| b.is_ascii_whitespace() || b.is_ascii_control() || b == b'<' || b == b'>')
    {
        return false;
    }
    // Domain must be dotted and not start/end on a dot.
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        assert!(is_valid_address("user@example.com"));
        assert!(is_valid_address("first.last@sub.example.co"));
        assert!(is_valid_address("u+tag@example.org"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("no-at-sign"));
        assert!(!is_valid_address("@example.com"));
        assert!(!is_valid_address("user@"));
        assert!(!is_valid_address("user@@example.com"));
        assert!(!is_valid_address("user@localhost"));
        assert!(!is_valid_address("user@.example.com"));
        assert!(!is_valid_address("user@example.com."));
        assert!(!is_valid_address("us er@example.com"));
        assert!(!is_valid_address("<user@example.com>"));
    }
}
