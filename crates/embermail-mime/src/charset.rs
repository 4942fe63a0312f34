//! Charset transcoding to UTF-8.
//!
//! Inbound text is decoded in two stages: the transfer encoding is undone
//! first (see [`crate::encoding`]), then the resulting bytes are transcoded
//! here according to the part's declared charset. Unrecognized charsets pass
//! through unchanged unless the caller supplies a [`CharsetHook`].

/// A character set declared by a message part or encoded word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8 or plain ASCII; bytes pass through.
    Utf8,
    /// ISO-8859-1 / Latin-1.
    Latin1,
    /// TIS-620 / Windows-874 (Thai).
    Tis620,
    /// Anything else, kept by name for the caller hook.
    Other(String),
}

impl Charset {
    /// Parses a charset name as it appears in headers.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim().trim_matches('"');
        let upper = trimmed.to_uppercase();
        match upper.as_str() {
            "UTF-8" | "UTF8" | "US-ASCII" | "ASCII" => Self::Utf8,
            "ISO-8859-1" | "LATIN1" | "LATIN-1" | "CP1252" | "WINDOWS-1252" => Self::Latin1,
            "TIS-620" | "TIS620" | "ISO-8859-11" | "WINDOWS-874" => Self::Tis620,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    /// Returns the canonical name for this charset.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
            Self::Tis620 => "TIS-620",
            Self::Other(name) => name,
        }
    }
}

/// Caller-supplied decoder for charsets the library does not know.
///
/// Consulted only for [`Charset::Other`]; returning `None` falls back to
/// lossy UTF-8 passthrough.
pub trait CharsetHook: Send {
    /// Decodes `bytes` declared as `charset` into UTF-8 text.
    fn decode(&mut self, charset: &str, bytes: &[u8]) -> Option<String>;
}

/// No-op hook: every unknown charset falls back to passthrough.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCharsetHook;

impl CharsetHook for NoCharsetHook {
    fn decode(&mut self, _charset: &str, _bytes: &[u8]) -> Option<String> {
        None
    }
}

/// Transcodes `bytes` in `charset` to UTF-8.
///
/// Invalid UTF-8 in passthrough mode is replaced, never rejected: header
/// display must not fail an otherwise-good fetch.
#[must_use]
pub fn decode_to_utf8(charset: &Charset, bytes: &[u8]) -> String {
    match charset {
        Charset::Utf8 | Charset::Other(_) => String::from_utf8_lossy(bytes).into_owned(),
        Charset::Latin1 => latin1_to_utf8(bytes),
        Charset::Tis620 => tis620_to_utf8(bytes),
    }
}

/// Transcodes with a caller hook for unknown charsets.
#[must_use]
pub fn decode_to_utf8_with(
    charset: &Charset,
    bytes: &[u8],
    hook: &mut dyn CharsetHook,
) -> String {
    if let Charset::Other(name) = charset
        && let Some(decoded) = hook.decode(name, bytes)
    {
        return decoded;
    }
    decode_to_utf8(charset, bytes)
}

/// Decodes Latin-1 bytes; code points map 1:1 onto Unicode scalars.
#[must_use]
pub fn latin1_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decodes TIS-620 bytes; Thai block starts at U+0E01 for byte 0xA1.
#[must_use]
pub fn tis620_to_utf8(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b < 0x80 {
                char::from(b)
            } else {
                char::from_u32(0x0E00 + u32::from(b) - 0xA0).unwrap_or(char::REPLACEMENT_CHARACTER)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!(Charset::parse("utf-8"), Charset::Utf8);
        assert_eq!(Charset::parse("\"UTF-8\""), Charset::Utf8);
        assert_eq!(Charset::parse("iso-8859-1"), Charset::Latin1);
        assert_eq!(Charset::parse("tis-620"), Charset::Tis620);
        assert_eq!(
            Charset::parse("koi8-r"),
            Charset::Other("koi8-r".to_string())
        );
    }

    #[test]
    fn test_latin1() {
        // 0xE9 is é in Latin-1.
        assert_eq!(latin1_to_utf8(&[b'c', b'a', b'f', 0xE9]), "café");
    }

    #[test]
    fn test_tis620() {
        // 0xA1 is ก (U+0E01), the first Thai consonant.
        assert_eq!(tis620_to_utf8(&[0xA1]), "\u{0E01}");
        assert_eq!(tis620_to_utf8(b"ok"), "ok");
    }

    #[test]
    fn test_passthrough_lossy() {
        let decoded = decode_to_utf8(&Charset::Utf8, &[0xFF, b'a']);
        assert!(decoded.ends_with('a'));
    }

    #[test]
    fn test_hook_consulted_for_unknown() {
        struct Upper;
        impl CharsetHook for Upper {
            fn decode(&mut self, charset: &str, bytes: &[u8]) -> Option<String> {
                assert_eq!(charset, "x-custom");
                Some(String::from_utf8_lossy(bytes).to_uppercase())
            }
        }
        let charset = Charset::parse("x-custom");
        let decoded = decode_to_utf8_with(&charset, b"abc", &mut Upper);
        assert_eq!(decoded, "ABC");
    }

    #[test]
    fn test_hook_fallback_when_none() {
        let charset = Charset::parse("x-custom");
        let decoded = decode_to_utf8_with(&charset, b"abc", &mut NoCharsetHook);
        assert_eq!(decoded, "abc");
    }
}
