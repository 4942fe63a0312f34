//! RFC 2047 encoded-word handling for header fields.
//!
//! Decodes `=?charset?B|Q?payload?=` spans embedded in header text, joining
//! adjacent encoded words separated only by whitespace (the folding rule),
//! and encodes non-ASCII header text as base64 encoded words.

use crate::charset::{Charset, CharsetHook, NoCharsetHook, decode_to_utf8_with};
use crate::encoding::{QpDecoder, decode_base64, encode_base64};

/// Maximum raw input bytes per generated encoded word, keeping each word
/// within the 75-character limit after base64 expansion.
const ENCODE_CHUNK: usize = 45;

/// Decodes all encoded words in a header value.
#[must_use]
pub fn decode_encoded_words(input: &str) -> String {
    decode_encoded_words_with(input, &mut NoCharsetHook)
}

/// Decodes all encoded words, consulting `hook` for unknown charsets.
#[must_use]
pub fn decode_encoded_words_with(input: &str, hook: &mut dyn CharsetHook) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut last_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let literal = &rest[..start];

        if let Some((decoded, consumed)) = parse_encoded_word(&rest[start..], hook) {
            // Whitespace between two encoded words is transport folding,
            // not content; anything else is kept.
            if !(last_was_encoded && literal.chars().all(char::is_whitespace)) {
                out.push_str(literal);
            }
            out.push_str(&decoded);
            last_was_encoded = true;
            rest = &rest[start + consumed..];
        } else {
            out.push_str(&rest[..start + 2]);
            last_was_encoded = false;
            rest = &rest[start + 2..];
        }
    }

    out.push_str(rest);
    out
}

/// Parses one encoded word at the start of `s` (which begins with "=?").
///
/// Returns the decoded text and the number of input bytes consumed.
fn parse_encoded_word(s: &str, hook: &mut dyn CharsetHook) -> Option<(String, usize)> {
    let inner = s.strip_prefix("=?")?;

    let charset_end = inner.find('?')?;
    let charset_str = &inner[..charset_end];

    let after_charset = &inner[charset_end + 1..];
    let mut encoding_chars = after_charset.chars();
    let encoding = encoding_chars.next()?;
    if encoding_chars.next() != Some('?') {
        return None;
    }

    let payload_start = charset_end + 3;
    let payload_region = &inner[payload_start..];
    let payload_end = payload_region.find("?=")?;
    let payload = &payload_region[..payload_end];
    if payload.contains(' ') || payload.contains('\t') {
        return None;
    }

    let bytes = match encoding.to_ascii_uppercase() {
        'B' => decode_base64(payload).ok()?,
        'Q' => {
            let mut decoder = QpDecoder::for_encoded_word();
            let mut decoded = Vec::with_capacity(payload.len());
            decoder.push(payload.as_bytes(), &mut decoded).ok()?;
            decoder.finish(&mut decoded);
            decoded
        }
        _ => return None,
    };

    // RFC 2231 allows a "*lang" suffix on the charset; the language tag is
    // irrelevant to decoding.
    let charset_name = charset_str.split('*').next().unwrap_or(charset_str);
    let charset = Charset::parse(charset_name);
    let decoded = decode_to_utf8_with(&charset, &bytes, hook);

    // "=?" + charset + "?" + E + "?" + payload + "?="
    let consumed = 2 + charset_end + 3 + payload_end + 2;
    Some((decoded, consumed))
}

/// Encodes header text as RFC 2047 words when it contains non-ASCII.
///
/// ASCII text without the escape characters is returned unchanged. Long
/// input is split into multiple space-separated words, which decoders join
/// back without the separating whitespace.
#[must_use]
pub fn encode_header_value(text: &str) -> String {
    let needs_encoding = text
        .chars()
        .any(|c| !c.is_ascii() || c.is_ascii_control())
        || text.contains("=?");
    if !needs_encoding {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for ch in text.chars() {
        if chunk.len() + ch.len_utf8() > ENCODE_CHUNK {
            words.push(format!("=?UTF-8?B?{}?=", encode_base64(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(ch);
    }
    if !chunk.is_empty() {
        words.push(format!("=?UTF-8?B?{}?=", encode_base64(chunk.as_bytes())));
    }
    words.join(" ")
}
