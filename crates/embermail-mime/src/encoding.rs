//! Transfer-encoding codecs.
//!
//! The streaming types here are chunk-boundary safe: input may be split at
//! any byte position across `push` calls and the residual state (a partial
//! base64 group, a half-read `=XX` escape) is carried to the next call. Both
//! engines rely on this to move attachment content through a fixed working
//! buffer without materializing the whole body.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

use crate::{Error, Result};

/// Maximum encoded line length for base64 and quoted-printable bodies.
const MAX_LINE_LENGTH: usize = 76;

/// Encodes data as a single base64 string (no line wrapping).
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decodes a base64 string, ignoring embedded line breaks and whitespace.
///
/// # Errors
///
/// Returns an error if the input is not valid base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let filtered: Vec<u8> = data
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(filtered)?)
}

/// Streaming base64 encoder producing MIME-wrapped output lines.
///
/// Bytes are encoded in 3-byte groups; a trailing partial group is carried
/// across `push` calls and only padded in [`finish`](Self::finish). Output
/// lines are wrapped at 76 characters with CRLF.
#[derive(Debug, Default)]
pub struct Base64Encoder {
    carry: [u8; 2],
    carry_len: usize,
    line_len: usize,
}

impl Base64Encoder {
    /// Creates an encoder with empty state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            carry: [0; 2],
            carry_len: 0,
            line_len: 0,
        }
    }

    /// Encodes the next chunk of raw bytes, appending output to `out`.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<u8>) {
        let mut pending = Vec::with_capacity(self.carry_len + input.len());
        pending.extend_from_slice(&self.carry[..self.carry_len]);
        pending.extend_from_slice(input);

        let full = pending.len() - pending.len() % 3;
        if full > 0 {
            let encoded = STANDARD.encode(&pending[..full]);
            self.write_wrapped(encoded.as_bytes(), out);
        }

        self.carry_len = pending.len() - full;
        self.carry[..self.carry_len].copy_from_slice(&pending[full..]);
    }

    /// Flushes the residual group (padded) and terminates the last line.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.carry_len > 0 {
            let encoded = STANDARD.encode(&self.carry[..self.carry_len]);
            self.write_wrapped(encoded.as_bytes(), out);
            self.carry_len = 0;
        }
        if self.line_len > 0 {
            out.extend_from_slice(b"\r\n");
            self.line_len = 0;
        }
    }

    fn write_wrapped(&mut self, encoded: &[u8], out: &mut Vec<u8>) {
        for &b in encoded {
            if self.line_len == MAX_LINE_LENGTH {
                out.extend_from_slice(b"\r\n");
                self.line_len = 0;
            }
            out.push(b);
            self.line_len += 1;
        }
    }
}

/// Streaming base64 decoder.
///
/// Whitespace and line breaks in the input are skipped. A partial 4-character
/// group at the end of a chunk is carried into the next `push`.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    carry: [u8; 4],
    carry_len: usize,
}

impl Base64Decoder {
    /// Creates a decoder with empty state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            carry: [0; 4],
            carry_len: 0,
        }
    }

    /// Decodes the next chunk of encoded bytes, appending output to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if a complete group is not valid base64.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let mut pending = Vec::with_capacity(self.carry_len + input.len());
        pending.extend_from_slice(&self.carry[..self.carry_len]);
        pending.extend(
            input
                .iter()
                .copied()
                .filter(|b| !matches!(b, b'\r' | b'\n' | b' ' | b'\t')),
        );

        let full = pending.len() - pending.len() % 4;
        if full > 0 {
            out.extend_from_slice(&STANDARD.decode(&pending[..full])?);
        }

        self.carry_len = pending.len() - full;
        self.carry[..self.carry_len].copy_from_slice(&pending[full..]);
        Ok(())
    }

    /// Checks that the stream ended on a group boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if encoded characters remain buffered.
    pub fn finish(&mut self) -> Result<()> {
        if self.carry_len == 0 {
            Ok(())
        } else {
            Err(Error::InvalidEncoding(
                "base64 stream ended mid-group".to_string(),
            ))
        }
    }
}

/// Encodes text as quoted-printable (RFC 2045).
///
/// CRLF sequences in the input are kept as hard line breaks; soft breaks
/// (`=\r\n`) are inserted to keep encoded lines within 76 characters.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::new();
    let mut line_len = 0;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        // Hard break: pass CRLF (or bare LF) through and reset the line.
        if b == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            result.push_str("\r\n");
            line_len = 0;
            i += 2;
            continue;
        }
        if b == b'\n' {
            result.push_str("\r\n");
            line_len = 0;
            i += 1;
            continue;
        }

        if line_len >= MAX_LINE_LENGTH - 3 {
            result.push_str("=\r\n");
            line_len = 0;
        }

        match b {
            b'!'..=b'<' | b'>'..=b'~' => {
                result.push(b as char);
                line_len += 1;
            }
            b' ' | b'\t' => {
                // Whitespace immediately before a break must be encoded.
                let at_line_end = matches!(bytes.get(i + 1), None | Some(b'\r' | b'\n'));
                if at_line_end {
                    let _ = write!(result, "={b:02X}");
                    line_len += 3;
                } else {
                    result.push(b as char);
                    line_len += 1;
                }
            }
            _ => {
                let _ = write!(result, "={b:02X}");
                line_len += 3;
            }
        }
        i += 1;
    }

    result
}

/// Decodes quoted-printable text in one call.
///
/// # Errors
///
/// Returns an error if the input contains an invalid escape sequence.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut decoder = QpDecoder::new();
    let mut out = Vec::with_capacity(text.len());
    decoder.push(text.as_bytes(), &mut out)?;
    decoder.finish(&mut out);
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QpState {
    Text,
    Escape,
    EscapeHex(u8),
    EscapeCr,
}

/// Streaming quoted-printable decoder.
///
/// An `=XX` escape or `=\r\n` soft break split across chunk boundaries is
/// resumed on the next `push`. With `underscore_is_space` the decoder also
/// serves RFC 2047 Q-encoded words.
#[derive(Debug)]
pub struct QpDecoder {
    state: QpState,
    underscore_is_space: bool,
}

impl QpDecoder {
    /// Creates a body-text decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: QpState::Text,
            underscore_is_space: false,
        }
    }

    /// Creates a decoder for RFC 2047 Q-encoded words (`_` decodes to space).
    #[must_use]
    pub const fn for_encoded_word() -> Self {
        Self {
            state: QpState::Text,
            underscore_is_space: true,
        }
    }

    /// Decodes the next chunk, appending output bytes to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if an escape contains non-hex characters.
    pub fn push(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        for &b in input {
            match self.state {
                QpState::Text => match b {
                    b'=' => self.state = QpState::Escape,
                    b'_' if self.underscore_is_space => out.push(b' '),
                    _ => out.push(b),
                },
                QpState::Escape => match b {
                    b'\r' => self.state = QpState::EscapeCr,
                    b'\n' => self.state = QpState::Text,
                    _ => {
                        let hi = hex_value(b).ok_or_else(|| invalid_escape(b))?;
                        self.state = QpState::EscapeHex(hi);
                    }
                },
                QpState::EscapeHex(hi) => {
                    let lo = hex_value(b).ok_or_else(|| invalid_escape(b))?;
                    out.push((hi << 4) | lo);
                    self.state = QpState::Text;
                }
                QpState::EscapeCr => {
                    self.state = QpState::Text;
                    if b != b'\n' {
                        // A lone "=\r" is still a soft break; reprocess b.
                        self.push(&[b], out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Flushes a dangling escape as literal text.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        match self.state {
            QpState::Text | QpState::EscapeCr => {}
            QpState::Escape => out.push(b'='),
            QpState::EscapeHex(hi) => {
                out.push(b'=');
                out.push(hex_char(hi));
            }
        }
        self.state = QpState::Text;
    }
}

impl Default for QpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'A'..=b'F' => Some(b - b'A' + 10),
        b'a'..=b'f' => Some(b - b'a' + 10),
        _ => None,
    }
}

const fn hex_char(v: u8) -> u8 {
    if v < 10 { b'0' + v } else { b'A' + v - 10 }
}

fn invalid_escape(b: u8) -> Error {
    Error::InvalidEncoding(format!("invalid quoted-printable escape byte {b:#04x}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode_all(data: &[u8], chunk: usize) -> Vec<u8> {
        let mut enc = Base64Encoder::new();
        let mut out = Vec::new();
        for piece in data.chunks(chunk.max(1)) {
            enc.push(piece, &mut out);
        }
        enc.finish(&mut out);
        out
    }

    fn decode_all(data: &[u8], chunk: usize) -> Vec<u8> {
        let mut dec = Base64Decoder::new();
        let mut out = Vec::new();
        for piece in data.chunks(chunk.max(1)) {
            dec.push(piece, &mut out).unwrap();
        }
        dec.finish().unwrap();
        out
    }

    #[test]
    fn test_base64_simple() {
        assert_eq!(encode_base64(b"Hello, World!"), "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_streaming_encoder_wraps_lines() {
        let data = vec![0xABu8; 100];
        let out = encode_all(&data, 7);
        let text = String::from_utf8(out).unwrap();
        for line in text.trim_end().split("\r\n") {
            assert!(line.len() <= 76);
        }
        assert_eq!(decode_base64(&text).unwrap(), data);
    }

    #[test]
    fn test_streaming_decoder_across_splits() {
        let encoded = encode_base64(b"chunk boundary safety");
        for chunk in 1..=encoded.len() {
            let decoded = decode_all(encoded.as_bytes(), chunk);
            assert_eq!(decoded, b"chunk boundary safety");
        }
    }

    #[test]
    fn test_decoder_skips_line_breaks() {
        let mut dec = Base64Decoder::new();
        let mut out = Vec::new();
        dec.push(b"SGVs\r\nbG8=", &mut out).unwrap();
        dec.finish().unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_decoder_rejects_truncated_stream() {
        let mut dec = Base64Decoder::new();
        let mut out = Vec::new();
        dec.push(b"SGV", &mut out).unwrap();
        assert!(dec.finish().is_err());
    }

    #[test]
    fn test_qp_encode_ascii_passthrough() {
        assert_eq!(encode_quoted_printable("Hello, World!"), "Hello, World!");
    }

    #[test]
    fn test_qp_encode_escapes_equals_and_utf8() {
        let encoded = encode_quoted_printable("a=b");
        assert_eq!(encoded, "a=3Db");
        let encoded = encode_quoted_printable("Héllo");
        assert_eq!(encoded, "H=C3=A9llo");
    }

    #[test]
    fn test_qp_encode_keeps_hard_breaks() {
        let encoded = encode_quoted_printable("one\r\ntwo");
        assert_eq!(encoded, "one\r\ntwo");
    }

    #[test]
    fn test_qp_encode_trailing_space() {
        assert_eq!(encode_quoted_printable("end "), "end=20");
        assert_eq!(encode_quoted_printable("a \r\nb"), "a=20\r\nb");
    }

    #[test]
    fn test_qp_decode_simple() {
        assert_eq!(
            decode_quoted_printable("H=C3=A9llo").unwrap(),
            "Héllo".as_bytes()
        );
    }

    #[test]
    fn test_qp_decode_soft_break() {
        assert_eq!(decode_quoted_printable("Hel=\r\nlo").unwrap(), b"Hello");
    }

    #[test]
    fn test_qp_decode_split_escape() {
        let mut dec = QpDecoder::new();
        let mut out = Vec::new();
        dec.push(b"a=", &mut out).unwrap();
        dec.push(b"3", &mut out).unwrap();
        dec.push(b"Db", &mut out).unwrap();
        dec.finish(&mut out);
        assert_eq!(out, b"a=b");
    }

    #[test]
    fn test_qp_decode_underscore_mode() {
        let mut dec = QpDecoder::for_encoded_word();
        let mut out = Vec::new();
        dec.push(b"a_b", &mut out).unwrap();
        dec.finish(&mut out);
        assert_eq!(out, b"a b");
    }

    #[test]
    fn test_qp_round_trip_long_line() {
        let text = "x".repeat(300);
        let encoded = encode_quoted_printable(&text);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= 76);
        }
        assert_eq!(decode_quoted_printable(&encoded).unwrap(), text.as_bytes());
    }

    proptest! {
        #[test]
        fn prop_base64_identity_any_split(data: Vec<u8>, chunk in 1usize..32) {
            let encoded = encode_all(&data, chunk);
            let decoded = decode_all(&encoded, chunk);
            prop_assert_eq!(decoded, data);
        }

        #[test]
        fn prop_qp_identity_ascii(text in "[ -~]{0,200}") {
            let encoded = encode_quoted_printable(&text);
            let decoded = decode_quoted_printable(&encoded).unwrap();
            prop_assert_eq!(decoded, text.into_bytes());
        }

        #[test]
        fn prop_qp_identity_utf8(text in "\\PC{0,100}") {
            let encoded = encode_quoted_printable(&text);
            let decoded = decode_quoted_printable(&encoded).unwrap();
            prop_assert_eq!(decoded, text.into_bytes());
        }
    }
}
