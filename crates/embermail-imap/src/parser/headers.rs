//! Header block parsing for fetched messages and MIME part probes.

use embermail_mime::charset::CharsetHook;
use embermail_mime::rfc2047::decode_encoded_words_with;
use embermail_mime::{PartDisposition, PartInfo, PartNumber, TransferEncoding};

/// Header fields of one fetched message, encoded words already decoded.
///
/// Absent fields are empty strings, matching what a header-only fetch can
/// know.
#[derive(Debug, Clone, Default)]
pub struct MessageHeader {
    /// From header.
    pub from: String,
    /// To header.
    pub to: String,
    /// Cc header.
    pub cc: String,
    /// Reply-To header.
    pub reply_to: String,
    /// Subject, decoded.
    pub subject: String,
    /// Date header, verbatim.
    pub date: String,
    /// Message-ID.
    pub message_id: String,
    /// In-Reply-To.
    pub in_reply_to: String,
    /// References.
    pub references: String,
    /// Content-Type value (without parameters).
    pub content_type: String,
    /// Charset parameter of the content type.
    pub charset: Option<String>,
    /// Top-level transfer encoding.
    pub transfer_encoding: TransferEncoding,
}

/// Splits a raw header block into unfolded (name, value) pairs.
///
/// Continuation lines (leading whitespace) are joined to the previous
/// field with a single space.
#[must_use]
pub fn unfold_headers(block: &[u8]) -> Vec<(String, String)> {
    let text = String::from_utf8_lossy(block);
    let mut fields: Vec<(String, String)> = Vec::new();

    for line in text.split("\r\n") {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim_start());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            fields.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    fields
}

/// Extracts a `;name="value"` parameter from a structured header value.
#[must_use]
pub fn header_param(value: &str, name: &str) -> Option<String> {
    let lower = value.to_lowercase();
    let needle = format!("{}=", name.to_lowercase());
    let mut from = 0;
    loop {
        let rel = lower[from..].find(&needle)?;
        let pos = from + rel;
        // Parameter names start after ';' or whitespace.
        let boundary = pos == 0
            || matches!(lower.as_bytes()[pos - 1], b';' | b' ' | b'\t');
        if !boundary {
            from = pos + needle.len();
            continue;
        }
        let raw = &value[pos + needle.len()..];
        let param = if let Some(rest) = raw.strip_prefix('"') {
            rest.split('"').next().unwrap_or_default().to_string()
        } else {
            raw.split([';', ' ', '\t']).next().unwrap_or_default().to_string()
        };
        return Some(param);
    }
}

/// Parses a fetched RFC 822 header block into a [`MessageHeader`],
/// decoding encoded words with the caller's charset hook.
#[must_use]
pub fn parse_message_header(block: &[u8], hook: &mut dyn CharsetHook) -> MessageHeader {
    let mut header = MessageHeader::default();

    for (name, value) in unfold_headers(block) {
        match name.to_lowercase().as_str() {
            "from" => header.from = decode_encoded_words_with(&value, hook),
            "to" => header.to = decode_encoded_words_with(&value, hook),
            "cc" => header.cc = decode_encoded_words_with(&value, hook),
            "reply-to" => header.reply_to = decode_encoded_words_with(&value, hook),
            "subject" => header.subject = decode_encoded_words_with(&value, hook),
            "date" => header.date = value,
            "message-id" => header.message_id = value,
            "in-reply-to" => header.in_reply_to = value,
            "references" => header.references = value,
            "content-type" => {
                header.content_type = value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
                header.charset = header_param(&value, "charset");
            }
            "content-transfer-encoding" => {
                header.transfer_encoding = TransferEncoding::parse(&value);
            }
            _ => {}
        }
    }
    header
}

/// Parses a `BODY[n.MIME]` probe result into a [`PartInfo`].
#[must_use]
pub fn parse_part_headers(number: PartNumber, block: &[u8]) -> PartInfo {
    let mut part = PartInfo::new(number);

    for (name, value) in unfold_headers(block) {
        match name.to_lowercase().as_str() {
            "content-type" => {
                part.content_type = value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
                part.charset = header_param(&value, "charset");
                if part.filename.is_none() {
                    part.filename = header_param(&value, "name");
                }
            }
            "content-transfer-encoding" => {
                part.transfer_encoding = TransferEncoding::parse(&value);
            }
            "content-disposition" => {
                let kind = value
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_lowercase();
                if kind == "attachment" {
                    part.disposition = PartDisposition::Attachment;
                }
                if let Some(filename) = header_param(&value, "filename") {
                    part.filename = Some(filename);
                }
                if let Some(size) = header_param(&value, "size") {
                    part.size = size.parse().ok();
                }
            }
            "content-id" => {
                part.content_id = Some(
                    value
                        .trim()
                        .trim_start_matches('<')
                        .trim_end_matches('>')
                        .to_string(),
                );
            }
            _ => {}
        }
    }
    part
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embermail_mime::NoCharsetHook;

    const HEADER: &[u8] = b"From: Amy Example <amy@example.com>\r\n\
To: =?UTF-8?B?QsO2Yg==?= <bob@example.com>\r\n\
Subject: =?UTF-8?B?SMOpbGxv?=\r\n\
 continued\r\n\
Date: Fri, 7 Aug 2026 10:00:00 +0000\r\n\
Message-ID: <abc@example.com>\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
Content-Transfer-Encoding: 7bit\r\n\
\r\n\
body should be ignored\r\n";

    #[test]
    fn test_unfold_headers() {
        let fields = unfold_headers(b"A: one\r\n two\r\nB: three\r\n\r\nC: nope\r\n");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0], ("A".to_string(), "one two".to_string()));
        assert_eq!(fields[1], ("B".to_string(), "three".to_string()));
    }

    #[test]
    fn test_parse_message_header() {
        let header = parse_message_header(HEADER, &mut NoCharsetHook);
        assert_eq!(header.from, "Amy Example <amy@example.com>");
        assert_eq!(header.to, "Böb <bob@example.com>");
        assert_eq!(header.subject, "Héllo continued");
        assert_eq!(header.message_id, "<abc@example.com>");
        assert_eq!(header.content_type, "multipart/mixed");
        assert_eq!(header.charset, None);
        assert_eq!(header.transfer_encoding, TransferEncoding::SevenBit);
    }

    #[test]
    fn test_header_param() {
        let value = "text/plain; charset=\"utf-8\"; format=flowed";
        assert_eq!(header_param(value, "charset").as_deref(), Some("utf-8"));
        assert_eq!(header_param(value, "format").as_deref(), Some("flowed"));
        assert_eq!(header_param(value, "missing"), None);
    }

    #[test]
    fn test_header_param_not_substring_confused() {
        let value = "application/pdf; xcharset=wrong; charset=utf-8";
        assert_eq!(header_param(value, "charset").as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_parse_part_headers_attachment() {
        let block = b"Content-Type: application/pdf; name=\"report.pdf\"\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"; size=1024\r\n\
Content-Transfer-Encoding: base64\r\n\r\n";
        let part = parse_part_headers(PartNumber::parse("1.2").unwrap(), block);
        assert_eq!(part.content_type, "application/pdf");
        assert_eq!(part.filename.as_deref(), Some("report.pdf"));
        assert_eq!(part.size, Some(1024));
        assert_eq!(part.transfer_encoding, TransferEncoding::Base64);
        assert!(part.is_attachment());
    }

    #[test]
    fn test_parse_part_headers_inline_image() {
        let block = b"Content-Type: image/png; name=\"logo.png\"\r\n\
Content-Disposition: inline; filename=\"logo.png\"\r\n\
Content-ID: <logo123@mailer>\r\n\
Content-Transfer-Encoding: base64\r\n\r\n";
        let part = parse_part_headers(PartNumber::parse("1.1.2").unwrap(), block);
        assert_eq!(part.content_id.as_deref(), Some("logo123@mailer"));
        assert_eq!(part.disposition, PartDisposition::Inline);
    }

    #[test]
    fn test_parse_part_headers_multipart() {
        let block =
            b"Content-Type: multipart/alternative; boundary=\"b1\"\r\n\r\n";
        let part = parse_part_headers(PartNumber::parse("1").unwrap(), block);
        assert!(part.is_multipart());
    }
}
