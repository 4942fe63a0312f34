//! IMAP response parser.
//!
//! Classifies CRLF-delimited response lines into tagged completions,
//! untagged server data, and continuation requests. Literal content is not
//! handled here: the reader layer consumes `{N}` octet runs and hands the
//! line text (with the announcement still attached) to these functions.

pub mod headers;

use crate::types::{CapabilitySet, FolderInfo};
use crate::{Error, Result};

/// Status of a tagged completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggedStatus {
    /// Command completed.
    Ok,
    /// Operational failure.
    No,
    /// Protocol or syntax failure.
    Bad,
}

impl TaggedStatus {
    fn parse(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            _ => None,
        }
    }
}

/// Bracketed response code on an OK/NO/BAD line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    /// `[UNSEEN n]`.
    Unseen(u32),
    /// `[UIDNEXT n]`.
    UidNext(u32),
    /// `[UIDVALIDITY n]`.
    UidValidity(u32),
    /// `[PERMANENTFLAGS (...)]`.
    PermanentFlags(String),
    /// `[READ-ONLY]`.
    ReadOnly,
    /// `[READ-WRITE]`.
    ReadWrite,
    /// `[CAPABILITY ...]`, as advertised in greetings.
    Capability(Vec<String>),
    /// Anything else, kept verbatim.
    Other(String),
}

impl StatusCode {
    fn parse(inner: &str) -> Self {
        let mut words = inner.split_whitespace();
        let keyword = words.next().unwrap_or_default().to_uppercase();
        match keyword.as_str() {
            "UNSEEN" => words
                .next()
                .and_then(|n| n.parse().ok())
                .map_or_else(|| Self::Other(inner.to_string()), Self::Unseen),
            "UIDNEXT" => words
                .next()
                .and_then(|n| n.parse().ok())
                .map_or_else(|| Self::Other(inner.to_string()), Self::UidNext),
            "UIDVALIDITY" => words
                .next()
                .and_then(|n| n.parse().ok())
                .map_or_else(|| Self::Other(inner.to_string()), Self::UidValidity),
            "PERMANENTFLAGS" => {
                let rest = inner[keyword.len()..].trim().to_string();
                Self::PermanentFlags(rest)
            }
            "READ-ONLY" => Self::ReadOnly,
            "READ-WRITE" => Self::ReadWrite,
            "CAPABILITY" => Self::Capability(words.map(str::to_string).collect()),
            _ => Self::Other(inner.to_string()),
        }
    }
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Untagged {
    /// `* CAPABILITY ...`.
    Capability(CapabilitySet),
    /// `* n EXISTS`.
    Exists(u32),
    /// `* n RECENT`.
    Recent(u32),
    /// `* n EXPUNGE`.
    Expunge(u32),
    /// `* n FETCH (...)`; attribute text still carries any literal
    /// announcement for the reader to consume.
    Fetch {
        /// Message sequence number.
        seq: u32,
        /// Raw attribute text after `FETCH `.
        attrs: String,
    },
    /// `* FLAGS (...)`.
    Flags(String),
    /// `* LIST (...) "/" name`.
    List(FolderInfo),
    /// `* SEARCH n n n`.
    Search(Vec<u32>),
    /// `* OK [code] text` and friends.
    Status {
        /// OK/NO/BAD of the untagged status line.
        status: TaggedStatus,
        /// Bracketed code, when present.
        code: Option<StatusCode>,
        /// Trailing text.
        text: String,
    },
    /// `* BYE text`.
    Bye(String),
    /// Unrecognized untagged data, kept verbatim.
    Other(String),
}

/// One classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseLine {
    /// Tagged completion.
    Tagged {
        /// Correlation tag.
        tag: String,
        /// Completion status.
        status: TaggedStatus,
        /// Bracketed code, when present.
        code: Option<StatusCode>,
        /// Trailing text.
        text: String,
    },
    /// Untagged server data.
    Untagged(Untagged),
    /// `+ ...` continuation request.
    Continuation(String),
}

impl CapabilitySet {
    /// Derives a capability set from a `CAPABILITY` token run.
    fn from_joined(rest: &str) -> Self {
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        Self::parse(&tokens)
    }
}

/// Classifies one response line.
///
/// # Errors
///
/// Returns `ParseFailed` on grammar violations; callers skip the line and
/// keep the session usable.
pub fn parse_line(line: &str) -> Result<ResponseLine> {
    if let Some(rest) = line.strip_prefix("+ ") {
        return Ok(ResponseLine::Continuation(rest.to_string()));
    }
    if line == "+" {
        return Ok(ResponseLine::Continuation(String::new()));
    }
    if let Some(rest) = line.strip_prefix("* ") {
        return parse_untagged(rest).map(ResponseLine::Untagged);
    }

    let (tag, rest) = line
        .split_once(' ')
        .ok_or_else(|| Error::ParseFailed(format!("unterminated response line: {line}")))?;
    let (status_token, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = TaggedStatus::parse(status_token)
        .ok_or_else(|| Error::ParseFailed(format!("unknown tagged status: {line}")))?;
    let (code, text) = split_status_code(text);
    Ok(ResponseLine::Tagged {
        tag: tag.to_string(),
        status,
        code,
        text,
    })
}

fn parse_untagged(rest: &str) -> Result<Untagged> {
    let (first, remainder) = rest.split_once(' ').unwrap_or((rest, ""));

    // `* n EXISTS` style: a number followed by a keyword.
    if let Ok(n) = first.parse::<u32>() {
        let (keyword, attrs) = remainder.split_once(' ').unwrap_or((remainder, ""));
        return match keyword.to_uppercase().as_str() {
            "EXISTS" => Ok(Untagged::Exists(n)),
            "RECENT" => Ok(Untagged::Recent(n)),
            "EXPUNGE" => Ok(Untagged::Expunge(n)),
            "FETCH" => Ok(Untagged::Fetch {
                seq: n,
                attrs: attrs.to_string(),
            }),
            _ => Ok(Untagged::Other(rest.to_string())),
        };
    }

    match first.to_uppercase().as_str() {
        "CAPABILITY" => Ok(Untagged::Capability(CapabilitySet::from_joined(remainder))),
        "FLAGS" => Ok(Untagged::Flags(remainder.trim().to_string())),
        "SEARCH" => {
            let mut nums = Vec::new();
            for token in remainder.split_whitespace() {
                let n = token.parse().map_err(|_| {
                    Error::ParseFailed(format!("non-numeric search result: {token}"))
                })?;
                nums.push(n);
            }
            Ok(Untagged::Search(nums))
        }
        "LIST" | "LSUB" => parse_list(remainder).map(Untagged::List),
        "BYE" => Ok(Untagged::Bye(remainder.to_string())),
        "OK" | "NO" | "BAD" => {
            let status = TaggedStatus::parse(first).unwrap_or(TaggedStatus::Ok);
            let (code, text) = split_status_code(remainder);
            Ok(Untagged::Status { status, code, text })
        }
        _ => Ok(Untagged::Other(rest.to_string())),
    }
}

/// Parses `(\Attr1 \Attr2) "/" "name"` from a LIST response.
fn parse_list(rest: &str) -> Result<FolderInfo> {
    let rest = rest.trim_start();
    let close = rest
        .find(')')
        .ok_or_else(|| Error::ParseFailed(format!("LIST without attribute list: {rest}")))?;
    let attributes: Vec<String> = rest[..close]
        .trim_start_matches('(')
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut cursor = rest[close + 1..].trim_start();
    let delimiter = if cursor.to_uppercase().starts_with("NIL") {
        cursor = cursor[3..].trim_start();
        None
    } else {
        let (value, after) = read_quoted(cursor)
            .ok_or_else(|| Error::ParseFailed(format!("LIST without delimiter: {rest}")))?;
        cursor = after.trim_start();
        Some(value)
    };

    let name = if let Some((value, _)) = read_quoted(cursor) {
        value
    } else {
        cursor.to_string()
    };
    if name.is_empty() {
        return Err(Error::ParseFailed(format!("LIST without name: {rest}")));
    }

    Ok(FolderInfo {
        name,
        attributes,
        delimiter,
    })
}

/// Reads a leading quoted string, returning it unescaped plus the remainder.
fn read_quoted(s: &str) -> Option<(String, &str)> {
    let rest = s.strip_prefix('"')?;
    let mut value = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return Some((value, &rest[i + 1..])),
            _ => value.push(c),
        }
    }
    None
}

/// Splits a leading `[code]` from response text.
fn split_status_code(text: &str) -> (Option<StatusCode>, String) {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix('[')
        && let Some(close) = rest.find(']')
    {
        let code = StatusCode::parse(&rest[..close]);
        let after = rest[close + 1..].trim_start().to_string();
        return (Some(code), after);
    }
    (None, trimmed.to_string())
}

/// Attributes extracted from a FETCH response line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchAttrs {
    /// `UID n`.
    pub uid: Option<u32>,
    /// `FLAGS (...)` content, parenthesized.
    pub flags: Option<String>,
    /// Section name of a `BODY[...]` item on this line.
    pub section: Option<String>,
    /// `RFC822.SIZE n`.
    pub size: Option<usize>,
}

/// Scans the attribute text of a FETCH response.
///
/// Only the items the engine requests are recognized; unknown items are
/// skipped token-wise.
#[must_use]
pub fn parse_fetch_attrs(attrs: &str) -> FetchAttrs {
    let mut out = FetchAttrs::default();
    let text = attrs.trim_start_matches('(');

    let upper = text.to_uppercase();
    if let Some(pos) = find_item(&upper, "UID ") {
        let tail = &text[pos + 4..];
        out.uid = tail
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|n| n.parse().ok());
    }
    if let Some(pos) = find_item(&upper, "RFC822.SIZE ") {
        let tail = &text[pos + 12..];
        out.size = tail
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|n| n.parse().ok());
    }
    if let Some(pos) = find_item(&upper, "FLAGS (") {
        let tail = &text[pos + 6..];
        if let Some(close) = tail.find(')') {
            out.flags = Some(tail[..=close].to_string());
        }
    }
    if let Some(pos) = upper.find("BODY[") {
        let tail = &text[pos + 5..];
        if let Some(close) = tail.find(']') {
            out.section = Some(tail[..close].to_string());
        }
    }
    out
}

/// Finds an item keyword at a token boundary.
fn find_item(upper: &str, keyword: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = upper[from..].find(keyword) {
        let pos = from + rel;
        if pos == 0 || matches!(upper.as_bytes()[pos - 1], b' ' | b'(') {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_ok() {
        let line = parse_line("A0001 OK LOGIN completed").unwrap();
        match line {
            ResponseLine::Tagged {
                tag, status, text, ..
            } => {
                assert_eq!(tag, "A0001");
                assert_eq!(status, TaggedStatus::Ok);
                assert_eq!(text, "LOGIN completed");
            }
            other => panic!("expected tagged, got {other:?}"),
        }
    }

    #[test]
    fn test_tagged_no_with_code() {
        let line = parse_line("A2 NO [AUTHENTICATIONFAILED] bad credentials").unwrap();
        match line {
            ResponseLine::Tagged { status, code, .. } => {
                assert_eq!(status, TaggedStatus::No);
                assert!(matches!(code, Some(StatusCode::Other(_))));
            }
            other => panic!("expected tagged, got {other:?}"),
        }
    }

    #[test]
    fn test_untagged_counts() {
        assert_eq!(
            parse_line("* 23 EXISTS").unwrap(),
            ResponseLine::Untagged(Untagged::Exists(23))
        );
        assert_eq!(
            parse_line("* 2 RECENT").unwrap(),
            ResponseLine::Untagged(Untagged::Recent(2))
        );
        assert_eq!(
            parse_line("* 7 EXPUNGE").unwrap(),
            ResponseLine::Untagged(Untagged::Expunge(7))
        );
    }

    #[test]
    fn test_untagged_fetch_keeps_attrs() {
        let line = parse_line("* 12 FETCH (UID 456 FLAGS (\\Seen))").unwrap();
        match line {
            ResponseLine::Untagged(Untagged::Fetch { seq, attrs }) => {
                assert_eq!(seq, 12);
                assert_eq!(attrs, "(UID 456 FLAGS (\\Seen))");
            }
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_capability_line() {
        let line = parse_line("* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN LITERAL+").unwrap();
        match line {
            ResponseLine::Untagged(Untagged::Capability(caps)) => {
                assert!(caps.imap4rev1);
                assert!(caps.idle);
                assert!(caps.literal_plus);
            }
            other => panic!("expected capability, got {other:?}"),
        }
    }

    #[test]
    fn test_search_results() {
        let line = parse_line("* SEARCH 1 3 8 21").unwrap();
        assert_eq!(
            line,
            ResponseLine::Untagged(Untagged::Search(vec![1, 3, 8, 21]))
        );
        let line = parse_line("* SEARCH").unwrap();
        assert_eq!(line, ResponseLine::Untagged(Untagged::Search(Vec::new())));
    }

    #[test]
    fn test_search_garbage_rejected() {
        assert!(parse_line("* SEARCH 1 x 3").is_err());
    }

    #[test]
    fn test_list_line() {
        let line = parse_line("* LIST (\\HasNoChildren) \"/\" \"INBOX/Receipts\"").unwrap();
        match line {
            ResponseLine::Untagged(Untagged::List(info)) => {
                assert_eq!(info.name, "INBOX/Receipts");
                assert_eq!(info.delimiter.as_deref(), Some("/"));
                assert_eq!(info.attributes, vec!["\\HasNoChildren"]);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_list_nil_delimiter_unquoted_name() {
        let line = parse_line("* LIST () NIL INBOX").unwrap();
        match line {
            ResponseLine::Untagged(Untagged::List(info)) => {
                assert_eq!(info.name, "INBOX");
                assert!(info.delimiter.is_none());
                assert!(info.attributes.is_empty());
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_untagged_ok_codes() {
        let line = parse_line("* OK [UIDNEXT 4392] Predicted next UID").unwrap();
        match line {
            ResponseLine::Untagged(Untagged::Status { code, .. }) => {
                assert_eq!(code, Some(StatusCode::UidNext(4392)));
            }
            other => panic!("expected status, got {other:?}"),
        }

        let line = parse_line("* OK [UNSEEN 5] first unseen").unwrap();
        match line {
            ResponseLine::Untagged(Untagged::Status { code, .. }) => {
                assert_eq!(code, Some(StatusCode::Unseen(5)));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_continuation() {
        assert_eq!(
            parse_line("+ Ready for literal").unwrap(),
            ResponseLine::Continuation("Ready for literal".to_string())
        );
        assert_eq!(
            parse_line("+").unwrap(),
            ResponseLine::Continuation(String::new())
        );
    }

    #[test]
    fn test_malformed_line() {
        assert!(parse_line("garbage").is_err());
        assert!(parse_line("A1 WAT nope").is_err());
    }

    #[test]
    fn test_fetch_attrs() {
        let attrs = parse_fetch_attrs("(UID 456 RFC822.SIZE 2033 FLAGS (\\Seen \\Draft))");
        assert_eq!(attrs.uid, Some(456));
        assert_eq!(attrs.size, Some(2033));
        assert_eq!(attrs.flags.as_deref(), Some("(\\Seen \\Draft)"));
        assert!(attrs.section.is_none());
    }

    #[test]
    fn test_fetch_attrs_body_section() {
        let attrs = parse_fetch_attrs("(UID 9 BODY[1.2.MIME] {128}");
        assert_eq!(attrs.uid, Some(9));
        assert_eq!(attrs.section.as_deref(), Some("1.2.MIME"));
    }

    #[test]
    fn test_fetch_attrs_uid_not_confused_by_keywords() {
        // FLAGS containing the letters UID must not be misread.
        let attrs = parse_fetch_attrs("(FLAGS ($NotJunkUID 3) UID 77)");
        assert_eq!(attrs.uid, Some(77));
    }
}
