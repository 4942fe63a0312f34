//! SMTP reply parser.
//!
//! Replies are one or more `NNN[- ]text` lines; a space separator marks the
//! final line of a multi-line reply.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Assembles a reply from accumulated response lines.
///
/// # Errors
///
/// Returns `ParseFailed` if a line is shorter than a reply code or the code
/// is not numeric, or if codes disagree across lines.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::ParseFailed("empty reply".into()));
    };

    let code = parse_code(first)?;
    let mut message = Vec::with_capacity(lines.len());

    for line in lines {
        if parse_code(line)? != code {
            return Err(Error::ParseFailed(format!(
                "mixed reply codes in multi-line reply: {line}"
            )));
        }
        message.push(line.get(4..).unwrap_or("").to_string());
    }

    Ok(Reply::new(code, message))
}

/// Returns true for the terminating line of a (possibly multi-line) reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.len() == 3 || (line.len() > 3 && line.as_bytes()[3] == b' ')
}

fn parse_code(line: &str) -> Result<ReplyCode> {
    let code = line
        .get(..3)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| Error::ParseFailed(format!("malformed reply line: {line}")))?;
    Ok(ReplyCode::new(code))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let reply = parse_reply(&["250 OK".to_string()]).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.message, vec!["OK"]);
    }

    #[test]
    fn test_multi_line() {
        let lines = vec![
            "250-mail.example.com".to_string(),
            "250-AUTH PLAIN LOGIN".to_string(),
            "250 CHUNKING".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.message.len(), 3);
        assert_eq!(reply.message[1], "AUTH PLAIN LOGIN");
    }

    #[test]
    fn test_bare_code() {
        let reply = parse_reply(&["354".to_string()]).unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.message, vec![""]);
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("354"));
        assert!(!is_last_reply_line("250-more"));
    }

    #[test]
    fn test_mixed_codes_rejected() {
        let lines = vec!["250-one".to_string(), "251 two".to_string()];
        assert!(parse_reply(&lines).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_reply(&["XYZ hello".to_string()]).is_err());
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&["25".to_string()]).is_err());
    }
}
