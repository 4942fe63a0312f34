//! Format=flowed text shaping (RFC 3676).
//!
//! Long paragraphs are soft-broken so that no transmitted line exceeds the
//! flowed width; a soft break is a trailing space before CRLF, which
//! receivers rejoin. Quoted lines keep their `>` prefix on every continuation
//! line, and flowed-significant leading characters are space-stuffed.

/// Maximum characters per transmitted line, excluding CRLF.
const FLOWED_WIDTH: usize = 78;

/// Reshapes `text` into format=flowed lines.
#[must_use]
pub fn format_flowed(text: &str) -> String {
    let mut out = String::with_capacity(text.len());

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        flow_line(line, &mut out);
    }

    out
}

/// Splits a quote prefix (">", ">>", "> " ...) from the line body.
fn split_quote_prefix(line: &str) -> (&str, &str) {
    let mut end = 0;
    let bytes = line.as_bytes();
    while end < bytes.len() && bytes[end] == b'>' {
        end += 1;
    }
    if end > 0 && bytes.get(end) == Some(&b' ') {
        end += 1;
    }
    line.split_at(end)
}

fn flow_line(line: &str, out: &mut String) {
    let (quote, body) = split_quote_prefix(line);

    if line.len() <= FLOWED_WIDTH {
        out.push_str(quote);
        push_stuffed(body, quote.is_empty(), out);
        return;
    }

    // Keep one column in reserve for the soft-break trailing space.
    let limit = FLOWED_WIDTH - 1;
    let mut column = 0;
    let mut first = true;
    for word in body.split(' ') {
        if column > 0 && column + 1 + word.len() > limit {
            // Trailing space marks the break as soft.
            out.push_str(" \r\n");
            column = 0;
            first = false;
        }
        if column == 0 {
            out.push_str(quote);
            column = quote.len();
            if first {
                push_stuffed(word, quote.is_empty(), out);
            } else {
                out.push_str(word);
            }
        } else {
            out.push(' ');
            out.push_str(word);
            column += 1;
        }
        column += word.len();
        first = false;
    }
}

/// Space-stuffs a body that would otherwise look quoted or like an mbox
/// separator on the receiving side.
fn push_stuffed(body: &str, unquoted: bool, out: &mut String) {
    if unquoted && (body.starts_with('>') || body.starts_with(' ') || body.starts_with("From ")) {
        out.push(' ');
    }
    out.push_str(body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_lines_untouched() {
        assert_eq!(format_flowed("hello\r\nworld"), "hello\r\nworld");
    }

    #[test]
    fn test_long_line_soft_broken() {
        let text = "word ".repeat(30);
        let flowed = format_flowed(text.trim_end());
        for line in flowed.split("\r\n") {
            assert!(line.len() <= FLOWED_WIDTH, "line too long: {line:?}");
        }
        // Soft breaks end with a space; rejoining restores the paragraph.
        let rejoined = flowed.replace(" \r\n", " ");
        assert_eq!(rejoined, text.trim_end());
    }

    #[test]
    fn test_quoted_long_line_keeps_prefix() {
        let text = format!("> {}", "word ".repeat(30).trim_end());
        let flowed = format_flowed(&text);
        for line in flowed.split("\r\n") {
            assert!(line.starts_with("> "));
            assert!(line.len() <= FLOWED_WIDTH);
        }
    }

    #[test]
    fn test_space_stuffing() {
        assert_eq!(format_flowed("From here"), " From here");
        assert_eq!(format_flowed("local > remote"), "local > remote");
    }

    #[test]
    fn test_quote_prefix_split() {
        assert_eq!(split_quote_prefix(">> deep"), (">> ", "deep"));
        assert_eq!(split_quote_prefix("plain"), ("", "plain"));
    }
}
