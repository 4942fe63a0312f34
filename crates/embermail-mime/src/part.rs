//! Inbound multipart structure types.
//!
//! A fetched message's body is addressed by dot-separated part-number paths
//! ("1", "1.2", "1.2.3"). The IMAP engine discovers parts one level at a
//! time and records them flat; tree relationships are recovered through the
//! path prefix rule implemented by [`is_subpart`].

use crate::{Error, Result};

/// Returns true if `child` is a (transitive) member of `parent`.
///
/// Membership holds iff the child path begins with the parent path followed
/// by a dot separator.
#[must_use]
pub fn is_subpart(parent: &str, child: &str) -> bool {
    child.len() > parent.len() + 1
        && child.as_bytes()[parent.len()] == b'.'
        && child.starts_with(parent)
}

/// A dot-separated part-number path within a fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartNumber(String);

impl PartNumber {
    /// Parses a part-number path, validating each segment is a number.
    ///
    /// # Errors
    ///
    /// Returns an error on empty input or non-numeric segments.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() || !path.split('.').all(|seg| !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit())) {
            return Err(Error::InvalidPartNumber(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    /// The root part of a message body.
    #[must_use]
    pub fn root() -> Self {
        Self("1".to_string())
    }

    /// Path of this part's `index`-th child (1-based).
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        Self(format!("{}.{index}", self.0))
    }

    /// Nesting depth (number of path segments).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// Returns true if `self` contains `other` as a nested part.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        is_subpart(&self.0, &other.0)
    }

    /// The path as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content transfer encoding of a part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII passthrough.
    #[default]
    SevenBit,
    /// 8-bit passthrough.
    EightBit,
    /// Raw binary passthrough.
    Binary,
    /// Base64.
    Base64,
    /// Quoted-printable.
    QuotedPrintable,
}

impl TransferEncoding {
    /// Parses a Content-Transfer-Encoding header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// The header value for this encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
        }
    }

    /// Returns true if content in this encoding passes through unchanged.
    #[must_use]
    pub const fn is_passthrough(self) -> bool {
        matches!(self, Self::SevenBit | Self::EightBit | Self::Binary)
    }
}

/// Disposition of a fetched part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartDisposition {
    /// Displayable body content.
    #[default]
    Inline,
    /// Attached file content.
    Attachment,
}

/// One node of a fetched message's multipart structure.
#[derive(Debug, Clone)]
pub struct PartInfo {
    /// Part-number path of this node.
    pub number: PartNumber,
    /// Declared content type, lowercased (`text/plain`, `multipart/mixed`).
    pub content_type: String,
    /// Declared charset, if any.
    pub charset: Option<String>,
    /// Transfer encoding of the leaf content.
    pub transfer_encoding: TransferEncoding,
    /// Disposition (inline vs attachment).
    pub disposition: PartDisposition,
    /// File name from the disposition or type parameters.
    pub filename: Option<String>,
    /// Content-ID for inline reference, without angle brackets.
    pub content_id: Option<String>,
    /// Declared size in octets, when the server reported one.
    pub size: Option<usize>,
}

impl PartInfo {
    /// Creates a part record with defaults for everything but the path.
    #[must_use]
    pub fn new(number: PartNumber) -> Self {
        Self {
            number,
            content_type: String::new(),
            charset: None,
            transfer_encoding: TransferEncoding::SevenBit,
            disposition: PartDisposition::Inline,
            filename: None,
            content_id: None,
            size: None,
        }
    }

    /// Returns true if this node declares a multipart container type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.content_type.starts_with("multipart/")
    }

    /// Returns true if this node is a `message/rfc822` sub-message.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.content_type.eq_ignore_ascii_case("message/rfc822")
    }

    /// Returns true if the part should be treated as an attachment: either
    /// by disposition or by carrying a filename on a non-text type.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.disposition == PartDisposition::Attachment
            || (self.filename.is_some() && !self.content_type.starts_with("text/"))
    }
}
