//! Outbound message model.
//!
//! A [`Message`] is built by the caller and borrowed read-only by the SMTP
//! engine during a send (and by the IMAP engine for APPEND). Attachment
//! content is never loaded here; the engine pulls it from the declared
//! source in bounded chunks at transmission time.

use embermail_core::StorageTier;

use crate::boundary::generate_content_id;
use crate::content_type::mime_for_filename;
use crate::part::TransferEncoding;
use crate::{Error, Result};

/// A display name plus address, as used in From/To/Cc headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name; may be empty.
    pub name: String,
    /// Address (`local@domain`).
    pub email: String,
}

impl Mailbox {
    /// Creates a mailbox with display name and address.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Creates a mailbox from a bare address.
    pub fn address(email: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            email: email.into(),
        }
    }
}

/// A plain-text or HTML body part.
#[derive(Debug, Clone)]
pub struct TextBody {
    /// Body content.
    pub content: String,
    /// Declared charset.
    pub charset: String,
    /// Content type (`text/plain` or `text/html`).
    pub content_type: String,
    /// Transfer encoding applied on the wire.
    pub transfer_encoding: TransferEncoding,
    /// Apply format=flowed soft breaking (text/plain only).
    pub flowed: bool,
}

impl TextBody {
    /// Creates a UTF-8 `text/plain` body.
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            charset: "UTF-8".to_string(),
            content_type: "text/plain".to_string(),
            transfer_encoding: TransferEncoding::SevenBit,
            flowed: false,
        }
    }

    /// Creates a UTF-8 `text/html` body.
    pub fn html(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            charset: "UTF-8".to_string(),
            content_type: "text/html".to_string(),
            transfer_encoding: TransferEncoding::SevenBit,
            flowed: false,
        }
    }

    /// Sets the transfer encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: TransferEncoding) -> Self {
        self.transfer_encoding = encoding;
        self
    }
}

/// Where an attachment's bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// In-memory content.
    Blob(Vec<u8>),
    /// Content on external storage, read lazily at send time.
    File {
        /// Path within the tier.
        path: String,
        /// Storage tier the path resolves against.
        tier: StorageTier,
    },
}

/// One attachment, inline image, or parallel part of an outbound message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Content source; a missing source fails validation, it is not skipped.
    pub source: Option<AttachmentSource>,
    /// Descriptive name.
    pub name: String,
    /// File name sent in the part headers.
    pub filename: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Transfer encoding for the content (base64 for anything binary).
    pub transfer_encoding: TransferEncoding,
    /// Content-ID for inline references, without angle brackets.
    pub content_id: Option<String>,
    pub(crate) parallel: bool,
    pub(crate) inline: bool,
}

impl Attachment {
    /// Creates an attachment from in-memory content.
    pub fn from_blob(filename: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let mime_type = mime_for_filename(&filename).to_string();
        Self {
            source: Some(AttachmentSource::Blob(data)),
            name: filename.clone(),
            filename,
            mime_type,
            transfer_encoding: TransferEncoding::Base64,
            content_id: None,
            parallel: false,
            inline: false,
        }
    }

    /// Creates an attachment backed by external storage.
    pub fn from_file(path: impl Into<String>, tier: StorageTier) -> Self {
        let path = path.into();
        let filename = path
            .rsplit('/')
            .next()
            .unwrap_or(path.as_str())
            .to_string();
        let mime_type = mime_for_filename(&filename).to_string();
        Self {
            source: Some(AttachmentSource::File { path, tier }),
            name: filename.clone(),
            filename,
            mime_type,
            transfer_encoding: TransferEncoding::Base64,
            content_id: None,
            parallel: false,
            inline: false,
        }
    }

    /// Overrides the declared MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Returns true for members of the `multipart/parallel` group.
    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Returns true for inline images.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        self.inline
    }

    /// Checks that a content source is present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AttachmentSourceMissing`] if neither blob nor file
    /// was set.
    pub fn validate(&self) -> Result<()> {
        if self.source.is_none() {
            return Err(Error::AttachmentSourceMissing(self.filename.clone()));
        }
        Ok(())
    }
}

/// An outbound email message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Author mailbox.
    pub from: Mailbox,
    /// Subject line; encoded per RFC 2047 on the wire when non-ASCII.
    pub subject: String,
    /// Plain-text body part.
    pub text: Option<TextBody>,
    /// HTML body part.
    pub html: Option<TextBody>,
    /// Explicit Message-ID; generated when absent.
    pub message_id: Option<String>,
    /// Parent message id for replies.
    pub in_reply_to: Option<String>,
    /// Reference chain for replies.
    pub references: Option<String>,
    /// Reply-To address.
    pub reply_to: Option<String>,
    recipients: Vec<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    headers: Vec<(String, String)>,
    attachments: Vec<Attachment>,
    nested: Vec<Message>,
}

impl Message {
    /// Creates an empty message from the given author.
    #[must_use]
    pub fn new(from: Mailbox) -> Self {
        Self {
            from,
            ..Self::default()
        }
    }

    /// Adds a primary recipient.
    pub fn add_recipient(&mut self, recipient: Mailbox) {
        self.recipients.push(recipient);
    }

    /// Adds a carbon-copy recipient.
    pub fn add_cc(&mut self, recipient: Mailbox) {
        self.cc.push(recipient);
    }

    /// Adds a blind-carbon-copy recipient.
    pub fn add_bcc(&mut self, recipient: Mailbox) {
        self.bcc.push(recipient);
    }

    /// Adds a custom header sent verbatim before the body.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// Adds a sequential attachment.
    pub fn add_attachment(&mut self, mut attachment: Attachment) {
        attachment.parallel = false;
        attachment.inline = false;
        self.attachments.push(attachment);
    }

    /// Adds an attachment to the `multipart/parallel` sibling group.
    pub fn add_parallel_attachment(&mut self, mut attachment: Attachment) {
        attachment.parallel = true;
        attachment.inline = false;
        self.attachments.push(attachment);
    }

    /// Adds an inline image, assigning a content-id when none is set.
    pub fn add_inline_image(&mut self, mut attachment: Attachment) {
        attachment.inline = true;
        attachment.parallel = false;
        if attachment.content_id.is_none() {
            attachment.content_id = Some(generate_content_id());
        }
        self.attachments.push(attachment);
    }

    /// Embeds another message as a `message/rfc822` part.
    pub fn add_nested_message(&mut self, message: Self) {
        self.nested.push(message);
    }

    /// Primary recipients.
    #[must_use]
    pub fn recipients(&self) -> &[Mailbox] {
        &self.recipients
    }

    /// Carbon-copy recipients.
    #[must_use]
    pub fn cc(&self) -> &[Mailbox] {
        &self.cc
    }

    /// Blind-carbon-copy recipients.
    #[must_use]
    pub fn bcc(&self) -> &[Mailbox] {
        &self.bcc
    }

    /// Custom headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Every attachment-like part in insertion order.
    #[must_use]
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Sequential (non-parallel, non-inline) attachments.
    pub fn sequential_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| !a.parallel && !a.inline)
    }

    /// Members of the `multipart/parallel` group.
    pub fn parallel_attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.parallel)
    }

    /// Inline images referenced from the HTML body.
    pub fn inline_images(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().filter(|a| a.inline)
    }

    /// Embedded RFC 822 messages.
    #[must_use]
    pub fn nested_messages(&self) -> &[Message] {
        &self.nested
    }

    /// Removes all attachments and inline images.
    pub fn clear_attachments(&mut self) {
        self.attachments.clear();
    }

    /// Removes only the inline images.
    pub fn clear_inline_images(&mut self) {
        self.attachments.retain(|a| !a.inline);
    }

    /// Removes embedded messages.
    pub fn clear_nested_messages(&mut self) {
        self.nested.clear();
    }

    /// Removes all recipients (To, Cc, Bcc).
    pub fn clear_recipients(&mut self) {
        self.recipients.clear();
        self.cc.clear();
        self.bcc.clear();
    }

    /// Returns true if the message has any body part or attachment.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.text.is_some() || self.html.is_some() || !self.attachments.is_empty()
    }

    /// Validates the send preconditions that do not depend on the server:
    /// some content present and every attachment carrying a source.
    ///
    /// # Errors
    ///
    /// Returns the first attachment-source error, or an encoding error if
    /// the message is empty.
    pub fn validate(&self) -> Result<()> {
        if !self.has_content() {
            return Err(Error::InvalidEncoding(
                "message has no text, HTML, or attachment content".to_string(),
            ));
        }
        for attachment in &self.attachments {
            attachment.validate()?;
        }
        for nested in &self.nested {
            nested.validate()?;
        }
        Ok(())
    }
}
