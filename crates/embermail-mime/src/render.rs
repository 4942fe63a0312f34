//! Outbound message rendering.
//!
//! Walks a [`Message`] into an RFC 822 header block and boundary-delimited
//! MIME part blocks, pushing bytes through a [`BodySink`]. The SMTP engine
//! sinks straight into its transport (dot-stuffed or BDAT-framed); the IMAP
//! engine renders to a buffer for APPEND literals. Attachment content is
//! pulled from its source in `chunk_size` slices and encoded on the fly, so
//! peak memory stays at the chunk size regardless of attachment size.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use embermail_core::storage::{Storage, StorageSource};

use crate::boundary::{generate_boundary, generate_content_id};
use crate::encoding::{Base64Encoder, encode_quoted_printable};
use crate::flowed::format_flowed;
use crate::message::{Attachment, AttachmentSource, Mailbox, Message, TextBody};
use crate::part::TransferEncoding;
use crate::rfc2047::encode_header_value;
use crate::{Error, Result};

/// Sink for rendered message bytes.
pub trait BodySink: Send {
    /// Writes a slice of rendered bytes.
    fn write_body(&mut self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Called once when the renderer moves from body parts to attachments.
    fn attachments_started(&mut self) {}
}

/// [`BodySink`] collecting into a byte vector.
#[derive(Debug, Default)]
pub struct VecSink(pub Vec<u8>);

impl BodySink for VecSink {
    async fn write_body(&mut self, bytes: &[u8]) -> Result<()> {
        self.0.extend_from_slice(bytes);
        Ok(())
    }
}

/// Renders a whole message into memory (APPEND literals need the total
/// length up front).
///
/// # Errors
///
/// Attachment-source and storage failures.
pub async fn render_to_vec<S: Storage + Sync>(
    msg: &Message,
    storage: Option<&S>,
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let renderer = Renderer {
        storage,
        chunk_size,
    };
    let mut sink = VecSink::default();
    renderer.render_message(msg, &mut sink).await?;
    Ok(sink.0)
}

/// Top-level body shape of an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopLevel {
    /// Attachments or nested messages present.
    Mixed,
    /// Text and HTML siblings, nothing attached.
    Alternative,
    /// Single body part with inline images.
    Related,
    /// One body part, no container.
    Single,
}

fn classify(msg: &Message) -> TopLevel {
    let has_attached = msg.sequential_attachments().next().is_some()
        || msg.parallel_attachments().next().is_some()
        || !msg.nested_messages().is_empty();
    if has_attached {
        TopLevel::Mixed
    } else if msg.text.is_some() && msg.html.is_some() {
        TopLevel::Alternative
    } else if msg.inline_images().next().is_some() {
        TopLevel::Related
    } else {
        TopLevel::Single
    }
}

/// Stateless message renderer borrowing a storage backend for file-backed
/// attachments.
pub struct Renderer<'a, S: Storage> {
    /// Backend for [`AttachmentSource::File`] content; `None` rejects
    /// file-backed attachments.
    pub storage: Option<&'a S>,
    /// Slice size for attachment streaming.
    pub chunk_size: usize,
}

impl<'a, S: Storage + Sync> Renderer<'a, S> {
    /// Renders the complete RFC 822 message: header block, then body.
    ///
    /// # Errors
    ///
    /// Sink, attachment-source, and storage failures.
    pub async fn render_message<W: BodySink>(&self, msg: &Message, w: &mut W) -> Result<()> {
        let top = classify(msg);
        let boundary = generate_boundary();
        let headers = render_headers(msg, top, &boundary);
        w.write_body(headers.as_bytes()).await?;
        self.render_body(msg, top, &boundary, w).await
    }

    async fn render_body<W: BodySink>(
        &self,
        msg: &Message,
        top: TopLevel,
        boundary: &str,
        w: &mut W,
    ) -> Result<()> {
        match top {
            TopLevel::Single => {
                if let Some(body) = msg.text.as_ref().or(msg.html.as_ref()) {
                    w.write_body(&encode_text(body)).await?;
                }
                Ok(())
            }
            TopLevel::Alternative => {
                self.render_alternative_children(msg, boundary, w).await?;
                close_boundary(boundary, w).await
            }
            TopLevel::Related => {
                let body = msg.text.as_ref().or(msg.html.as_ref()).ok_or_else(|| {
                    Error::InvalidEncoding("inline images without a body part".into())
                })?;
                self.render_text_part(body, boundary, w).await?;
                for img in msg.inline_images() {
                    self.render_attachment(img, boundary, w).await?;
                }
                close_boundary(boundary, w).await
            }
            TopLevel::Mixed => {
                self.render_content_child(msg, boundary, w).await?;

                w.attachments_started();
                for att in msg.sequential_attachments() {
                    self.render_attachment(att, boundary, w).await?;
                }

                if msg.parallel_attachments().next().is_some() {
                    let parallel = generate_boundary();
                    open_part(
                        boundary,
                        &format!("Content-Type: multipart/parallel; boundary=\"{parallel}\"\r\n"),
                        w,
                    )
                    .await?;
                    for att in msg.parallel_attachments() {
                        self.render_attachment(att, &parallel, w).await?;
                    }
                    close_boundary(&parallel, w).await?;
                }

                for nested in msg.nested_messages() {
                    open_part(boundary, "Content-Type: message/rfc822\r\n", w).await?;
                    self.render_nested(nested, w).await?;
                    w.write_body(b"\r\n").await?;
                }

                close_boundary(boundary, w).await
            }
        }
    }

    /// The text/HTML content block of a mixed message.
    async fn render_content_child<W: BodySink>(
        &self,
        msg: &Message,
        boundary: &str,
        w: &mut W,
    ) -> Result<()> {
        match (&msg.text, &msg.html) {
            (Some(_), Some(_)) => {
                let alt = generate_boundary();
                open_part(
                    boundary,
                    &format!("Content-Type: multipart/alternative; boundary=\"{alt}\"\r\n"),
                    w,
                )
                .await?;
                self.render_alternative_children(msg, &alt, w).await?;
                close_boundary(&alt, w).await
            }
            (Some(body), None) | (None, Some(body)) => {
                if msg.inline_images().next().is_some() {
                    self.render_part_with_images(body, msg, boundary, w).await
                } else {
                    self.render_text_part(body, boundary, w).await
                }
            }
            (None, None) => Ok(()),
        }
    }

    /// Text and HTML siblings under an alternative container; the HTML side
    /// picks up inline images via a related wrapper.
    async fn render_alternative_children<W: BodySink>(
        &self,
        msg: &Message,
        boundary: &str,
        w: &mut W,
    ) -> Result<()> {
        if let Some(text) = &msg.text {
            self.render_text_part(text, boundary, w).await?;
        }
        if let Some(html) = &msg.html {
            if msg.inline_images().next().is_some() {
                self.render_part_with_images(html, msg, boundary, w).await?;
            } else {
                self.render_text_part(html, boundary, w).await?;
            }
        }
        Ok(())
    }

    async fn render_part_with_images<W: BodySink>(
        &self,
        body: &TextBody,
        msg: &Message,
        boundary: &str,
        w: &mut W,
    ) -> Result<()> {
        let related = generate_boundary();
        open_part(
            boundary,
            &format!("Content-Type: multipart/related; boundary=\"{related}\"\r\n"),
            w,
        )
        .await?;
        self.render_text_part(body, &related, w).await?;
        for img in msg.inline_images() {
            self.render_attachment(img, &related, w).await?;
        }
        close_boundary(&related, w).await
    }

    async fn render_text_part<W: BodySink>(
        &self,
        body: &TextBody,
        boundary: &str,
        w: &mut W,
    ) -> Result<()> {
        open_part(boundary, &text_part_headers(body), w).await?;
        w.write_body(&encode_text(body)).await?;
        w.write_body(b"\r\n").await
    }

    async fn render_attachment<W: BodySink>(
        &self,
        att: &Attachment,
        boundary: &str,
        w: &mut W,
    ) -> Result<()> {
        open_part(boundary, &attachment_part_headers(att), w).await?;
        self.stream_attachment_content(att, w).await?;
        w.write_body(b"\r\n").await
    }

    /// Streams attachment bytes from their source through the transfer
    /// encoding in `chunk_size` slices.
    async fn stream_attachment_content<W: BodySink>(
        &self,
        att: &Attachment,
        w: &mut W,
    ) -> Result<()> {
        let base64 = att.transfer_encoding == TransferEncoding::Base64;
        let mut encoder = Base64Encoder::new();
        let mut out = Vec::with_capacity(self.chunk_size * 2);

        match att
            .source
            .as_ref()
            .ok_or_else(|| Error::AttachmentSourceMissing(att.filename.clone()))?
        {
            AttachmentSource::Blob(data) => {
                for chunk in data.chunks(self.chunk_size.max(1)) {
                    if base64 {
                        encoder.push(chunk, &mut out);
                        w.write_body(&out).await?;
                        out.clear();
                    } else {
                        w.write_body(chunk).await?;
                    }
                }
            }
            AttachmentSource::File { path, tier } => {
                let storage = self.storage.ok_or_else(|| {
                    Error::Storage(embermail_core::Error::StorageUnavailable(format!(
                        "no storage backend for attachment {path}"
                    )))
                })?;
                let mut source = storage.open_read(*tier, path).await?;
                let mut buf = vec![0u8; self.chunk_size.max(1)];
                loop {
                    let n = source.read_chunk(&mut buf).await?;
                    if n == 0 {
                        break;
                    }
                    if base64 {
                        encoder.push(&buf[..n], &mut out);
                        w.write_body(&out).await?;
                        out.clear();
                    } else {
                        w.write_body(&buf[..n]).await?;
                    }
                }
                source.close().await?;
            }
        }

        if base64 {
            encoder.finish(&mut out);
            w.write_body(&out).await?;
        }
        Ok(())
    }

    /// Boxed indirection for `message/rfc822` recursion.
    fn render_nested<'b, W: BodySink>(
        &'b self,
        msg: &'b Message,
        w: &'b mut W,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'b>> {
        Box::pin(self.render_message(msg, w))
    }
}

async fn open_part<W: BodySink>(boundary: &str, headers: &str, w: &mut W) -> Result<()> {
    w.write_body(format!("--{boundary}\r\n{headers}\r\n").as_bytes())
        .await
}

async fn close_boundary<W: BodySink>(boundary: &str, w: &mut W) -> Result<()> {
    w.write_body(format!("--{boundary}--\r\n").as_bytes()).await
}

/// Renders the envelope header block, including the top-level content type.
fn render_headers(msg: &Message, top: TopLevel, boundary: &str) -> String {
    let mut out = String::new();

    out.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
    out.push_str(&format!("From: {}\r\n", render_mailbox(&msg.from)));
    if !msg.recipients().is_empty() {
        out.push_str(&format!(
            "To: {}\r\n",
            render_address_list(msg.recipients())
        ));
    }
    if !msg.cc().is_empty() {
        out.push_str(&format!("Cc: {}\r\n", render_address_list(msg.cc())));
    }
    if let Some(reply_to) = &msg.reply_to {
        out.push_str(&format!("Reply-To: <{reply_to}>\r\n"));
    }
    out.push_str(&format!(
        "Subject: {}\r\n",
        encode_header_value(&msg.subject)
    ));

    let message_id = msg
        .message_id
        .clone()
        .unwrap_or_else(|| format!("<{}>", generate_content_id()));
    out.push_str(&format!("Message-ID: {message_id}\r\n"));

    if let Some(in_reply_to) = &msg.in_reply_to {
        out.push_str(&format!("In-Reply-To: {in_reply_to}\r\n"));
    }
    if let Some(references) = &msg.references {
        out.push_str(&format!("References: {references}\r\n"));
    }
    for (name, value) in msg.headers() {
        out.push_str(&format!("{name}: {value}\r\n"));
    }

    out.push_str("MIME-Version: 1.0\r\n");
    match top {
        TopLevel::Mixed => {
            out.push_str(&format!(
                "Content-Type: multipart/mixed; boundary=\"{boundary}\"\r\n"
            ));
        }
        TopLevel::Alternative => {
            out.push_str(&format!(
                "Content-Type: multipart/alternative; boundary=\"{boundary}\"\r\n"
            ));
        }
        TopLevel::Related => {
            out.push_str(&format!(
                "Content-Type: multipart/related; boundary=\"{boundary}\"\r\n"
            ));
        }
        TopLevel::Single => {
            if let Some(body) = msg.text.as_ref().or(msg.html.as_ref()) {
                out.push_str(&text_part_headers(body));
            }
        }
    }
    out.push_str("\r\n");
    out
}

fn render_mailbox(mb: &Mailbox) -> String {
    if mb.name.is_empty() {
        format!("<{}>", mb.email)
    } else {
        format!("{} <{}>", encode_header_value(&mb.name), mb.email)
    }
}

fn render_address_list(list: &[Mailbox]) -> String {
    list.iter()
        .map(render_mailbox)
        .collect::<Vec<_>>()
        .join(", ")
}

fn text_part_headers(body: &TextBody) -> String {
    let mut out = format!(
        "Content-Type: {}; charset=\"{}\"",
        body.content_type, body.charset
    );
    if body.flowed {
        out.push_str("; format=flowed");
    }
    out.push_str("\r\n");
    out.push_str(&format!(
        "Content-Transfer-Encoding: {}\r\n",
        body.transfer_encoding.as_str()
    ));
    out
}

fn attachment_part_headers(att: &Attachment) -> String {
    let mut out = format!("Content-Type: {}; name=\"{}\"\r\n", att.mime_type, att.name);
    let disposition = if att.is_inline() {
        "inline"
    } else {
        "attachment"
    };
    out.push_str(&format!(
        "Content-Disposition: {disposition}; filename=\"{}\"\r\n",
        att.filename
    ));
    if let Some(cid) = &att.content_id {
        out.push_str(&format!("Content-ID: <{cid}>\r\n"));
    }
    out.push_str(&format!(
        "Content-Transfer-Encoding: {}\r\n",
        att.transfer_encoding.as_str()
    ));
    out
}

/// Applies flowed shaping and the configured transfer encoding to a body.
fn encode_text(body: &TextBody) -> Vec<u8> {
    let content = if body.flowed {
        format_flowed(&body.content)
    } else {
        body.content.clone()
    };
    match body.transfer_encoding {
        TransferEncoding::QuotedPrintable => encode_quoted_printable(&content).into_bytes(),
        TransferEncoding::Base64 => {
            let mut encoder = Base64Encoder::new();
            let mut out = Vec::with_capacity(content.len() * 4 / 3 + 4);
            encoder.push(content.as_bytes(), &mut out);
            encoder.finish(&mut out);
            out
        }
        _ => normalize_crlf(&content).into_bytes(),
    }
}

/// Converts lone LF line endings to CRLF.
fn normalize_crlf(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    out
}
