//! Message fetching: header parse, multipart discovery, content streaming.
//!
//! The multipart tree is discovered one part at a time with
//! `BODY.PEEK[n.MIME]` probes, tracking nesting through an explicit stack of
//! multipart levels (each entry the boundary-relative child index), so the
//! walk stays resumable across partial reads. Leaf content is then streamed
//! through the transfer decoding and charset transcoding into the caller's
//! sink in bounded chunks; a full part is never buffered by the engine.

use embermail_core::Transport;
use embermail_core::storage::Storage;
use embermail_mime::charset::{Charset, CharsetHook, decode_to_utf8_with};
use embermail_mime::encoding::{Base64Decoder, QpDecoder};
use embermail_mime::{PartInfo, PartNumber, TransferEncoding};
use tracing::debug;

use crate::command::Command;
use crate::event::MimeSink;
use crate::parser::headers::{MessageHeader, parse_message_header, parse_part_headers};
use crate::parser::{ResponseLine, TaggedStatus, Untagged, parse_fetch_attrs, parse_line};
use crate::reader::{ChunkConsumer, literal_len};
use crate::session::{CommandOutput, ImapSession, ImapState};
use crate::types::Flags;
use crate::{Error, Result};

/// How a fetch addresses its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    /// By sequence number in the selected folder.
    Seq(u32),
    /// By UID.
    Uid(u32),
}

impl MessageId {
    fn set(self) -> String {
        match self {
            Self::Seq(n) | Self::Uid(n) => n.to_string(),
        }
    }

    const fn uid(self) -> bool {
        matches!(self, Self::Uid(_))
    }
}

/// Options for one fetch operation.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Populate header fields only; no body octets reach the sink.
    pub header_only: bool,
    /// Stream text/* leaf parts to the sink.
    pub download_text: bool,
    /// Stream attachment and nested-message parts to the sink.
    pub download_attachments: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            header_only: false,
            download_text: true,
            download_attachments: true,
        }
    }
}

impl FetchOptions {
    /// Header-only fetch.
    #[must_use]
    pub const fn headers() -> Self {
        Self {
            header_only: true,
            download_text: false,
            download_attachments: false,
        }
    }
}

/// Result of one fetch operation.
#[derive(Debug, Clone, Default)]
pub struct FetchedMessage {
    /// UID, when the server reported one.
    pub uid: Option<u32>,
    /// Flags reported alongside the header fetch.
    pub flags: Flags,
    /// Parsed header fields.
    pub header: MessageHeader,
    /// Discovered part tree (flat, related via part-number paths),
    /// multipart containers included.
    pub parts: Vec<PartInfo>,
}

/// One entry of the multipart walk stack: the boundary-relative child
/// index currently probed at that nesting level.
#[derive(Debug)]
struct MultipartLevel {
    child_index: usize,
}

impl<T: Transport, S: Storage> ImapSession<T, S> {
    /// Fetches one message: header fields, multipart structure, and (unless
    /// `header_only`) leaf content streamed to `sink`.
    ///
    /// # Errors
    ///
    /// Rejected commands, parse failures, sink failures, transport loss.
    pub async fn fetch_message<K: MimeSink>(
        &mut self,
        id: MessageId,
        options: &FetchOptions,
        sink: &mut K,
    ) -> Result<FetchedMessage> {
        self.require_selected()?;
        self.ensure_session().await?;
        self.state = ImapState::Fetching;
        let result = self.fetch_inner(id, options, sink).await;
        self.state = ImapState::Selected;
        result.inspect_err(|e| self.fail(e))
    }

    async fn fetch_inner<K: MimeSink>(
        &mut self,
        id: MessageId,
        options: &FetchOptions,
        sink: &mut K,
    ) -> Result<FetchedMessage> {
        let mut message = self.fetch_header(id).await?;

        if options.header_only {
            return Ok(message);
        }

        if message.header.content_type.starts_with("multipart/") {
            self.walk_multipart(id, &mut message).await?;
        } else {
            // Single-part message: the body is section 1.
            let mut part = PartInfo::new(PartNumber::root());
            part.content_type = if message.header.content_type.is_empty() {
                "text/plain".to_string()
            } else {
                message.header.content_type.clone()
            };
            part.charset = message.header.charset.clone();
            part.transfer_encoding = message.header.transfer_encoding;
            message.parts.push(part);
        }

        let leaves: Vec<PartInfo> = message
            .parts
            .iter()
            .filter(|p| !p.is_multipart() && should_download(p, options))
            .cloned()
            .collect();
        for part in &leaves {
            self.fetch_part_content(id, part, sink).await?;
        }

        Ok(message)
    }

    /// Fetches and parses the header block plus UID and flags.
    async fn fetch_header(&mut self, id: MessageId) -> Result<FetchedMessage> {
        let out = self
            .run_command(&Command::Fetch {
                set: id.set(),
                items: "(UID FLAGS BODY.PEEK[HEADER])".to_string(),
                uid: id.uid(),
            })
            .await?
            .check()?;

        let mut message = FetchedMessage::default();
        for u in &out.untagged {
            if let Untagged::Fetch { attrs, .. } = u {
                let parsed = parse_fetch_attrs(attrs);
                if parsed.uid.is_some() {
                    message.uid = parsed.uid;
                }
                if let Some(flags) = parsed.flags {
                    message.flags = Flags::parse(&flags);
                }
            }
        }

        let block = out
            .literals
            .first()
            .map(|(_, _, data)| data.clone())
            .ok_or_else(|| Error::ParseFailed("no header literal in FETCH response".to_string()))?;
        message.header = parse_message_header(&block, self.charset_hook.as_mut());
        Ok(message)
    }

    /// Discovers the multipart tree with `BODY.PEEK[n.MIME]` probes.
    ///
    /// The stack holds one entry per open multipart container; entering a
    /// nested multipart pushes, exhausting a container's children pops.
    async fn walk_multipart(&mut self, id: MessageId, message: &mut FetchedMessage) -> Result<()> {
        let mut stack: Vec<MultipartLevel> = vec![MultipartLevel { child_index: 1 }];

        while !stack.is_empty() {
            let path = stack
                .iter()
                .map(|level| level.child_index.to_string())
                .collect::<Vec<_>>()
                .join(".");

            match self.fetch_probe(id, &path).await? {
                Some(block) if !block.is_empty() => {
                    let number = PartNumber::parse(&path)?;
                    let part = parse_part_headers(number, &block);
                    let descend = part.is_multipart();
                    debug!(part = %path, content_type = %part.content_type, "discovered part");
                    message.parts.push(part);
                    if descend {
                        stack.push(MultipartLevel { child_index: 1 });
                    } else if let Some(level) = stack.last_mut() {
                        level.child_index += 1;
                    }
                }
                _ => {
                    // No such part: this container is exhausted.
                    stack.pop();
                    if let Some(level) = stack.last_mut() {
                        level.child_index += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Fetches one `BODY.PEEK[section]` with a buffered literal, returning
    /// `None` when the server has no such section.
    async fn fetch_probe(&mut self, id: MessageId, path: &str) -> Result<Option<Vec<u8>>> {
        let out = self
            .run_command(&Command::Fetch {
                set: id.set(),
                items: format!("(BODY.PEEK[{path}.MIME])"),
                uid: id.uid(),
            })
            .await?;
        match out.status {
            TaggedStatus::Ok => Ok(out.literals.into_iter().map(|(_, _, data)| data).next()),
            // Servers disagree on probing past the end; both NO and BAD
            // just terminate this container.
            TaggedStatus::No | TaggedStatus::Bad => Ok(None),
        }
    }

    /// Streams one leaf part's content through decoding into the sink.
    async fn fetch_part_content<K: MimeSink>(
        &mut self,
        id: MessageId,
        part: &PartInfo,
        sink: &mut K,
    ) -> Result<()> {
        let tag = self.tags.next();
        let cmd = Command::Fetch {
            set: id.set(),
            items: format!("(BODY.PEEK[{}])", part.number),
            uid: id.uid(),
        };
        self.reader.write(&cmd.serialize(&tag)).await?;

        sink.begin_part(part).await?;
        let mut decoder = ContentDecoder::new(part, sink, self.charset_hook.as_mut());

        let completion: CommandOutput = loop {
            let line = self.reader.read_line().await?;
            if let Some(len) = literal_len(&line) {
                self.reader.stream_literal(len, &mut decoder).await?;
                continue;
            }
            match parse_line(&line) {
                Ok(ResponseLine::Tagged {
                    tag: t,
                    status,
                    code,
                    text,
                }) if t == tag => {
                    break CommandOutput {
                        status,
                        code,
                        text,
                        untagged: Vec::new(),
                        literals: Vec::new(),
                    };
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "skipping line during content fetch"),
            }
        };

        decoder.finish().await?;
        sink.end_part(part).await?;
        completion.check()?;
        Ok(())
    }
}

fn should_download(part: &PartInfo, options: &FetchOptions) -> bool {
    if part.is_attachment() || part.is_message() {
        options.download_attachments
    } else {
        options.download_text
    }
}

enum TransferState {
    Passthrough,
    Base64(Base64Decoder),
    Qp(QpDecoder),
}

/// Chunk pipeline: undo the transfer encoding first, then transcode text
/// charsets to UTF-8, then hand the bytes to the sink.
struct ContentDecoder<'a, K: MimeSink> {
    part: &'a PartInfo,
    sink: &'a mut K,
    hook: &'a mut dyn CharsetHook,
    transfer: TransferState,
    charset: Option<Charset>,
}

impl<'a, K: MimeSink> ContentDecoder<'a, K> {
    fn new(part: &'a PartInfo, sink: &'a mut K, hook: &'a mut dyn CharsetHook) -> Self {
        let transfer = match part.transfer_encoding {
            TransferEncoding::Base64 => TransferState::Base64(Base64Decoder::new()),
            TransferEncoding::QuotedPrintable => TransferState::Qp(QpDecoder::new()),
            _ => TransferState::Passthrough,
        };
        // Only text parts are transcoded, and UTF-8 passes through so that
        // multi-byte sequences split across chunks survive.
        let charset = if part.content_type.starts_with("text/") {
            match part.charset.as_deref().map(Charset::parse) {
                Some(Charset::Utf8) | None => None,
                Some(other) => Some(other),
            }
        } else {
            None
        };
        Self {
            part,
            sink,
            hook,
            transfer,
            charset,
        }
    }

    async fn emit(&mut self, decoded: &[u8]) -> Result<()> {
        if decoded.is_empty() {
            return Ok(());
        }
        if let Some(charset) = self.charset.clone() {
            let text = decode_to_utf8_with(&charset, decoded, &mut *self.hook);
            self.sink.data(self.part, text.as_bytes()).await
        } else {
            self.sink.data(self.part, decoded).await
        }
    }

    async fn finish(&mut self) -> Result<()> {
        let mut out = Vec::new();
        match &mut self.transfer {
            TransferState::Passthrough => {}
            TransferState::Base64(decoder) => decoder.finish().map_err(Error::Mime)?,
            TransferState::Qp(decoder) => decoder.finish(&mut out),
        }
        self.emit(&out).await
    }
}

impl<K: MimeSink> ChunkConsumer for ContentDecoder<'_, K> {
    async fn consume(&mut self, data: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(data.len());
        match &mut self.transfer {
            TransferState::Passthrough => out.extend_from_slice(data),
            TransferState::Base64(decoder) => decoder.push(data, &mut out).map_err(Error::Mime)?,
            TransferState::Qp(decoder) => decoder.push(data, &mut out).map_err(Error::Mime)?,
        }
        self.emit(&out).await
    }
}
