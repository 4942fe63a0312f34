//! Message transmission: envelope exchange and body channel.
//!
//! The MIME assembly lives in [`embermail_mime::render`]; this module wires
//! its [`BodySink`] into the session's two body channels: dot-stuffed DATA
//! streaming, or explicit-length BDAT frames when the server advertises
//! CHUNKING. A failure at any stage aborts the whole transaction, records
//! one failed result, and leaves the session usable.

use chrono::Utc;
use embermail_core::Transport;
use embermail_core::storage::Storage;
use embermail_mime::render::{BodySink, Renderer};
use embermail_mime::Message;
use tracing::warn;

use crate::command::Command;
use crate::result::SendRecord;
use crate::session::{BodyMode, SendPhase, SessionState, SmtpSession};
use crate::types::is_valid_address;
use crate::{Error, Result};

/// Adapter routing rendered bytes into the session's body channel.
///
/// Channel failures keep their original kind in `error`; the renderer only
/// sees an opaque abort marker.
struct SessionSink<'a, T: Transport, S: Storage> {
    session: &'a mut SmtpSession<T, S>,
    error: Option<Error>,
}

impl<T: Transport, S: Storage> BodySink for SessionSink<'_, T, S> {
    async fn write_body(&mut self, bytes: &[u8]) -> embermail_mime::Result<()> {
        match self.session.write_body_channel(bytes).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let marker = embermail_mime::Error::InvalidEncoding(e.to_string());
                self.error = Some(e);
                Err(marker)
            }
        }
    }

    fn attachments_started(&mut self) {
        self.session.state = SessionState::Sending(SendPhase::Attachments);
    }
}

impl<T: Transport, S: Storage> SmtpSession<T, S> {
    /// Writes body bytes through the active channel.
    pub(crate) async fn write_body_channel(&mut self, bytes: &[u8]) -> Result<()> {
        match self.body_mode {
            BodyMode::Data => {
                // Dot-stuff line starts so content cannot forge the
                // terminator.
                let mut out = Vec::with_capacity(bytes.len() + 8);
                for &b in bytes {
                    if self.at_line_start && b == b'.' {
                        out.push(b'.');
                    }
                    out.push(b);
                    self.at_line_start = b == b'\n';
                }
                self.write_raw(&out).await
            }
            BodyMode::Chunked => {
                self.bdat_buf.extend_from_slice(bytes);
                while self.bdat_buf.len() >= self.config.chunk_size {
                    let frame: Vec<u8> = self.bdat_buf.drain(..self.config.chunk_size).collect();
                    self.send_bdat_frame(&frame, false).await?;
                }
                Ok(())
            }
        }
    }

    async fn send_bdat_frame(&mut self, frame: &[u8], last: bool) -> Result<()> {
        let header = Command::Bdat {
            size: frame.len(),
            last,
        }
        .serialize();
        self.write_raw(&header).await?;
        self.write_raw(frame).await?;
        let reply = self.read_reply().await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(Error::rejected(reply.code.as_u16(), reply.message_text()))
        }
    }

    async fn finish_body(&mut self) -> Result<()> {
        match self.body_mode {
            BodyMode::Data => {
                if !self.at_line_start {
                    self.write_raw(b"\r\n").await?;
                }
                self.write_raw(b".\r\n").await?;
                let reply = self.read_reply().await?;
                if reply.is_success() {
                    Ok(())
                } else {
                    Err(Error::rejected(reply.code.as_u16(), reply.message_text()))
                }
            }
            BodyMode::Chunked => {
                let frame = std::mem::take(&mut self.bdat_buf);
                self.send_bdat_frame(&frame, true).await
            }
        }
    }
}

impl<T: Transport, S: Storage + Sync> SmtpSession<T, S> {
    /// Sends a message through the established session.
    ///
    /// The DATA transaction is atomic from the caller's viewpoint: any
    /// failure aborts the whole transaction, records one failed
    /// [`SendRecord`], and leaves the session usable.
    ///
    /// # Errors
    ///
    /// Validation failures (`NoValidSender`, `NoValidRecipients`, missing
    /// attachment sources) before any envelope exchange; transport or
    /// server failures afterwards.
    pub async fn send(&mut self, msg: &Message) -> Result<()> {
        let recipients: Vec<String> = msg
            .recipients()
            .iter()
            .chain(msg.cc())
            .chain(msg.bcc())
            .filter(|m| is_valid_address(&m.email))
            .map(|m| m.email.clone())
            .collect();

        let result = self.send_inner(msg, &recipients).await;

        let (success, reason) = match &result {
            Ok(()) => (true, "message accepted".to_string()),
            Err(e) => (false, e.to_string()),
        };
        self.results.push(SendRecord {
            success,
            reason,
            timestamp: Utc::now(),
            recipients,
            subject: msg.subject.clone(),
        });

        match result {
            Ok(()) => {
                self.state = SessionState::Idle;
                self.emit_status("message sent", true);
                Ok(())
            }
            Err(e) => {
                self.abort_transaction().await;
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn send_inner(&mut self, msg: &Message, recipients: &[String]) -> Result<()> {
        if !is_valid_address(&msg.from.email) {
            return Err(Error::NoValidSender);
        }
        msg.validate()?;
        if recipients.is_empty() {
            return Err(Error::NoValidRecipients);
        }

        self.ensure_session().await?;
        self.state = SessionState::Sending(SendPhase::Envelope);

        let reply = self
            .command(&Command::MailFrom {
                from: msg.from.email.clone(),
                size: None,
            })
            .await?;
        if !reply.is_success() {
            return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
        }

        let mut accepted = 0usize;
        for rcpt in recipients {
            let reply = self.command(&Command::RcptTo { to: rcpt.clone() }).await?;
            if reply.is_success() {
                accepted += 1;
            } else {
                // One rejected recipient is recoverable while any remain.
                warn!(recipient = %rcpt, code = reply.code.as_u16(), "recipient rejected");
                self.emit_status(&format!("recipient {rcpt} rejected"), false);
            }
        }
        if accepted == 0 {
            return Err(Error::NoValidRecipients);
        }

        self.body_mode = if self.capabilities.chunking {
            BodyMode::Chunked
        } else {
            BodyMode::Data
        };
        self.bdat_buf.clear();
        self.at_line_start = true;

        if self.body_mode == BodyMode::Data {
            let reply = self.command(&Command::Data).await?;
            if !reply.is_intermediate() {
                return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
            }
        }

        self.state = SessionState::Sending(SendPhase::Body);
        let storage = self.storage.take();
        let chunk_size = self.config.chunk_size;
        let renderer = Renderer {
            storage: storage.as_ref(),
            chunk_size,
        };
        let mut sink = SessionSink {
            session: &mut *self,
            error: None,
        };
        let rendered = renderer.render_message(msg, &mut sink).await;
        let channel_error = sink.error.take();
        self.storage = storage;
        if let Some(e) = channel_error {
            return Err(e);
        }
        rendered?;

        self.state = SessionState::Sending(SendPhase::Terminating);
        self.finish_body().await
    }

    /// Resets the server-side transaction after a failed send, keeping the
    /// session alive when the transport still is.
    async fn abort_transaction(&mut self) {
        if self.transport.is_connected() {
            if matches!(self.state, SessionState::Sending(_))
                && let Err(e) = self.command(&Command::Rset).await
            {
                warn!(error = %e, "RSET after failed send did not complete");
            }
            self.state = SessionState::Idle;
        } else {
            self.state = SessionState::Closed;
        }
    }
}
