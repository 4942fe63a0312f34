//! SMTP session engine.
//!
//! One [`SmtpSession`] per connection, owned by the caller and mutated in
//! place. The session tracks protocol state across round trips, retains the
//! last error reason for idempotent querying, and makes at most one bounded
//! reconnect attempt after a dropped transport.

use std::time::Duration;

use bytes::BytesMut;
use embermail_core::storage::Storage;
use embermail_core::{DEFAULT_CHUNK_SIZE, FsStorage, ReconnectPolicy, Transport};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::command::Command;
use crate::event::{NoEvents, SendStatus, SmtpEvents};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::result::SendingResults;
use crate::sasl;
use crate::types::{AuthMechanism, Capabilities, Reply, ReplyCode};
use crate::{Error, Result};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Plaintext throughout.
    None,
    /// Plaintext greeting, then STARTTLS upgrade.
    StartTls,
    /// TLS from the first byte (submission port 465).
    Implicit,
}

/// Authentication material.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Username and password for PLAIN/LOGIN.
    Password {
        /// Authentication username.
        username: String,
        /// Authentication password.
        password: String,
    },
    /// User address plus OAuth2 access token for XOAUTH2.
    AccessToken {
        /// User address.
        user: String,
        /// Bearer token.
        token: String,
    },
}

/// SMTP session configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Hostname announced in EHLO/HELO.
    pub client_hostname: String,
    /// Credentials; `None` skips authentication.
    pub credentials: Option<Credentials>,
    /// Timeout applied to every transport read and write.
    pub io_timeout: Duration,
    /// Working-buffer size for chunked reads, body streaming, and BDAT
    /// frames.
    pub chunk_size: usize,
    /// Minimum interval between reconnect attempts.
    pub min_reconnect_interval: Duration,
}

impl SmtpConfig {
    /// Creates a configuration with implicit TLS and default tuning.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::Implicit,
            client_hostname: "localhost".to_string(),
            credentials: None,
            io_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_reconnect_interval: Duration::from_secs(10),
        }
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets password credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Password {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets OAuth2 token credentials.
    #[must_use]
    pub fn access_token(mut self, user: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::AccessToken {
            user: user.into(),
            token: token.into(),
        });
        self
    }

    /// Sets the read/write timeout.
    #[must_use]
    pub const fn io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Sets the working-buffer size.
    #[must_use]
    pub const fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Phase of an in-progress send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPhase {
    /// MAIL FROM / RCPT TO exchange.
    Envelope,
    /// Header block and text parts.
    Body,
    /// Attachment streaming.
    Attachments,
    /// DATA terminator / final BDAT frame.
    Terminating,
}

/// Session protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Closed,
    /// TCP established, greeting not yet read.
    Connected,
    /// 220 greeting consumed.
    Greeted,
    /// EHLO capabilities parsed.
    CapabilitiesKnown,
    /// AUTH exchange in flight.
    Authenticating,
    /// Ready for a transaction.
    Idle,
    /// Send transaction in progress.
    Sending(SendPhase),
}

/// How body bytes reach the wire for the current send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum BodyMode {
    /// Dot-stuffed stream after DATA, terminated by `.`.
    #[default]
    Data,
    /// Explicit-length BDAT frames (CHUNKING extension).
    Chunked,
}

/// SMTP client session over a caller-supplied transport.
pub struct SmtpSession<T: Transport, S: Storage = FsStorage> {
    pub(crate) config: SmtpConfig,
    pub(crate) transport: T,
    pub(crate) storage: Option<S>,
    pub(crate) state: SessionState,
    pub(crate) capabilities: Capabilities,
    pub(crate) last_error: Option<String>,
    pub(crate) results: SendingResults,
    pub(crate) events: Box<dyn SmtpEvents>,
    reconnect: ReconnectPolicy,
    read_buf: BytesMut,
    pub(crate) body_mode: BodyMode,
    pub(crate) bdat_buf: Vec<u8>,
    pub(crate) at_line_start: bool,
}

impl<T: Transport> SmtpSession<T, FsStorage> {
    /// Creates a session without a storage backend; file-backed attachments
    /// will be rejected until one is attached.
    pub fn new(transport: T, config: SmtpConfig) -> Self {
        Self::with_storage(transport, config, None)
    }
}

impl<T: Transport, S: Storage> SmtpSession<T, S> {
    /// Creates a session with an optional storage backend for file-backed
    /// attachments.
    pub fn with_storage(transport: T, config: SmtpConfig, storage: Option<S>) -> Self {
        let reconnect = ReconnectPolicy::new(config.min_reconnect_interval);
        Self {
            config,
            transport,
            storage,
            state: SessionState::Closed,
            capabilities: Capabilities::default(),
            last_error: None,
            results: SendingResults::new(),
            events: Box::new(NoEvents),
            reconnect,
            read_buf: BytesMut::new(),
            body_mode: BodyMode::Data,
            bdat_buf: Vec::new(),
            at_line_start: true,
        }
    }

    /// Installs the event observer for this session.
    pub fn set_events(&mut self, events: Box<dyn SmtpEvents>) {
        self.events = events;
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Capabilities parsed from the last EHLO.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Results of every send attempted on this session.
    #[must_use]
    pub const fn sending_results(&self) -> &SendingResults {
        &self.results
    }

    /// Reason of the last failure; stable until the next operation.
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while the transport is believed connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Borrows the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrows the underlying transport, e.g. for caller-managed
    /// sockets.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Connects and walks the session to the ready state: greeting, EHLO,
    /// optional STARTTLS, optional AUTH.
    ///
    /// # Errors
    ///
    /// Any handshake failure; the reason is also retained for
    /// [`error_reason`](Self::error_reason).
    pub async fn connect(&mut self) -> Result<()> {
        if matches!(self.state, SessionState::Idle) {
            return Ok(());
        }
        match self.establish().await {
            Ok(()) => {
                self.emit_status("connected and ready", true);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            self.transport
                .connect(
                    &self.config.host,
                    self.config.port,
                    self.config.security == Security::Implicit,
                )
                .await?;
        }
        self.read_buf.clear();
        self.state = SessionState::Connected;

        let greeting = self.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(Error::rejected(
                greeting.code.as_u16(),
                greeting.message_text(),
            ));
        }
        self.state = SessionState::Greeted;

        self.ehlo().await?;

        if self.config.security == Security::StartTls {
            if !self.capabilities.starttls {
                return Err(Error::InvalidState(
                    "server does not offer STARTTLS".to_string(),
                ));
            }
            let reply = self.command(&Command::StartTls).await?;
            if reply.code != ReplyCode::SERVICE_READY {
                return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
            }
            let host = self.config.host.clone();
            self.transport.upgrade_tls(&host).await?;
            // The pre-TLS capability set no longer applies.
            self.ehlo().await?;
        }

        if self.config.credentials.is_some() {
            self.authenticate().await?;
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    async fn ehlo(&mut self) -> Result<()> {
        let hostname = self.config.client_hostname.clone();
        let reply = self.command(&Command::Ehlo { hostname }).await?;
        if reply.is_success() {
            self.capabilities = Capabilities::from_ehlo(&reply);
        } else {
            // Ancient servers; no extensions to discover.
            let hostname = self.config.client_hostname.clone();
            let reply = self.command(&Command::Helo { hostname }).await?;
            if !reply.is_success() {
                return Err(Error::rejected(reply.code.as_u16(), reply.message_text()));
            }
            self.capabilities = Capabilities::default();
        }
        self.state = SessionState::CapabilitiesKnown;
        Ok(())
    }

    /// Tries advertised mechanisms in order against the configured
    /// credentials.
    async fn authenticate(&mut self) -> Result<()> {
        self.state = SessionState::Authenticating;
        let Some(credentials) = self.config.credentials.clone() else {
            return Ok(());
        };

        for mechanism in self.capabilities.auth.clone() {
            match (mechanism, &credentials) {
                (AuthMechanism::Plain, Credentials::Password { username, password }) => {
                    let initial = sasl::plain_response(username, password);
                    return self.auth_with_initial(AuthMechanism::Plain, initial).await;
                }
                (AuthMechanism::Login, Credentials::Password { username, password }) => {
                    return self.auth_login(username.clone(), password.clone()).await;
                }
                (AuthMechanism::XOAuth2, Credentials::AccessToken { user, token }) => {
                    let initial = sasl::xoauth2_response(user, token);
                    return self.auth_xoauth2(initial).await;
                }
                // CRAM-MD5-class digests are recognized but not produced by
                // this client; keep scanning for a usable mechanism.
                _ => {}
            }
        }
        Err(Error::NoSupportedAuth)
    }

    async fn auth_with_initial(&mut self, mechanism: AuthMechanism, initial: String) -> Result<()> {
        let reply = self
            .command(&Command::Auth {
                mechanism,
                initial_response: Some(initial),
            })
            .await?;
        Self::check_auth_reply(&reply)
    }

    async fn auth_login(&mut self, username: String, password: String) -> Result<()> {
        let reply = self
            .command(&Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::AuthFailed(reply.message_text()));
        }
        let reply = self
            .command(&Command::Raw(sasl::login_step(&username)))
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::AuthFailed(reply.message_text()));
        }
        let reply = self
            .command(&Command::Raw(sasl::login_step(&password)))
            .await?;
        Self::check_auth_reply(&reply)
    }

    async fn auth_xoauth2(&mut self, initial: String) -> Result<()> {
        let reply = self
            .command(&Command::Auth {
                mechanism: AuthMechanism::XOAuth2,
                initial_response: Some(initial),
            })
            .await?;
        if reply.code == ReplyCode::AUTH_CONTINUE {
            // Server sent a base64 error blob; an empty line elicits the
            // final rejection.
            let reply = self.command(&Command::Raw(String::new())).await?;
            return Err(Error::AuthFailed(reply.message_text()));
        }
        Self::check_auth_reply(&reply)
    }

    fn check_auth_reply(reply: &Reply) -> Result<()> {
        if reply.code == ReplyCode::AUTH_OK {
            Ok(())
        } else {
            Err(Error::AuthFailed(reply.message_text()))
        }
    }

    /// Sends a caller-supplied raw command and returns the parsed reply.
    ///
    /// # Errors
    ///
    /// Transport or parse failures; server rejections are returned as the
    /// reply, not as errors.
    pub async fn send_custom_command(&mut self, line: impl Into<String>) -> Result<Reply> {
        self.require_open()?;
        self.command(&Command::Raw(line.into())).await
    }

    /// Sends raw bytes after a custom DATA-like command, without awaiting a
    /// reply.
    ///
    /// # Errors
    ///
    /// Transport failures.
    pub async fn send_custom_data(&mut self, data: &[u8]) -> Result<()> {
        self.require_open()?;
        self.write_raw(data).await
    }

    /// Sends QUIT and closes the transport. The session can be reconnected
    /// with [`connect`](Self::connect).
    pub async fn close(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            // The server may drop the line before replying; that is fine.
            if let Err(e) = self.command(&Command::Quit).await {
                debug!(error = %e, "QUIT exchange failed during close");
            }
            self.transport.stop().await;
        }
        self.state = SessionState::Closed;
        self.reconnect.reset();
        Ok(())
    }

    /// Re-establishes a dropped session once, honoring the minimum retry
    /// interval. Never called mid-transaction.
    pub(crate) async fn ensure_session(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return match self.state {
                SessionState::Idle => Ok(()),
                _ => Err(Error::InvalidState(
                    "session not ready; call connect() first".to_string(),
                )),
            };
        }
        if !self.reconnect.may_attempt() {
            return Err(embermail_core::Error::ConnectionClosed.into());
        }
        self.reconnect.record_attempt();
        warn!("transport lost; attempting one reconnect");
        self.transport.stop().await;
        self.state = SessionState::Closed;
        self.establish().await
    }

    fn require_open(&self) -> Result<()> {
        if matches!(self.state, SessionState::Closed) {
            Err(Error::InvalidState("session is closed".to_string()))
        } else {
            Ok(())
        }
    }

    /// Serializes a command, sends it, and reads the reply.
    pub(crate) async fn command(&mut self, cmd: &Command) -> Result<Reply> {
        let bytes = cmd.serialize();
        debug!(command = %String::from_utf8_lossy(&bytes).trim_end(), "smtp >>");
        self.write_raw(&bytes).await?;
        self.read_reply().await
    }

    pub(crate) async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        let io_timeout = self.config.io_timeout;
        timeout(io_timeout, self.transport.write(data))
            .await
            .map_err(|_| embermail_core::Error::ReadTimeout(io_timeout))??;
        Ok(())
    }

    /// Reads one complete (possibly multi-line) reply.
    pub(crate) async fn read_reply(&mut self) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            debug!(line = %line, "smtp <<");
            self.events.response(&line);
            let is_last = is_last_reply_line(&line);
            lines.push(line);
            if is_last {
                break;
            }
        }
        parse_reply(&lines)
    }

    async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = self.read_buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.read_buf.split_to(pos + 2);
                return Ok(String::from_utf8_lossy(&line[..line.len() - 2]).into_owned());
            }

            let mut chunk = vec![0u8; self.config.chunk_size];
            let io_timeout = self.config.io_timeout;
            let n = timeout(io_timeout, self.transport.read(&mut chunk))
                .await
                .map_err(|_| embermail_core::Error::ReadTimeout(io_timeout))??;
            if n == 0 {
                return Err(embermail_core::Error::ConnectionClosed.into());
            }
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Records a failure reason and notifies the observer.
    pub(crate) fn fail(&mut self, error: &Error) {
        let reason = error.to_string();
        self.last_error = Some(reason.clone());
        let status = SendStatus {
            info: reason,
            success: false,
            completed: self.results.completed(),
            failed: self.results.failed(),
        };
        self.events.status(&status);
    }

    pub(crate) fn emit_status(&mut self, info: &str, success: bool) {
        let status = SendStatus {
            info: info.to_string(),
            success,
            completed: self.results.completed(),
            failed: self.results.failed(),
        };
        self.events.status(&status);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embermail_core::ScriptedTransport;
    use embermail_mime::{Attachment, Mailbox, Message, TextBody};

    fn greeting_script(extra_caps: &str) -> ScriptedTransport {
        let mut transport = ScriptedTransport::new();
        transport.push_read("220 mail.example.com ESMTP ready\r\n");
        transport.push_read(format!(
            "250-mail.example.com\r\n250-AUTH PLAIN LOGIN\r\n{extra_caps}250 8BITMIME\r\n"
        ));
        transport
    }

    fn config() -> SmtpConfig {
        SmtpConfig::new("mail.example.com", 465).credentials("amy", "secret")
    }

    fn message() -> Message {
        let mut msg = Message::new(Mailbox::new("Amy", "amy@example.com"));
        msg.subject = "greetings".to_string();
        msg.text = Some(TextBody::plain("hello there"));
        msg.add_recipient(Mailbox::address("bob@example.com"));
        msg
    }

    #[tokio::test]
    async fn test_connect_and_authenticate() {
        let mut transport = greeting_script("");
        transport.push_read("235 2.7.0 accepted\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(
            session.capabilities().auth,
            vec![AuthMechanism::Plain, AuthMechanism::Login]
        );
        let written = session.transport.written_text();
        assert!(written.contains("EHLO localhost\r\n"));
        assert!(written.contains("AUTH PLAIN "));
    }

    #[tokio::test]
    async fn test_no_supported_auth() {
        let mut transport = ScriptedTransport::new();
        transport.push_read("220 ready\r\n");
        transport.push_read("250-mail.example.com\r\n250 AUTH CRAM-MD5\r\n");

        let mut session = SmtpSession::new(transport, config());
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, Error::NoSupportedAuth));
        assert_eq!(session.error_reason(), Some("No supported authentication mechanism"));
    }

    #[tokio::test]
    async fn test_auth_failure_reported() {
        let mut transport = greeting_script("");
        transport.push_read("535 5.7.8 bad credentials\r\n");

        let mut session = SmtpSession::new(transport, config());
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, Error::AuthFailed(_)));
    }

    #[tokio::test]
    async fn test_send_single_text_message() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");
        transport.push_read("250 sender ok\r\n");
        transport.push_read("250 recipient ok\r\n");
        transport.push_read("354 go ahead\r\n");
        transport.push_read("250 2.0.0 accepted\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();
        session.send(&message()).await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.sending_results().completed(), 1);
        assert_eq!(session.sending_results().failed(), 0);

        let written = session.transport.written_text();
        assert!(written.contains("MAIL FROM:<amy@example.com>\r\n"));
        assert!(written.contains("RCPT TO:<bob@example.com>\r\n"));
        assert!(written.contains("DATA\r\n"));
        assert!(written.contains("Subject: greetings"));
        assert!(written.contains("hello there"));
        assert!(written.ends_with(".\r\n"));
    }

    #[tokio::test]
    async fn test_zero_valid_recipients_sends_nothing() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();

        let mut msg = message();
        msg.clear_recipients();
        msg.add_recipient(Mailbox::address("not-an-address"));

        let err = session.send(&msg).await.unwrap_err();
        assert!(matches!(err, Error::NoValidRecipients));
        assert_eq!(session.sending_results().failed(), 1);

        let written = session.transport.written_text();
        assert!(!written.contains("MAIL FROM"));
        assert!(!written.contains("RCPT TO"));
    }

    #[tokio::test]
    async fn test_one_rejected_recipient_is_tolerated() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");
        transport.push_read("250 sender ok\r\n");
        transport.push_read("250 first ok\r\n");
        transport.push_read("550 no such user\r\n");
        transport.push_read("354 go ahead\r\n");
        transport.push_read("250 accepted\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();

        let mut msg = message();
        msg.add_recipient(Mailbox::address("gone@example.com"));
        session.send(&msg).await.unwrap();

        assert_eq!(session.sending_results().completed(), 1);
    }

    #[tokio::test]
    async fn test_all_recipients_rejected_aborts() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");
        transport.push_read("250 sender ok\r\n");
        transport.push_read("550 no such user\r\n");
        transport.push_read("250 reset ok\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();

        let err = session.send(&message()).await.unwrap_err();
        assert!(matches!(err, Error::NoValidRecipients));

        let written = session.transport.written_text();
        assert!(written.contains("RSET\r\n"));
        assert!(!written.contains("DATA\r\n"));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_chunking_uses_bdat() {
        let mut transport = greeting_script("250-CHUNKING\r\n");
        transport.push_read("235 ok\r\n");
        transport.push_read("250 sender ok\r\n");
        transport.push_read("250 recipient ok\r\n");
        // Frame replies; the small message fits a few frames at most.
        for _ in 0..8 {
            transport.push_read("250 frame ok\r\n");
        }

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();
        session.send(&message()).await.unwrap();

        let written = session.transport.written_text();
        assert!(written.contains("BDAT "));
        assert!(written.contains(" LAST\r\n"));
        assert!(!written.contains("DATA\r\n"));
    }

    #[tokio::test]
    async fn test_missing_attachment_source_fails_before_envelope() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();

        let mut msg = message();
        let mut att = Attachment::from_blob("x.bin", Vec::new());
        att.source = None;
        msg.add_attachment(att);

        let err = session.send(&msg).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Mime(embermail_mime::Error::AttachmentSourceMissing(_))
        ));
        assert!(!session.transport.written_text().contains("MAIL FROM"));
    }

    #[tokio::test]
    async fn test_custom_command_round_trip() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");
        transport.push_read("252 cannot verify\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();

        let reply = session.send_custom_command("VRFY bob").await.unwrap();
        assert_eq!(reply.code.as_u16(), 252);
        assert!(session.transport.written_text().contains("VRFY bob\r\n"));
    }

    #[tokio::test]
    async fn test_error_reason_idempotent() {
        let mut transport = ScriptedTransport::new();
        transport.push_read("554 go away\r\n");

        let mut session = SmtpSession::new(transport, config());
        let _ = session.connect().await.unwrap_err();

        let first = session.error_reason().map(ToString::to_string);
        assert!(first.is_some());
        assert_eq!(session.error_reason(), first.as_deref());
        assert_eq!(session.error_reason(), first.as_deref());
    }

    #[tokio::test]
    async fn test_close_sends_quit() {
        let mut transport = greeting_script("");
        transport.push_read("235 ok\r\n");
        transport.push_read("221 bye\r\n");

        let mut session = SmtpSession::new(transport, config());
        session.connect().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transport.written_text().contains("QUIT\r\n"));
        assert!(!session.is_connected());
    }
}
