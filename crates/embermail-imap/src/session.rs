//! IMAP session engine.
//!
//! One [`ImapSession`] per connection, owned by the caller and mutated in
//! place. Every command carries a monotonically generated correlation tag;
//! responses are matched by tag and classified OK/NO/BAD. Parse failures
//! abort only the offending response's extraction, never the session.

use std::time::{Duration, Instant};

use embermail_core::storage::Storage;
use embermail_core::{DEFAULT_CHUNK_SIZE, FsStorage, ReconnectPolicy, Transport};
use embermail_mime::charset::{CharsetHook, NoCharsetHook};
use embermail_mime::{Message, render_to_vec};
use tracing::{debug, warn};

use crate::command::{Command, StoreMode, TagGenerator};
use crate::event::{ImapEvents, NoImapEvents, PollingEvent, PollingKind};
use crate::parser::{
    ResponseLine, StatusCode, TaggedStatus, Untagged, parse_line,
};
use crate::reader::{LineReader, literal_len};
use crate::types::{AuthMechanism, CapabilitySet, Flags, FolderInfo, FolderSnapshot};
use crate::{Error, Result, sasl};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Plaintext throughout.
    None,
    /// Plaintext greeting, then STARTTLS upgrade.
    StartTls,
    /// TLS from the first byte (port 993).
    Implicit,
}

/// Authentication material.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Username and password for LOGIN / AUTHENTICATE PLAIN.
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

/// IMAP session configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Credentials; `None` skips authentication (pre-auth servers).
    pub credentials: Option<Credentials>,
    /// Timeout applied to every transport read and write.
    pub io_timeout: Duration,
    /// Working-buffer size for reads and content streaming.
    pub chunk_size: usize,
    /// Minimum interval between reconnect attempts.
    pub min_reconnect_interval: Duration,
    /// Window during which re-selecting the same folder in the same mode
    /// is a no-op returning the cached snapshot.
    pub reselect_debounce: Duration,
    /// Maximum search hits returned to the caller.
    pub search_limit: usize,
}

impl ImapConfig {
    /// Creates a configuration with implicit TLS and default tuning.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::Implicit,
            credentials: None,
            io_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
            min_reconnect_interval: Duration::from_secs(10),
            reselect_debounce: Duration::from_secs(5),
            search_limit: 100,
        }
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

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
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

    /// Sets the search result limit.
    #[must_use]
    pub const fn search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }
}

/// Session protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImapState {
    /// No connection.
    Closed,
    /// TCP established, greeting not yet read.
    Connected,
    /// Greeting consumed.
    Greeted,
    /// Capability set known.
    CapabilitiesKnown,
    /// Logged in.
    Authenticated,
    /// A mailbox folder is selected.
    Selected,
    /// FETCH in flight.
    Fetching,
    /// SEARCH in flight.
    Searching,
    /// IDLE running.
    Idling,
    /// APPEND (possibly MULTIAPPEND) in flight.
    Appending,
}

/// Completed command exchange: tagged status plus collected untagged data.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub(crate) status: TaggedStatus,
    pub(crate) code: Option<StatusCode>,
    pub(crate) text: String,
    pub(crate) untagged: Vec<Untagged>,
    /// Buffered literals, keyed by the FETCH sequence number and BODY
    /// section they arrived under.
    pub(crate) literals: Vec<(u32, Option<String>, Vec<u8>)>,
}

impl CommandOutput {
    pub(crate) fn check(self) -> Result<Self> {
        match self.status {
            TaggedStatus::Ok => Ok(self),
            TaggedStatus::No => Err(Error::no(self.text)),
            TaggedStatus::Bad => Err(Error::bad(self.text)),
        }
    }
}

/// IMAP client session over a caller-supplied transport.
pub struct ImapSession<T: Transport, S: Storage = FsStorage> {
    pub(crate) config: ImapConfig,
    pub(crate) reader: LineReader<T>,
    pub(crate) storage: Option<S>,
    pub(crate) tags: TagGenerator,
    pub(crate) state: ImapState,
    pub(crate) capabilities: CapabilitySet,
    pub(crate) last_error: Option<String>,
    pub(crate) snapshot: FolderSnapshot,
    pub(crate) events: Box<dyn ImapEvents>,
    pub(crate) charset_hook: Box<dyn CharsetHook>,
    reconnect: ReconnectPolicy,
    last_select: Option<(String, bool, Instant)>,
    append_tag: Option<String>,
    idle_tag: Option<String>,
}

impl<T: Transport> ImapSession<T, FsStorage> {
    /// Creates a session without a storage backend.
    pub fn new(transport: T, config: ImapConfig) -> Self {
        Self::with_storage(transport, config, None)
    }
}

impl<T: Transport, S: Storage> ImapSession<T, S> {
    /// Creates a session with an optional storage backend for fetch-to-file
    /// operation and file-backed APPEND attachments.
    pub fn with_storage(transport: T, config: ImapConfig, storage: Option<S>) -> Self {
        let reader = LineReader::new(transport, config.chunk_size, config.io_timeout);
        let reconnect = ReconnectPolicy::new(config.min_reconnect_interval);
        Self {
            config,
            reader,
            storage,
            tags: TagGenerator::new(),
            state: ImapState::Closed,
            capabilities: CapabilitySet::default(),
            last_error: None,
            snapshot: FolderSnapshot::default(),
            events: Box::new(NoImapEvents),
            charset_hook: Box::new(NoCharsetHook),
            reconnect,
            last_select: None,
            append_tag: None,
            idle_tag: None,
        }
    }

    /// Installs the event observer for this session.
    pub fn set_events(&mut self, events: Box<dyn ImapEvents>) {
        self.events = events;
    }

    /// Installs the character-decoding hook consulted for charsets the
    /// library does not know.
    pub fn set_charset_hook(&mut self, hook: Box<dyn CharsetHook>) {
        self.charset_hook = hook;
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> ImapState {
        self.state
    }

    /// Capabilities advertised by the server.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Snapshot of the selected folder; meaningful from the last
    /// SELECT/EXAMINE until the next one.
    #[must_use]
    pub const fn selected_folder(&self) -> &FolderSnapshot {
        &self.snapshot
    }

    /// Reason of the last failure; stable until the next operation.
    #[must_use]
    pub fn error_reason(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True while the transport is believed connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.reader.transport.is_connected()
    }

    /// Borrows the underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.reader.transport
    }

    /// Mutably borrows the underlying transport, e.g. for caller-managed
    /// sockets.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.reader.transport
    }

    /// Connects and walks the session to the authenticated state.
    ///
    /// # Errors
    ///
    /// Any handshake failure; the reason is retained for
    /// [`error_reason`](Self::error_reason).
    pub async fn connect(&mut self) -> Result<()> {
        if matches!(
            self.state,
            ImapState::Authenticated | ImapState::Selected
        ) {
            return Ok(());
        }
        match self.establish().await {
            Ok(()) => {
                self.events.status("connected and authenticated", true);
                Ok(())
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn establish(&mut self) -> Result<()> {
        if !self.reader.transport.is_connected() {
            let implicit = self.config.security == Security::Implicit;
            let (host, port) = (self.config.host.clone(), self.config.port);
            self.reader.transport.connect(&host, port, implicit).await?;
        }
        self.reader.clear();
        self.tags.reset();
        self.state = ImapState::Connected;

        let greeting = self.reader.read_line().await?;
        debug!(line = %greeting, "imap greeting");
        let mut preauth = false;
        let mut caps_from_greeting = false;
        if greeting.starts_with("* PREAUTH") {
            preauth = true;
        } else {
            match parse_line(&greeting)? {
                ResponseLine::Untagged(Untagged::Status {
                    status: TaggedStatus::Ok,
                    code,
                    ..
                }) => {
                    if let Some(StatusCode::Capability(tokens)) = code {
                        let refs: Vec<&str> = tokens.iter().map(String::as_str).collect();
                        self.capabilities = CapabilitySet::parse(&refs);
                        caps_from_greeting = true;
                    }
                }
                ResponseLine::Untagged(Untagged::Bye(text)) => {
                    return Err(Error::no(text));
                }
                other => {
                    return Err(Error::ParseFailed(format!(
                        "unexpected greeting: {other:?}"
                    )));
                }
            }
        }
        self.state = ImapState::Greeted;

        // Capabilities are refreshed once per connection after the greeting.
        if !caps_from_greeting {
            self.refresh_capabilities().await?;
        }
        self.state = ImapState::CapabilitiesKnown;

        if self.config.security == Security::StartTls {
            if !self.capabilities.starttls {
                return Err(Error::InvalidState(
                    "server does not offer STARTTLS".to_string(),
                ));
            }
            self.run_command(&Command::StartTls).await?.check()?;
            let host = self.config.host.clone();
            self.reader.transport.upgrade_tls(&host).await?;
            self.reader.clear();
            self.refresh_capabilities().await?;
        }

        if !preauth && self.config.credentials.is_some() {
            self.authenticate().await?;
        }
        self.state = ImapState::Authenticated;
        Ok(())
    }

    async fn refresh_capabilities(&mut self) -> Result<()> {
        let out = self.run_command(&Command::Capability).await?.check()?;
        for u in out.untagged {
            if let Untagged::Capability(caps) = u {
                self.capabilities = caps;
            }
        }
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<()> {
        let Some(credentials) = self.config.credentials.clone() else {
            return Ok(());
        };

        for mechanism in self.capabilities.auth.clone() {
            match (mechanism, &credentials) {
                (AuthMechanism::Plain, Credentials::Password { username, password }) => {
                    let response = sasl::plain_response(username, password);
                    return self
                        .authenticate_exchange("PLAIN", &[response])
                        .await;
                }
                (AuthMechanism::Login, Credentials::Password { username, password }) => {
                    let steps = [sasl::base64_line(username), sasl::base64_line(password)];
                    return self.authenticate_exchange("LOGIN", &steps).await;
                }
                (AuthMechanism::XOAuth2, Credentials::AccessToken { user, token }) => {
                    let response = sasl::xoauth2_response(user, token);
                    // An extra continuation carries the error blob; an empty
                    // line elicits the final rejection.
                    return self
                        .authenticate_exchange("XOAUTH2", &[response, String::new()])
                        .await;
                }
                // CRAM-MD5-class digests are recognized but not produced.
                _ => {}
            }
        }

        // Plain LOGIN as the fallback for servers without AUTH= entries.
        if let Credentials::Password { username, password } = &credentials {
            if self.capabilities.login_disabled {
                return Err(Error::NoSupportedAuth);
            }
            let cmd = Command::Login {
                username: username.clone(),
                password: password.clone(),
            };
            return match self.run_command(&cmd).await?.check() {
                Ok(_) => Ok(()),
                Err(Error::CommandRejected { message, .. }) => Err(Error::AuthFailed(message)),
                Err(e) => Err(e),
            };
        }
        Err(Error::NoSupportedAuth)
    }

    /// Drives an AUTHENTICATE exchange: each server continuation consumes
    /// the next prepared response line.
    async fn authenticate_exchange(&mut self, mechanism: &str, steps: &[String]) -> Result<()> {
        let tag = self.tags.next();
        let cmd = Command::Authenticate {
            mechanism: mechanism.to_string(),
            initial_response: None,
        };
        self.reader.write(&cmd.serialize(&tag)).await?;

        let mut steps = steps.iter();
        loop {
            let line = self.reader.read_line().await?;
            self.events.response(&tag, &line);
            match parse_line(&line)? {
                ResponseLine::Continuation(_) => {
                    let step = steps.next().cloned().unwrap_or_default();
                    self.reader.write(format!("{step}\r\n").as_bytes()).await?;
                }
                ResponseLine::Tagged {
                    tag: t,
                    status,
                    text,
                    ..
                } if t == tag => {
                    return match status {
                        TaggedStatus::Ok => Ok(()),
                        _ => Err(Error::AuthFailed(text)),
                    };
                }
                _ => {}
            }
        }
    }

    /// Serializes and sends a command, then collects its response.
    pub(crate) async fn run_command(&mut self, cmd: &Command) -> Result<CommandOutput> {
        let tag = self.tags.next();
        let bytes = cmd.serialize(&tag);
        debug!(command = %String::from_utf8_lossy(&bytes).trim_end(), "imap >>");
        self.reader.write(&bytes).await?;
        self.collect_response(&tag).await
    }

    /// Reads lines (buffering any literals) until the tagged completion for
    /// `tag` arrives. Parse failures skip the offending line only.
    pub(crate) async fn collect_response(&mut self, tag: &str) -> Result<CommandOutput> {
        let mut untagged = Vec::new();
        let mut literals = Vec::new();

        loop {
            let mut line = self.reader.read_line().await?;
            let mut collected: Vec<Vec<u8>> = Vec::new();
            let mut tail = line.clone();
            while let Some(len) = literal_len(&tail) {
                collected.push(self.reader.read_literal(len).await?);
                tail = self.reader.read_line().await?;
                line.push_str(&tail);
            }
            self.events.response(tag, &line);

            match parse_line(&line) {
                Err(e) => {
                    // Abort only this response's extraction; the exchange
                    // and the session stay usable.
                    warn!(error = %e, line = %line, "skipping unparsable response line");
                    self.events.status(&e.to_string(), false);
                }
                Ok(ResponseLine::Tagged {
                    tag: t,
                    status,
                    code,
                    text,
                }) if t == tag => {
                    return Ok(CommandOutput {
                        status,
                        code,
                        text,
                        untagged,
                        literals,
                    });
                }
                Ok(ResponseLine::Tagged { .. } | ResponseLine::Continuation(_)) => {}
                Ok(ResponseLine::Untagged(u)) => {
                    if let Untagged::Fetch { seq, attrs } = &u
                        && !collected.is_empty()
                    {
                        let section = crate::parser::parse_fetch_attrs(attrs).section;
                        for data in collected.drain(..) {
                            literals.push((*seq, section.clone(), data));
                        }
                    }
                    self.apply_untagged(&u);
                    untagged.push(u);
                }
            }
        }
    }

    /// Applies unsolicited mailbox state changes to the snapshot.
    fn apply_untagged(&mut self, u: &Untagged) {
        match u {
            Untagged::Exists(n) => self.snapshot.msg_count = *n,
            Untagged::Recent(n) => self.snapshot.recent_count = *n,
            Untagged::Expunge(_) => {
                self.snapshot.msg_count = self.snapshot.msg_count.saturating_sub(1);
            }
            _ => {}
        }
    }

    /// Lists folders matching `pattern` under `reference`.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn list_folders(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<FolderInfo>> {
        self.require_authenticated()?;
        let out = self
            .run_command(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;

        Ok(out
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::List(info) => Some(info),
                _ => None,
            })
            .collect())
    }

    /// Creates a folder.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn create_folder(&mut self, name: &str) -> Result<()> {
        self.require_authenticated()?;
        self.run_command(&Command::Create {
            mailbox: name.to_string(),
        })
        .await?
        .check()
        .map(|_| ())
        .inspect_err(|e| self.fail(e))
    }

    /// Deletes a folder.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn delete_folder(&mut self, name: &str) -> Result<()> {
        self.require_authenticated()?;
        self.run_command(&Command::Delete {
            mailbox: name.to_string(),
        })
        .await?
        .check()
        .map(|_| ())
        .inspect_err(|e| self.fail(e))
    }

    /// Selects (or examines, when `read_only`) a folder and re-parses its
    /// snapshot.
    ///
    /// Re-selecting the same folder in the same mode within the debounce
    /// window is a no-op returning the cached snapshot.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn select_folder(&mut self, name: &str, read_only: bool) -> Result<FolderSnapshot> {
        self.require_authenticated()?;

        if self.state == ImapState::Selected
            && let Some((folder, ro, at)) = &self.last_select
            && folder == name
            && *ro == read_only
            && at.elapsed() < self.config.reselect_debounce
        {
            return Ok(self.snapshot.clone());
        }

        let cmd = if read_only {
            Command::Examine {
                mailbox: name.to_string(),
            }
        } else {
            Command::Select {
                mailbox: name.to_string(),
            }
        };
        let out = self
            .run_command(&cmd)
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;

        // Every selection invalidates the previous snapshot wholesale.
        let mut snapshot = FolderSnapshot {
            name: name.to_string(),
            read_only,
            ..FolderSnapshot::default()
        };
        for u in &out.untagged {
            match u {
                Untagged::Exists(n) => snapshot.msg_count = *n,
                Untagged::Recent(n) => snapshot.recent_count = *n,
                Untagged::Flags(list) => snapshot.flags = Flags::parse(list),
                Untagged::Status {
                    code: Some(code), ..
                } => match code {
                    StatusCode::Unseen(n) => snapshot.unseen_index = Some(*n),
                    StatusCode::UidNext(n) => snapshot.next_uid = Some(*n),
                    StatusCode::UidValidity(n) => snapshot.uid_validity = Some(*n),
                    StatusCode::PermanentFlags(list) => {
                        snapshot.permanent_flags = Flags::parse(list);
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        if let Some(StatusCode::ReadOnly) = out.code {
            snapshot.read_only = true;
        }

        self.snapshot = snapshot;
        self.state = ImapState::Selected;
        self.last_select = Some((name.to_string(), read_only, Instant::now()));
        Ok(self.snapshot.clone())
    }

    /// Closes the selected folder.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn close_folder(&mut self) -> Result<()> {
        self.require_selected()?;
        self.run_command(&Command::Close)
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;
        self.state = ImapState::Authenticated;
        self.last_select = None;
        self.snapshot = FolderSnapshot::default();
        Ok(())
    }

    /// Searches the selected folder; criteria pass through verbatim
    /// (e.g. `UNSEEN`, `SUBJECT "report"`).
    ///
    /// Results are returned most-recent-first and truncated to the
    /// configured limit; the snapshot records the full hit count.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn search(&mut self, criteria: &str, uid: bool) -> Result<Vec<u32>> {
        self.require_selected()?;
        self.state = ImapState::Searching;
        let result = self
            .run_command(&Command::Search {
                criteria: criteria.to_string(),
                uid,
            })
            .await
            .and_then(CommandOutput::check);
        self.state = ImapState::Selected;
        let out = result.inspect_err(|e| self.fail(e))?;

        let mut hits: Vec<u32> = out
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                Untagged::Search(nums) => Some(nums),
                _ => None,
            })
            .flatten()
            .collect();
        hits.sort_unstable();
        hits.reverse();
        self.snapshot.search_count = hits.len();
        hits.truncate(self.config.search_limit);
        Ok(hits)
    }

    /// Resolves a message sequence number to its UID.
    ///
    /// # Errors
    ///
    /// Rejected command, missing UID, or transport failure.
    pub async fn uid_for(&mut self, seq: u32) -> Result<u32> {
        self.require_selected()?;
        let out = self
            .run_command(&Command::Fetch {
                set: seq.to_string(),
                items: "(UID)".to_string(),
                uid: false,
            })
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;

        out.untagged
            .iter()
            .find_map(|u| match u {
                Untagged::Fetch { attrs, .. } => crate::parser::parse_fetch_attrs(attrs).uid,
                _ => None,
            })
            .ok_or_else(|| Error::ParseFailed(format!("no UID in FETCH response for {seq}")))
    }

    /// Fetches the flag set of a message by sequence number.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn flags_for(&mut self, seq: u32) -> Result<Flags> {
        self.require_selected()?;
        let out = self
            .run_command(&Command::Fetch {
                set: seq.to_string(),
                items: "(FLAGS)".to_string(),
                uid: false,
            })
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;

        Ok(out
            .untagged
            .iter()
            .find_map(|u| match u {
                Untagged::Fetch { attrs, .. } => crate::parser::parse_fetch_attrs(attrs).flags,
                _ => None,
            })
            .map(|list| Flags::parse(&list))
            .unwrap_or_default())
    }

    /// Replaces the flag set of one message (STORE FLAGS).
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn set_flags(&mut self, uid: u32, flags: &Flags) -> Result<()> {
        self.store_flags(uid, StoreMode::Replace, flags).await
    }

    /// Adds flags to one message (STORE +FLAGS).
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn add_flags(&mut self, uid: u32, flags: &Flags) -> Result<()> {
        self.store_flags(uid, StoreMode::Add, flags).await
    }

    /// Removes flags from one message (STORE -FLAGS).
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn remove_flags(&mut self, uid: u32, flags: &Flags) -> Result<()> {
        self.store_flags(uid, StoreMode::Remove, flags).await
    }

    async fn store_flags(&mut self, uid: u32, mode: StoreMode, flags: &Flags) -> Result<()> {
        self.require_selected()?;
        if self.snapshot.read_only {
            return Err(Error::InvalidState(
                "folder is selected read-only".to_string(),
            ));
        }
        self.run_command(&Command::Store {
            set: uid.to_string(),
            mode,
            flags: flags.to_wire(),
            uid: true,
        })
        .await?
        .check()
        .map(|_| ())
        .inspect_err(|e| self.fail(e))
    }

    /// Copies messages to another folder by UID.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn copy_messages(&mut self, uids: &[u32], destination: &str) -> Result<()> {
        self.require_selected()?;
        if uids.is_empty() {
            return Ok(());
        }
        let set = uids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.run_command(&Command::Copy {
            set,
            mailbox: destination.to_string(),
            uid: true,
        })
        .await?
        .check()
        .map(|_| ())
        .inspect_err(|e| self.fail(e))
    }

    /// Marks messages deleted and optionally expunges the folder.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn delete_messages(&mut self, uids: &[u32], expunge: bool) -> Result<()> {
        self.require_selected()?;
        if !uids.is_empty() {
            let set = uids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            self.run_command(&Command::Store {
                set,
                mode: StoreMode::Add,
                flags: "(\\Deleted)".to_string(),
                uid: true,
            })
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;
        }
        if expunge {
            self.run_command(&Command::Expunge)
                .await?
                .check()
                .inspect_err(|e| self.fail(e))?;
        }
        Ok(())
    }

    /// Appends a message to a folder, using one MULTIAPPEND command for a
    /// run of appends when the server supports it.
    ///
    /// With MULTIAPPEND, pass `last = false` for every message but the
    /// final one; without the capability each call completes on its own.
    ///
    /// # Errors
    ///
    /// Rendering, rejected command, or transport failure.
    pub async fn append(
        &mut self,
        msg: &Message,
        folder: &str,
        flags: Option<&Flags>,
        date: Option<&str>,
        last: bool,
    ) -> Result<()>
    where
        S: Sync,
    {
        // Appending stays legal mid-MULTIAPPEND.
        if !matches!(
            self.state,
            ImapState::Authenticated | ImapState::Selected | ImapState::Appending
        ) {
            return Err(Error::InvalidState(
                "session not authenticated; call connect() first".to_string(),
            ));
        }
        msg.validate()?;
        let bytes = render_to_vec(msg, self.storage.as_ref(), self.config.chunk_size).await?;
        let literal_plus = self.capabilities.literal_plus;
        let complete = last || !self.capabilities.multi_append;
        self.state = ImapState::Appending;

        let result = self
            .append_inner(&bytes, folder, flags, date, literal_plus, complete)
            .await;
        if complete || result.is_err() {
            self.append_tag = None;
            self.state = if self.last_select.is_some() {
                ImapState::Selected
            } else {
                ImapState::Authenticated
            };
        }
        result.inspect_err(|e| self.fail(e))
    }

    async fn append_inner(
        &mut self,
        bytes: &[u8],
        folder: &str,
        flags: Option<&Flags>,
        date: Option<&str>,
        literal_plus: bool,
        complete: bool,
    ) -> Result<()> {
        if self.append_tag.is_none() {
            let tag = self.tags.next();
            let cmd = Command::Append {
                mailbox: folder.to_string(),
                flags: flags.map(Flags::to_wire),
                date: date.map(ToString::to_string),
                size: bytes.len(),
                literal_plus,
            };
            self.reader.write(&cmd.serialize(&tag)).await?;
            if !literal_plus {
                self.await_continuation(&tag).await?;
            }
            self.append_tag = Some(tag);
        } else {
            // MULTIAPPEND continuation: the command line resumes after the
            // previous literal.
            let plus = if literal_plus { "+" } else { "" };
            let mut line = String::new();
            if let Some(flags) = flags {
                line.push_str(&format!(" {}", flags.to_wire()));
            }
            if let Some(date) = date {
                line.push_str(&format!(" \"{date}\""));
            }
            line.push_str(&format!(" {{{}{plus}}}\r\n", bytes.len()));
            self.reader.write(line.as_bytes()).await?;
            if !literal_plus {
                let tag = self.append_tag.clone().unwrap_or_default();
                self.await_continuation(&tag).await?;
            }
        }

        // The literal itself, in bounded slices.
        for chunk in bytes.chunks(self.config.chunk_size.max(1)) {
            self.reader.write(chunk).await?;
        }

        if complete {
            self.reader.write(b"\r\n").await?;
            let tag = self.append_tag.clone().unwrap_or_default();
            self.collect_response(&tag).await?.check()?;
        }
        Ok(())
    }

    async fn await_continuation(&mut self, tag: &str) -> Result<()> {
        loop {
            let line = self.reader.read_line().await?;
            self.events.response(tag, &line);
            match parse_line(&line)? {
                ResponseLine::Continuation(_) => return Ok(()),
                ResponseLine::Tagged {
                    tag: t,
                    status,
                    text,
                    ..
                } if t == tag => {
                    return match status {
                        TaggedStatus::Ok => {
                            Err(Error::ParseFailed("unexpected completion".to_string()))
                        }
                        TaggedStatus::No => Err(Error::no(text)),
                        TaggedStatus::Bad => Err(Error::bad(text)),
                    };
                }
                _ => {}
            }
        }
    }

    /// Starts listening for mailbox changes via IDLE when available; in
    /// poll mode this is a no-op and [`poll`](Self::poll) does the work.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn listen(&mut self) -> Result<()> {
        self.require_selected()?;
        if !self.capabilities.idle || self.idle_tag.is_some() {
            return Ok(());
        }
        let tag = self.tags.next();
        self.reader.write(&Command::Idle.serialize(&tag)).await?;
        self.await_continuation(&tag)
            .await
            .inspect_err(|e| self.fail(e))?;
        self.idle_tag = Some(tag);
        self.state = ImapState::Idling;
        Ok(())
    }

    /// Checks for mailbox changes without blocking indefinitely.
    ///
    /// While idling this drains pending unsolicited responses; otherwise it
    /// issues a NOOP round trip. One event is raised per change, and the
    /// snapshot's counts are updated.
    ///
    /// # Errors
    ///
    /// Transport failure or a rejected NOOP.
    pub async fn poll(&mut self) -> Result<Vec<PollingEvent>> {
        let mut events = Vec::new();

        if self.state == ImapState::Idling {
            while self.reader.poll_available().await? > 0 {
                let line = self.reader.read_line().await?;
                if let Ok(ResponseLine::Untagged(u)) = parse_line(&line) {
                    let baseline = self.snapshot.msg_count;
                    Self::collect_polling_event(&u, baseline, &mut events);
                    self.apply_untagged(&u);
                }
            }
        } else {
            self.require_selected()?;
            // The snapshot mutates while the NOOP response is collected;
            // judge "new mail" against the count from before the round trip.
            let baseline = self.snapshot.msg_count;
            let out = self
                .run_command(&Command::Noop)
                .await?
                .check()
                .inspect_err(|e| self.fail(e))?;
            for u in &out.untagged {
                Self::collect_polling_event(u, baseline, &mut events);
            }
        }

        for event in &events {
            self.events.polling(event);
        }
        Ok(events)
    }

    fn collect_polling_event(u: &Untagged, baseline: u32, events: &mut Vec<PollingEvent>) {
        match u {
            Untagged::Exists(n) if *n > baseline => {
                events.push(PollingEvent {
                    kind: PollingKind::New,
                    message_number: *n,
                    argument: "EXISTS".to_string(),
                });
            }
            Untagged::Expunge(seq) => {
                events.push(PollingEvent {
                    kind: PollingKind::Removed,
                    message_number: *seq,
                    argument: "EXPUNGE".to_string(),
                });
            }
            Untagged::Fetch { seq, attrs } => {
                events.push(PollingEvent {
                    kind: PollingKind::Fetched,
                    message_number: *seq,
                    argument: attrs.clone(),
                });
            }
            _ => {}
        }
    }

    /// Stops an IDLE listen. Always returns, even when the server's
    /// completion is unparsable.
    ///
    /// # Errors
    ///
    /// Transport failure while sending DONE.
    pub async fn stop_listen(&mut self) -> Result<()> {
        let Some(tag) = self.idle_tag.take() else {
            return Ok(());
        };
        self.reader.write(&Command::Done.serialize(&tag)).await?;
        if let Err(e) = self.collect_response(&tag).await {
            warn!(error = %e, "IDLE completion failed; session continues");
        }
        self.state = ImapState::Selected;
        Ok(())
    }

    /// Sends a caller-supplied raw command; every response line is mirrored
    /// to the observer with the command's tag.
    ///
    /// # Errors
    ///
    /// Rejected command or transport failure.
    pub async fn send_custom_command(&mut self, line: &str) -> Result<String> {
        if self.state == ImapState::Closed {
            return Err(Error::InvalidState("session is closed".to_string()));
        }
        let out = self
            .run_command(&Command::Raw(line.to_string()))
            .await?
            .check()
            .inspect_err(|e| self.fail(e))?;
        Ok(out.text)
    }

    /// Sends raw data after a custom command that opened a literal, e.g. a
    /// hand-rolled APPEND.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub async fn send_custom_data(&mut self, data: &[u8]) -> Result<()> {
        self.reader.write(data).await
    }

    /// Logs out and closes the transport. The session can be reconnected
    /// with [`connect`](Self::connect).
    pub async fn logout(&mut self) -> Result<()> {
        if self.reader.transport.is_connected() {
            let tag = self.tags.next();
            if let Err(e) = self
                .reader
                .write(&Command::Logout.serialize(&tag))
                .await
            {
                debug!(error = %e, "LOGOUT write failed during close");
            } else if let Err(e) = self.collect_response(&tag).await {
                debug!(error = %e, "LOGOUT completion failed during close");
            }
            self.reader.transport.stop().await;
        }
        self.state = ImapState::Closed;
        self.last_select = None;
        self.idle_tag = None;
        self.append_tag = None;
        self.snapshot = FolderSnapshot::default();
        self.reconnect.reset();
        Ok(())
    }

    /// Re-establishes a dropped session once, honoring the minimum retry
    /// interval, and re-selects the previously selected folder.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` when the retry budget is exhausted.
    pub(crate) async fn ensure_session(&mut self) -> Result<()> {
        if self.reader.transport.is_connected() {
            return Ok(());
        }
        if !self.reconnect.may_attempt() {
            return Err(embermail_core::Error::ConnectionClosed.into());
        }
        self.reconnect.record_attempt();
        warn!("transport lost; attempting one reconnect");
        self.reader.transport.stop().await;
        self.state = ImapState::Closed;
        let reselect = self.last_select.take();
        self.establish().await?;
        if let Some((folder, read_only, _)) = reselect {
            Box::pin(self.select_folder(&folder, read_only)).await?;
        }
        Ok(())
    }

    pub(crate) fn require_authenticated(&self) -> Result<()> {
        match self.state {
            ImapState::Authenticated | ImapState::Selected => Ok(()),
            _ => Err(Error::InvalidState(
                "session not authenticated; call connect() first".to_string(),
            )),
        }
    }

    pub(crate) fn require_selected(&self) -> Result<()> {
        match self.state {
            ImapState::Selected | ImapState::Idling => Ok(()),
            ImapState::Authenticated => Err(Error::NoMailboxSelected),
            _ => Err(Error::InvalidState(
                "session not ready; call connect() first".to_string(),
            )),
        }
    }

    /// Records a failure reason and notifies the observer.
    pub(crate) fn fail(&mut self, error: &Error) {
        let reason = error.to_string();
        self.last_error = Some(reason.clone());
        self.events.status(&reason, false);
    }
}
