//! IMAP command builder.

mod tag;

pub use tag::TagGenerator;

/// STORE mutation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Replace the flag set (`FLAGS`).
    Replace,
    /// Add to the flag set (`+FLAGS`).
    Add,
    /// Remove from the flag set (`-FLAGS`).
    Remove,
}

impl StoreMode {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Replace => "FLAGS",
            Self::Add => "+FLAGS",
            Self::Remove => "-FLAGS",
        }
    }
}

/// IMAP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE command.
    Authenticate {
        /// Mechanism name.
        mechanism: String,
        /// Base64 initial response.
        initial_response: Option<String>,
    },
    /// SELECT command.
    Select {
        /// Folder to select.
        mailbox: String,
    },
    /// EXAMINE command (read-only SELECT).
    Examine {
        /// Folder to examine.
        mailbox: String,
    },
    /// LIST command.
    List {
        /// Reference name.
        reference: String,
        /// Folder pattern.
        pattern: String,
    },
    /// CREATE command.
    Create {
        /// Folder to create.
        mailbox: String,
    },
    /// DELETE command.
    Delete {
        /// Folder to delete.
        mailbox: String,
    },
    /// CLOSE command.
    Close,
    /// EXPUNGE command.
    Expunge,
    /// SEARCH command; criteria pass through verbatim.
    Search {
        /// Search criteria, e.g. `UNSEEN SINCE 1-Jan-2026`.
        criteria: String,
        /// Address messages by UID.
        uid: bool,
    },
    /// FETCH command.
    Fetch {
        /// Message set, e.g. `1:10` or a single number.
        set: String,
        /// Items, e.g. `(UID FLAGS BODY.PEEK[HEADER])`.
        items: String,
        /// Address messages by UID.
        uid: bool,
    },
    /// STORE command against one message.
    Store {
        /// Message set.
        set: String,
        /// Mutation mode.
        mode: StoreMode,
        /// Parenthesized flag list.
        flags: String,
        /// Address messages by UID.
        uid: bool,
    },
    /// COPY command.
    Copy {
        /// Message set.
        set: String,
        /// Destination folder.
        mailbox: String,
        /// Address messages by UID.
        uid: bool,
    },
    /// APPEND command opener; the message literal follows separately.
    Append {
        /// Target folder.
        mailbox: String,
        /// Parenthesized flag list.
        flags: Option<String>,
        /// Internal date string.
        date: Option<String>,
        /// Literal octet count.
        size: usize,
        /// Use a non-synchronizing literal (LITERAL+).
        literal_plus: bool,
    },
    /// IDLE command.
    Idle,
    /// DONE continuation ending IDLE (untagged).
    Done,
    /// Caller-supplied raw command line (without tag and CRLF).
    Raw(String),
}

impl Command {
    /// Serializes the command with its correlation tag, CRLF-terminated.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let body = match self {
            Self::Capability => "CAPABILITY".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Logout => "LOGOUT".to_string(),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Login { username, password } => {
                format!("LOGIN {} {}", quote(username), quote(password))
            }
            Self::Authenticate {
                mechanism,
                initial_response,
            } => initial_response.as_ref().map_or_else(
                || format!("AUTHENTICATE {mechanism}"),
                |resp| format!("AUTHENTICATE {mechanism} {resp}"),
            ),
            Self::Select { mailbox } => format!("SELECT {}", quote(mailbox)),
            Self::Examine { mailbox } => format!("EXAMINE {}", quote(mailbox)),
            Self::List { reference, pattern } => {
                format!("LIST {} {}", quote(reference), quote(pattern))
            }
            Self::Create { mailbox } => format!("CREATE {}", quote(mailbox)),
            Self::Delete { mailbox } => format!("DELETE {}", quote(mailbox)),
            Self::Close => "CLOSE".to_string(),
            Self::Expunge => "EXPUNGE".to_string(),
            Self::Search { criteria, uid } => {
                format!("{}SEARCH {criteria}", uid_prefix(*uid))
            }
            Self::Fetch { set, items, uid } => {
                format!("{}FETCH {set} {items}", uid_prefix(*uid))
            }
            Self::Store {
                set,
                mode,
                flags,
                uid,
            } => format!("{}STORE {set} {} {flags}", uid_prefix(*uid), mode.keyword()),
            Self::Copy { set, mailbox, uid } => {
                format!("{}COPY {set} {}", uid_prefix(*uid), quote(mailbox))
            }
            Self::Append {
                mailbox,
                flags,
                date,
                size,
                literal_plus,
            } => {
                let mut line = format!("APPEND {}", quote(mailbox));
                if let Some(flags) = flags {
                    line.push_str(&format!(" {flags}"));
                }
                if let Some(date) = date {
                    line.push_str(&format!(" \"{date}\""));
                }
                let plus = if *literal_plus { "+" } else { "" };
                line.push_str(&format!(" {{{size}{plus}}}"));
                line
            }
            Self::Idle => "IDLE".to_string(),
            Self::Done => "DONE".to_string(),
            Self::Raw(line) => line.clone(),
        };

        // DONE is a continuation of the running IDLE, never tagged.
        let mut buf = if matches!(self, Self::Done) {
            body.into_bytes()
        } else {
            format!("{tag} {body}").into_bytes()
        };
        buf.extend_from_slice(b"\r\n");
        buf
    }
}

const fn uid_prefix(uid: bool) -> &'static str {
    if uid { "UID " } else { "" }
}

/// Quotes an astring argument when it contains specials.
fn quote(s: &str) -> String {
    let needs_quoting = s.is_empty()
        || s.bytes().any(|b| {
            matches!(
                b,
                b' ' | b'(' | b')' | b'{' | b'}' | b'%' | b'*' | b'"' | b'\\'
            )
        });
    if needs_quoting {
        let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        s.to_string()
    }
}
