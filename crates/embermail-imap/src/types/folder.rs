//! Folder listing and selected-folder snapshot types.

use super::Flags;

/// One folder from a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Folder name.
    pub name: String,
    /// Name attributes (`\HasChildren`, `\Noselect`, ...).
    pub attributes: Vec<String>,
    /// Hierarchy delimiter, if the server reports one.
    pub delimiter: Option<String>,
}

/// State of the selected folder, re-parsed on every SELECT/EXAMINE.
///
/// A selection invalidates the previous snapshot wholesale; nothing here
/// survives a folder change.
#[derive(Debug, Clone, Default)]
pub struct FolderSnapshot {
    /// Selected folder name.
    pub name: String,
    /// True for EXAMINE (read-only) selections.
    pub read_only: bool,
    /// Total message count (EXISTS).
    pub msg_count: u32,
    /// Recent message count (RECENT).
    pub recent_count: u32,
    /// Predicted next UID (UIDNEXT).
    pub next_uid: Option<u32>,
    /// Sequence number of the first unseen message (UNSEEN).
    pub unseen_index: Option<u32>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u32>,
    /// Number of hits in the most recent search.
    pub search_count: usize,
    /// Flags defined for this mailbox.
    pub flags: Flags,
    /// Flags the client may change permanently.
    pub permanent_flags: Flags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_default_is_empty() {
        let snap = FolderSnapshot::default();
        assert_eq!(snap.msg_count, 0);
        assert!(snap.next_uid.is_none());
        assert!(snap.flags.is_empty());
    }
}
