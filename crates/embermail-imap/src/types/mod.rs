//! Core IMAP types.

mod capability;
mod flags;
mod folder;

pub use capability::{AuthMechanism, CapabilitySet};
pub use flags::{Flag, Flags};
pub use folder::{FolderInfo, FolderSnapshot};
