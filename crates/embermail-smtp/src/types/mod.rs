//! Core SMTP types.

mod address;
mod extension;
mod reply;

pub use address::is_valid_address;
pub use extension::{AuthMechanism, Capabilities};
pub use reply::{Reply, ReplyCode};
