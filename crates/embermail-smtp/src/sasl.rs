//! SASL initial-response builders.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Builds the PLAIN initial response (RFC 4616): `\0user\0password`, base64.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    let auth_string = format!("\0{username}\0{password}");
    STANDARD.encode(auth_string.as_bytes())
}

/// Builds the XOAUTH2 initial response:
/// `user=<user>\x01auth=Bearer <token>\x01\x01`, base64.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Base64-encodes one step of the LOGIN exchange.
#[must_use]
pub fn login_step(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}
