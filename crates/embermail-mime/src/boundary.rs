//! Random boundary and content-id generation.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of the random portion of a boundary string.
const BOUNDARY_RANDOM_LEN: usize = 24;

/// Generates a multipart boundary unlikely to collide with body content.
///
/// One boundary is generated per message; nested containers derive theirs
/// independently.
#[must_use]
pub fn generate_boundary() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("=_Part_{random}")
}

/// Generates a content-id for an inline image, without angle brackets.
#[must_use]
pub fn generate_content_id() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{random}@embermail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_are_unique() {
        let a = generate_boundary();
        let b = generate_boundary();
        assert_ne!(a, b);
        assert!(a.starts_with("=_Part_"));
    }

    #[test]
    fn test_content_id_shape() {
        let cid = generate_content_id();
        assert!(cid.ends_with("@embermail"));
        assert!(!cid.contains('<'));
    }
}
