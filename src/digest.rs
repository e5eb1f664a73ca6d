//! Content fingerprints used to compare snapshots without storing them.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Number of hex characters kept from the SHA-256 digest.
pub const DIGEST_LEN: usize = 12;

/// Compute a short SHA-256 fingerprint of `content`.
///
/// # Examples
///
/// ```
/// use tribunal::digest::digest_text;
///
/// assert_eq!(digest_text("hello"), digest_text("hello"));
/// assert_ne!(digest_text("hello"), digest_text("hello!"));
/// assert_eq!(digest_text("hello").len(), 12);
/// ```
pub fn digest_text(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)[..DIGEST_LEN].to_string()
}

/// Fingerprint a file on disk, or `None` when it does not exist or cannot be read.
pub fn digest_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(digest_text(&content))
}

/// Fingerprint optional content, propagating absence.
pub fn digest_opt(content: Option<&str>) -> Option<String> {
    content.map(digest_text)
}
