//! Blob key validation and on-disk naming.
//!
//! Keys are media URLs. They are never used as filenames directly: a URL can
//! contain `/`, `..`, query strings and anything else a filesystem might
//! choke on. Instead every key maps to a fixed-length BLAKE3 digest.

use crate::error::{ErrorKind, Result};

/// Validates a blob key.
///
/// Null bytes are rejected because the key is also written into sidecar
/// metadata and log lines, where a NUL truncates things in surprising ways.
///
/// # Examples
///
/// ```
/// use marquee_storage::validate_key;
/// assert!(validate_key("https://cdn.example/media/a.png?v=2").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("   ").is_err());
/// assert!(validate_key("a\0b").is_err());
/// ```
pub fn validate(key: &str) -> Result<&str> {
    if key.trim().is_empty() || key.as_bytes().contains(&0) {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    Ok(key)
}

/// Hex digest used to name a key's files on disk.
pub(crate) fn digest(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}
