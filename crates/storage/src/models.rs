//! Metadata about cached blobs.

use std::fmt::{Display, Formatter, Result as FmtResult};
use time::UtcDateTime;

/// Metadata for one cached blob. The bytes themselves stay in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Media URL the blob was downloaded from.
    pub key: String,
    /// Blob size in bytes
    pub size: u64,
    /// Last time the blob was written or read
    pub last_accessed: UtcDateTime,
}
impl BlobInfo {
    pub fn new(key: impl Into<String>, size: u64, last_accessed: UtcDateTime) -> Self {
        Self {
            key: key.into(),
            size,
            last_accessed,
        }
    }
}

/// Aggregate view of a store, for status displays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    pub item_count: usize,
    pub total_bytes: u64,
}
impl<'a> FromIterator<&'a BlobInfo> for CacheUsage {
    fn from_iter<T: IntoIterator<Item = &'a BlobInfo>>(iter: T) -> Self {
        iter.into_iter().fold(Self::default(), |acc, info| Self {
            item_count: acc.item_count + 1,
            total_bytes: acc.total_bytes.saturating_add(info.size),
        })
    }
}
impl Display for CacheUsage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} items, {}", self.item_count, format_bytes(self.total_bytes))
    }
}

/// Human-readable byte count using binary multiples, e.g. `1.5 MB`.
///
/// # Examples
///
/// ```
/// use marquee_storage::format_bytes;
/// assert_eq!(format_bytes(0), "0 B");
/// assert_eq!(format_bytes(1536), "1.5 KB");
/// assert_eq!(format_bytes(500 * 1024 * 1024), "500 MB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    // Two decimals at most, with trailing zeros trimmed.
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
