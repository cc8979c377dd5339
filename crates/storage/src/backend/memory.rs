//! In-memory blob store for testing.

use super::BlobInfoStream;
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use crate::{BlobInfo, BlobStore};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use time::UtcDateTime;
use tokio::sync::RwLock;

struct Entry {
    data: Vec<u8>,
    last_accessed: UtcDateTime,
}

/// In-memory blob store for testing.
///
/// Blobs are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Ideal for unit
/// tests that need a [`BlobStore`] without touching the filesystem.
///
/// # Examples
///
/// ```
/// use marquee_storage::{BlobStore, MemoryBlobStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryBlobStore::with_blobs([
///     ("https://cdn.example/a.png", vec![0u8; 16]),
/// ]);
/// assert!(store.contains("https://cdn.example/a.png").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryBlobStore {
    storage: RwLock<HashMap<String, Entry>>,
}

impl MemoryBlobStore {
    /// Create a store pre-populated with blobs.
    ///
    /// Panics if any key fails validation. If test setup is wrong, then the
    /// test should not pass.
    pub fn with_blobs(blobs: impl IntoIterator<Item = (impl Into<String>, impl Into<Vec<u8>>)>) -> Self {
        let now = UtcDateTime::now();
        let mut map = HashMap::new();
        for (key, data) in blobs {
            let key = key.into();
            if validate_key(&key).is_err() {
                panic!("MemoryBlobStore::with_blobs: invalid key {key:?}");
            }
            map.insert(key, Entry { data: data.into(), last_accessed: now });
        }
        Self { storage: RwLock::new(map) }
    }

    /// Create a store of zero-filled blobs with the given sizes and access
    /// times. Handy for exercising eviction without caring about content.
    pub fn with_sizes(entries: impl IntoIterator<Item = (impl Into<String>, usize, UtcDateTime)>) -> Self {
        let map = entries
            .into_iter()
            .map(|(key, size, last_accessed)| (key.into(), Entry { data: vec![0; size], last_accessed }))
            .collect();
        Self { storage: RwLock::new(map) }
    }

    /// Combined size of every blob.
    pub async fn total_bytes(&self) -> u64 {
        self.storage.read().await.values().map(|e| e.data.len() as u64).sum()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let key = validate_key(key)?;
        let mut guard = self.storage.write().await;
        let entry = guard.get_mut(key).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(key.to_string())))?;
        entry.last_accessed = UtcDateTime::now();
        Ok(entry.data.clone())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let key = validate_key(key)?;
        Ok(self.storage.read().await.contains_key(key))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let key = validate_key(key)?;
        let entry = Entry {
            data: data.to_vec(),
            last_accessed: UtcDateTime::now(),
        };
        self.storage.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = validate_key(key)?;
        self.storage.write().await.remove(key);
        Ok(())
    }

    fn entries_stream(&self) -> BlobInfoStream<'_> {
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding to
            // avoid holding the lock across yield points.
            let entries: Vec<BlobInfo> = {
                let guard = self.storage.read().await;
                guard.iter().map(|(key, e)| BlobInfo::new(key, e.data.len() as u64, e.last_accessed)).collect()
            };
            for info in entries {
                yield Ok(info);
            }
        })
    }

    async fn clear(&self) -> Result<()> {
        self.storage.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryBlobStore::default();
        store.put("https://cdn.example/a.png", b"hello").await.unwrap();
        assert_eq!(store.get("https://cdn.example/a.png").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = MemoryBlobStore::default();
        let err = store.get("https://cdn.example/missing.png").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = MemoryBlobStore::with_blobs([("a", b"data".to_vec())]);
        store.delete("b").await.unwrap();
        store.delete("a").await.unwrap();
        assert!(!store.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_with_sizes() {
        let now = UtcDateTime::now();
        let store = MemoryBlobStore::with_sizes([("a", 10, now), ("b", 20, now)]);
        assert_eq!(store.total_bytes().await, 30);
        assert_eq!(store.usage().await.unwrap().item_count, 2);
        store.clear().await.unwrap();
        assert_eq!(store.total_bytes().await, 0);
    }

    #[test]
    #[should_panic(expected = "invalid key")]
    fn test_with_blobs_panics_on_bad_key() {
        MemoryBlobStore::with_blobs([("", b"bad".to_vec())]);
    }
}
