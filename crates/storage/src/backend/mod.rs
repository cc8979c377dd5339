//! Blob store trait and implementations.
//!
//! This module defines the `BlobStore` trait, which provides a unified
//! interface over wherever downloaded media ends up living on the device
//! (a directory on disk, or memory for tests).

mod local;
#[cfg(any(test, feature = "mock"))]
mod memory;

pub use self::local::LocalBlobStore;
#[cfg(any(test, feature = "mock"))]
pub use self::memory::MemoryBlobStore;
use crate::error::Result;
use crate::models::{BlobInfo, CacheUsage};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

pub(crate) type BlobInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<BlobInfo>> + Send + 'a>>;

/// Unified interface for blob stores.
///
/// A blob store maps a media URL to the bytes downloaded from it. It is a
/// glorified key-value store, with two twists:
///
/// - Reads update the entry's access time, which the
///   [`Governor`](crate::Governor) uses to break ties between equally-sized
///   entries.
/// - Writes must be atomic from the point of view of every other caller:
///   either the previous content (or nothing) is visible, or the new content
///   is. Two prefetches racing on the same key is fine; the last write wins.
///
/// # Examples
///
/// ```
/// use marquee_storage::{BlobStore, error::Result};
///
/// async fn cached_size(store: &dyn BlobStore, url: &str) -> Result<u64> {
///     if store.contains(url).await? {
///         Ok(store.get(url).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Name of the store, used for logging only.
    fn name(&self) -> &str;

    /// Read a blob.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if there is no
    /// blob under this key. Updates the entry's last access time.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Check if a blob exists, without touching its access time.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Store a blob, replacing any existing content under the same key.
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove a blob. Removing a key that isn't there is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Stream metadata for every stored blob, in no particular order.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use marquee_storage::{BlobStore, error::Result};
    /// # async fn example(store: &dyn BlobStore) -> Result<()> {
    /// let mut entries = store.entries_stream();
    /// while let Some(info) = entries.try_next().await? {
    ///     println!("{}: {} bytes", info.key, info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn entries_stream(&self) -> BlobInfoStream<'_>;

    /// Metadata (key, size, last access) for every stored blob.
    ///
    /// Default implementation collects [`entries_stream()`](Self::entries_stream).
    async fn entries(&self) -> Result<Vec<BlobInfo>> {
        self.entries_stream().try_collect().await
    }

    /// Number of blobs and their combined size.
    async fn usage(&self) -> Result<CacheUsage> {
        let entries = self.entries().await?;
        Ok(entries.iter().collect())
    }

    /// Remove every blob in the store.
    async fn clear(&self) -> Result<()> {
        for info in self.entries().await? {
            self.delete(&info.key).await?;
        }
        Ok(())
    }
}
