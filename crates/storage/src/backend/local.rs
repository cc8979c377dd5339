//! Local filesystem blob store.
//!
//! Blobs are stored in a configured directory using `tokio::fs` for async
//! I/O. Each key gets two files named after its digest:
//!
//! - `<digest>.blob` holds the raw bytes,
//! - `<digest>.json` is a sidecar holding the key, size and access time.
//!
//! An entry is visible only while both files exist. The sidecar is written
//! after the blob and removed before it, so a crash at any point leaves either
//! a complete entry or an invisible orphan that the next `put` overwrites.

use crate::backend::BlobInfoStream;
use crate::error::{ErrorKind, Result};
use crate::key::{digest, validate as validate_key};
use crate::{BlobInfo, BlobStore};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all as sync_create_dir, read_dir as sync_read_dir, remove_file as sync_remove_file};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use time::UtcDateTime;
use tokio::fs::{self, DirEntry};

const BLOB_EXTENSION: &str = "blob";
const SIDECAR_EXTENSION: &str = "json";
/// Writes land here first and are renamed into place once complete.
const PARTIAL_DIR: &str = ".partial";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Sidecar {
    key: String,
    size: u64,
    last_accessed_ms: i64,
}
impl Sidecar {
    fn new(key: &str, size: u64) -> Self {
        Self {
            key: key.to_string(),
            size,
            last_accessed_ms: now_ms(),
        }
    }

    fn info(&self, path: &Path) -> Result<BlobInfo> {
        let nanos = i128::from(self.last_accessed_ms) * 1_000_000;
        let last_accessed = UtcDateTime::from_unix_timestamp_nanos(nanos)
            .or_raise(|| ErrorKind::CorruptMetadata(path.to_path_buf()))?;
        Ok(BlobInfo::new(&self.key, self.size, last_accessed))
    }
}

fn now_ms() -> i64 {
    // Millisecond precision fits an i64 for the next few hundred million years.
    i64::try_from(UtcDateTime::now().unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

enum Listed {
    Entry(BlobInfo),
    Skip,
}

/// Local filesystem blob store.
///
/// # Examples
///
/// ```no_run
/// use marquee_storage::LocalBlobStore;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = LocalBlobStore::new("media", "/var/cache/marquee/media")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct LocalBlobStore {
    name: String,
    /// Directory holding blobs and sidecars
    root: PathBuf,
    /// Makes partial filenames unique between concurrent writers.
    partial_seq: AtomicU64,
}
impl LocalBlobStore {
    /// Open (or create) a blob store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, exists but isn't a
    /// directory, or cannot be created.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidRoot(root));
        }
        if root.exists() && !root.is_dir() {
            exn::bail!(ErrorKind::InvalidRoot(root));
        }
        // Use non-async here; it'll only happen once per session and it's not
        // worth the hassle of making the constructor async.
        let partial = root.join(PARTIAL_DIR);
        sync_create_dir(&partial).map_err(|e| Self::map_io_error(e, &partial))?;
        Self::sweep_partials(&partial);
        Ok(Self {
            name: name.into(),
            root,
            partial_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove writes that never completed, e.g. because the player was
    /// killed halfway through a download.
    fn sweep_partials(partial: &Path) {
        let Ok(entries) = sync_read_dir(partial) else {
            return;
        };
        for entry in entries.flatten() {
            if let Err(e) = sync_remove_file(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "Could not remove partial blob");
            }
        }
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.{BLOB_EXTENSION}"))
    }

    fn sidecar_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.{SIDECAR_EXTENSION}"))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::StorageFull => ErrorKind::StorageFull(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Write `data` to a partial file, then rename it over `target`. Renames
    /// within one directory tree are atomic, so readers never see half a file.
    async fn write_atomic(&self, target: &Path, data: &[u8]) -> Result<()> {
        let seq = self.partial_seq.fetch_add(1, Ordering::Relaxed);
        let file_name = target.file_name().and_then(|n| n.to_str()).unwrap_or("blob");
        let partial = self.root.join(PARTIAL_DIR).join(format!("{file_name}.{}.{seq}", std::process::id()));
        if let Err(e) = fs::write(&partial, data).await {
            _ = fs::remove_file(&partial).await;
            exn::bail!(Self::map_io_error(e, &partial));
        }
        if let Err(e) = fs::rename(&partial, target).await {
            _ = fs::remove_file(&partial).await;
            exn::bail!(Self::map_io_error(e, target));
        }
        Ok(())
    }

    async fn read_sidecar(&self, path: &Path) -> Result<Option<Sidecar>> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => exn::bail!(Self::map_io_error(e, path)),
        };
        let sidecar = serde_json::from_slice(&raw).or_raise(|| ErrorKind::CorruptMetadata(path.to_path_buf()))?;
        Ok(Some(sidecar))
    }

    async fn write_sidecar(&self, path: &Path, sidecar: &Sidecar) -> Result<()> {
        let raw = serde_json::to_vec(sidecar).or_raise(|| ErrorKind::CorruptMetadata(path.to_path_buf()))?;
        self.write_atomic(path, &raw).await
    }

    /// Sidecar for `key`, ignoring a (vanishingly unlikely) digest collision.
    async fn lookup(&self, key: &str) -> Result<Option<(String, Sidecar)>> {
        let digest = digest(validate_key(key)?);
        let sidecar = self.read_sidecar(&self.sidecar_path(&digest)).await?;
        Ok(sidecar.filter(|s| s.key == key).map(|s| (digest, s)))
    }

    async fn blob_exists(path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(|e| exn::Exn::from(Self::map_io_error(e, path)))
    }

    /// Record an access to the entry `seen` describes.
    ///
    /// Only rewrites a sidecar that is still the one `get` read, so a `delete`
    /// or `put` that landed in the meantime wins over the access time.
    async fn touch(&self, digest: &str, seen: &Sidecar) -> Result<()> {
        let sidecar_path = self.sidecar_path(digest);
        if self.read_sidecar(&sidecar_path).await?.as_ref() != Some(seen) {
            return Ok(());
        }
        let blob_path = self.blob_path(digest);
        if !Self::blob_exists(&blob_path).await? {
            return Ok(());
        }
        let touched = Sidecar {
            last_accessed_ms: now_ms(),
            ..seen.clone()
        };
        self.write_sidecar(&sidecar_path, &touched).await?;
        // A delete between the check and the write removed the blob; drop the
        // sidecar that would otherwise point at nothing.
        if !Self::blob_exists(&blob_path).await? {
            Self::remove_if_present(&sidecar_path).await?;
        }
        Ok(())
    }

    async fn process_entry(&self, entry: DirEntry) -> Result<Listed> {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXTENSION) {
            return Ok(Listed::Skip);
        }
        match self.read_sidecar(&path).await {
            Ok(Some(sidecar)) => {
                // A sidecar left behind by a delete that raced an access.
                if !Self::blob_exists(&path.with_extension(BLOB_EXTENSION)).await? {
                    return Ok(Listed::Skip);
                }
                Ok(Listed::Entry(sidecar.info(&path)?))
            },
            // Deleted between listing and reading.
            Ok(None) => Ok(Listed::Skip),
            Err(e) if matches!(&*e, ErrorKind::CorruptMetadata(_)) => {
                tracing::warn!(store = %self.name, path = %path.display(), "Skipping blob with unreadable metadata");
                Ok(Listed::Skip)
            },
            Err(e) => Err(e),
        }
    }

    async fn remove_if_present(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => exn::bail!(Self::map_io_error(e, path)),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let Some((digest, sidecar)) = self.lookup(key).await? else {
            exn::bail!(ErrorKind::NotFound(key.to_string()));
        };
        let data = match fs::read(self.blob_path(&digest)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => exn::bail!(ErrorKind::NotFound(key.to_string())),
            Err(e) => exn::bail!(Self::map_io_error(e, &self.blob_path(&digest))),
        };
        // A failed touch only costs eviction accuracy, never the read.
        if let Err(e) = self.touch(&digest, &sidecar).await {
            tracing::debug!(store = %self.name, key, error = ?e, "Could not update blob access time");
        }
        Ok(data)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        match self.lookup(key).await? {
            Some((digest, _)) => Self::blob_exists(&self.blob_path(&digest)).await,
            None => Ok(false),
        }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let digest = digest(validate_key(key)?);
        self.write_atomic(&self.blob_path(&digest), data).await?;
        let sidecar = Sidecar::new(key, data.len() as u64);
        self.write_sidecar(&self.sidecar_path(&digest), &sidecar).await?;
        tracing::trace!(store = %self.name, key, bytes = data.len(), "Stored blob");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let digest = digest(validate_key(key)?);
        Self::remove_if_present(&self.sidecar_path(&digest)).await?;
        Self::remove_if_present(&self.blob_path(&digest)).await
    }

    fn entries_stream(&self) -> BlobInfoStream<'_> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(e) => {
                    yield Err(exn::Exn::from(Self::map_io_error(e, &self.root)));
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &self.root))); continue; },
                };
                match self.process_entry(entry).await {
                    Ok(Listed::Entry(info)) => yield Ok(info),
                    Ok(Listed::Skip) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    /// Removes orphaned blobs too, not just the ones with sidecars.
    async fn clear(&self) -> Result<()> {
        let mut entries = fs::read_dir(&self.root).await.map_err(|e| Self::map_io_error(e, &self.root))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Self::map_io_error(e, &self.root))? {
            let path = entry.path();
            let ours = matches!(path.extension().and_then(|e| e.to_str()), Some(BLOB_EXTENSION | SIDECAR_EXTENSION));
            if ours {
                Self::remove_if_present(&path).await?;
            }
        }
        tracing::info!(store = %self.name, "Blob store cleared");
        Ok(())
    }
}
