//! Fakes for driving the player without a network.

use crate::error::{ErrorKind, Result};
use crate::fetch::MediaFetcher;
use crate::remote::{Assignment, Playlist, RemoteSource};
use async_trait::async_trait;
use futures::Stream;
use marquee_cache::{SnapshotStore, StoredSnapshot};
use marquee_model::{MediaItem, MediaKind, PlayerKey, PlaylistItem, PlaylistSnapshot};
use marquee_storage::{BlobInfo, BlobStore, MemoryBlobStore};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use time::UtcDateTime;

pub(crate) fn key(raw: &str) -> PlayerKey {
    PlayerKey::parse(raw).unwrap()
}

pub(crate) fn image(id: &str, duration: u32) -> MediaItem {
    MediaItem::new(id, format!("https://cdn.example/{id}.png"), MediaKind::Image, duration)
}

/// A snapshot where every item's media resolved.
pub(crate) fn snapshot(playlist_id: &str, items: &[(&str, u32)]) -> PlaylistSnapshot {
    let media: Vec<MediaItem> = items.iter().map(|(id, duration)| image(id, *duration)).collect();
    let ready: HashSet<String> = media.iter().map(|m| m.id.clone()).collect();
    PlaylistSnapshot::resolve(
        playlist_id,
        items.iter().map(|(id, duration)| PlaylistItem::new(*id, *duration)),
        media,
        &ready,
        UtcDateTime::now(),
    )
}

#[derive(Default)]
struct Script {
    offline: bool,
    hanging: bool,
    assigned: Option<String>,
    playlists: HashMap<String, Playlist>,
    media: HashMap<String, MediaItem>,
}

/// Scriptable backend. Online and unassigned by default.
#[derive(Default)]
pub(crate) struct FakeRemote {
    script: Mutex<Script>,
    assignment_calls: AtomicUsize,
    heartbeats: AtomicUsize,
    total_calls: AtomicUsize,
}

impl FakeRemote {
    pub(crate) fn offline() -> Self {
        let remote = Self::default();
        remote.set_online(false);
        remote
    }

    pub(crate) fn serving(playlist: Playlist, media: Vec<MediaItem>) -> Self {
        let remote = Self::default();
        remote.publish(playlist, media);
        remote
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.script.lock().unwrap().offline = !online;
    }

    /// Every call from now on never completes.
    pub(crate) fn set_hanging(&self, hanging: bool) {
        self.script.lock().unwrap().hanging = hanging;
    }

    /// Assign `playlist` to the screen, along with its media records.
    pub(crate) fn publish(&self, playlist: Playlist, media: Vec<MediaItem>) {
        let mut script = self.script.lock().unwrap();
        script.assigned = Some(playlist.id.clone());
        script.media.extend(media.into_iter().map(|m| (m.id.clone(), m)));
        script.playlists.insert(playlist.id.clone(), playlist);
    }

    /// Assign a playlist id without publishing the playlist itself.
    pub(crate) fn assign(&self, playlist_id: &str) {
        self.script.lock().unwrap().assigned = Some(playlist_id.to_string());
    }

    pub(crate) fn assignment_calls(&self) -> usize {
        self.assignment_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    async fn answer(&self) -> Result<()> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let (offline, hanging) = {
            let script = self.script.lock().unwrap();
            (script.offline, script.hanging)
        };
        if hanging {
            std::future::pending::<()>().await;
        }
        if offline {
            exn::bail!(ErrorKind::TransientNetwork("backend unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn assignment(&self, _player: &PlayerKey) -> Result<Assignment> {
        self.assignment_calls.fetch_add(1, Ordering::SeqCst);
        self.answer().await?;
        Ok(Assignment {
            playlist_id: self.script.lock().unwrap().assigned.clone(),
        })
    }

    async fn playlist(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        self.answer().await?;
        Ok(self.script.lock().unwrap().playlists.get(playlist_id).cloned())
    }

    async fn media_records(&self, ids: &[String]) -> Result<Vec<MediaItem>> {
        self.answer().await?;
        let script = self.script.lock().unwrap();
        Ok(ids.iter().filter_map(|id| script.media.get(id).cloned()).collect())
    }

    async fn report_heartbeat(&self, _player: &PlayerKey, _at: UtcDateTime) -> Result<()> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        self.answer().await
    }
}

/// How [`FakeFetcher`] answers for a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behaviour {
    Serve,
    /// Answers 404.
    Missing,
    /// Every attempt fails with a network error.
    Down,
    /// The first `n` attempts fail with a network error.
    Flaky(u32),
    /// Never answers.
    Hang,
}

pub(crate) struct FakeFetcher {
    behaviours: HashMap<String, Behaviour>,
    default: Behaviour,
    size: usize,
    calls: Mutex<HashMap<String, u32>>,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self {
            behaviours: HashMap::new(),
            default: Behaviour::Serve,
            size: 16,
            calls: Mutex::default(),
        }
    }
}

impl FakeFetcher {
    pub(crate) fn with(mut self, url: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(url.to_string(), behaviour);
        self
    }

    pub(crate) fn with_default(mut self, behaviour: Behaviour) -> Self {
        self.default = behaviour;
        self
    }

    /// Size of every served body.
    pub(crate) fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub(crate) fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.to_string()).or_default();
            *count += 1;
            *count
        };
        match self.behaviours.get(url).copied().unwrap_or(self.default) {
            Behaviour::Serve => Ok(vec![7; self.size]),
            Behaviour::Flaky(failures) if attempt > failures => Ok(vec![7; self.size]),
            Behaviour::Flaky(_) | Behaviour::Down => {
                exn::bail!(ErrorKind::TransientNetwork(format!("connection reset fetching {url}")))
            }
            Behaviour::Missing => exn::bail!(ErrorKind::Resolution(url.to_string())),
            Behaviour::Hang => std::future::pending().await,
        }
    }
}

/// Blob store whose first `fail_puts` writes fail as if the disk were full.
pub(crate) struct FlakyBlobStore {
    inner: MemoryBlobStore,
    remaining: AtomicU32,
    failed: AtomicU32,
}

impl FlakyBlobStore {
    pub(crate) fn new(inner: MemoryBlobStore, fail_puts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(fail_puts),
            failed: AtomicU32::new(0),
        }
    }

    pub(crate) fn failed_puts(&self) -> u32 {
        self.failed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn get(&self, key: &str) -> marquee_storage::error::Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn contains(&self, key: &str) -> marquee_storage::error::Result<bool> {
        self.inner.contains(key).await
    }

    async fn put(&self, key: &str, data: &[u8]) -> marquee_storage::error::Result<()> {
        let fail = self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok();
        if fail {
            self.failed.fetch_add(1, Ordering::SeqCst);
            exn::bail!(marquee_storage::error::ErrorKind::StorageFull(PathBuf::from("/cache")));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> marquee_storage::error::Result<()> {
        self.inner.delete(key).await
    }

    fn entries_stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = marquee_storage::error::Result<BlobInfo>> + Send + '_>> {
        self.inner.entries_stream()
    }
}

/// Snapshot store that fails every operation.
pub(crate) struct FailingSnapshots;

#[async_trait]
impl SnapshotStore for FailingSnapshots {
    async fn save(&self, _player: &PlayerKey, _snapshot: &PlaylistSnapshot) -> marquee_cache::error::Result<()> {
        exn::bail!(marquee_cache::error::ErrorKind::Database)
    }

    async fn load(&self, _player: &PlayerKey) -> marquee_cache::error::Result<Option<StoredSnapshot>> {
        exn::bail!(marquee_cache::error::ErrorKind::Database)
    }

    async fn clear(&self, _player: &PlayerKey) -> marquee_cache::error::Result<()> {
        exn::bail!(marquee_cache::error::ErrorKind::Database)
    }
}
