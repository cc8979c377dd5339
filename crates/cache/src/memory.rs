//! In-memory snapshot store for testing.

use crate::error::Result;
use crate::store::{DEFAULT_STALE_AFTER, SnapshotStore, StoredSnapshot, is_stale};
use async_trait::async_trait;
use marquee_model::{PlayerKey, PlaylistSnapshot};
use std::collections::HashMap;
use time::{Duration, UtcDateTime};
use tokio::sync::RwLock;

/// In-memory snapshot store for testing.
///
/// Behaves like [`Repository`](crate::Repository) without the database,
/// including the staleness flag.
pub struct MemorySnapshotStore {
    rows: RwLock<HashMap<PlayerKey, (PlaylistSnapshot, UtcDateTime)>>,
    stale_after: Duration,
}
impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self {
            rows: RwLock::default(),
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}
impl MemorySnapshotStore {
    /// Create a store that already holds `snapshot` for `player`.
    pub fn with_snapshot(player: PlayerKey, snapshot: PlaylistSnapshot) -> Self {
        Self {
            rows: RwLock::new(HashMap::from([(player, (snapshot, UtcDateTime::now()))])),
            ..Self::default()
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Number of players with a stored snapshot.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, player: &PlayerKey, snapshot: &PlaylistSnapshot) -> Result<()> {
        self.rows.write().await.insert(player.clone(), (snapshot.clone(), UtcDateTime::now()));
        Ok(())
    }

    async fn load(&self, player: &PlayerKey) -> Result<Option<StoredSnapshot>> {
        let now = UtcDateTime::now();
        Ok(self.rows.read().await.get(player).map(|(snapshot, saved_at)| StoredSnapshot {
            stale: is_stale(snapshot.captured_at, now, self.stale_after),
            snapshot: snapshot.clone(),
            saved_at: *saved_at,
        }))
    }

    async fn clear(&self, player: &PlayerKey) -> Result<()> {
        self.rows.write().await.remove(player);
        Ok(())
    }
}
