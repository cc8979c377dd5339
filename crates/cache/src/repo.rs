//! SQLite-backed snapshot store.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::SnapshotRow;
use crate::store::{DEFAULT_STALE_AFTER, SnapshotStore, StoredSnapshot, is_stale};
use async_trait::async_trait;
use exn::ResultExt;
use marquee_model::{PlayerKey, PlaylistSnapshot};
use sqlx::SqlitePool;
use time::{Duration, UtcDateTime};
use tracing::instrument;

/// Repository for player snapshots in the cache database.
///
/// One row per player key. Rows survive restarts; that is the whole point.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    stale_after: Duration,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone(), DEFAULT_STALE_AFTER)
    }
}
impl Repository {
    pub fn new(pool: SqlitePool, stale_after: Duration) -> Self {
        Self { pool, stale_after }
    }

    /// Use a different staleness ceiling for snapshots read back.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    async fn save_at(&self, player: &PlayerKey, snapshot: &PlaylistSnapshot, saved_at: UtcDateTime) -> Result<()> {
        let row = SnapshotRow::new(player, snapshot, saved_at)?;
        sqlx::query(include_str!("../queries/upsert_snapshot.sql"))
            .bind(row.player_key)
            .bind(row.playlist_id)
            .bind(row.items)
            .bind(row.resolved_media)
            .bind(row.captured_at)
            .bind(row.saved_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    async fn load_at(&self, player: &PlayerKey, now: UtcDateTime) -> Result<Option<StoredSnapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(include_str!("../queries/get_snapshot.sql"))
            .bind(player.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let saved_at = row.saved_at()?;
        let snapshot = PlaylistSnapshot::try_from(row)?;
        let stale = is_stale(snapshot.captured_at, now, self.stale_after);
        Ok(Some(StoredSnapshot { snapshot, saved_at, stale }))
    }
}

#[async_trait]
impl SnapshotStore for Repository {
    #[instrument(level = "debug", skip(self, snapshot), fields(player = %player, items = snapshot.len()))]
    async fn save(&self, player: &PlayerKey, snapshot: &PlaylistSnapshot) -> Result<()> {
        self.save_at(player, snapshot, UtcDateTime::now()).await
    }

    #[instrument(level = "debug", skip(self), fields(player = %player))]
    async fn load(&self, player: &PlayerKey) -> Result<Option<StoredSnapshot>> {
        let stored = self.load_at(player, UtcDateTime::now()).await?;
        if let Some(stored) = &stored {
            tracing::debug!(
                playlist = %stored.snapshot.playlist_id,
                items = stored.snapshot.len(),
                stale = stored.stale,
                "Loaded stored snapshot"
            );
        }
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self), fields(player = %player))]
    async fn clear(&self, player: &PlayerKey) -> Result<()> {
        sqlx::query(include_str!("../queries/delete_snapshot.sql"))
            .bind(player.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
