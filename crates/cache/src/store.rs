use crate::error::Result;
use async_trait::async_trait;
use marquee_model::{PlayerKey, PlaylistSnapshot};
use time::{Duration, UtcDateTime};

/// How old a snapshot may get before it is flagged as stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::hours(24);

/// A snapshot as read back from a [`SnapshotStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub snapshot: PlaylistSnapshot,
    /// When the snapshot was written to the store.
    pub saved_at: UtcDateTime,
    /// Whether the snapshot was captured longer ago than the store's
    /// staleness ceiling. Stale snapshots are still returned; the player
    /// decides what to do with them.
    pub stale: bool,
}

/// Whether a snapshot captured at `captured_at` is past `ceiling` at `now`.
///
/// ```
/// use marquee_cache::is_stale;
/// use time::{Duration, UtcDateTime};
///
/// let now = UtcDateTime::now();
/// assert!(is_stale(now - Duration::hours(25), now, Duration::hours(24)));
/// assert!(!is_stale(now - Duration::hours(1), now, Duration::hours(24)));
/// ```
pub fn is_stale(captured_at: UtcDateTime, now: UtcDateTime, ceiling: Duration) -> bool {
    now - captured_at > ceiling
}

/// Durable mapping from a player key to its last-known-good playlist.
///
/// Exactly one snapshot is kept per player; saving overwrites.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `snapshot` as the latest for `player`, replacing any previous one.
    async fn save(&self, player: &PlayerKey, snapshot: &PlaylistSnapshot) -> Result<()>;

    /// Latest snapshot for `player`, if any.
    async fn load(&self, player: &PlayerKey) -> Result<Option<StoredSnapshot>>;

    /// Forget the snapshot for `player`. Not an error if there is none.
    async fn clear(&self, player: &PlayerKey) -> Result<()>;
}
