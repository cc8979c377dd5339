//! Deciding what a screen shows.
//!
//! A [`Reconciler`] holds the collaborators (backend, snapshot store, blob
//! store, fetcher) and starts one [`Session`] per screen. A session runs four
//! independent tasks:
//!
//! - **seed**: loads the last stored snapshot, so there is something to play
//!   while the backend is slow or gone.
//! - **poll**: asks the backend for the screen's assignment every poll
//!   interval, prefetches its media, stores the result and commits it.
//! - **heartbeat**: tells the backend the screen is alive.
//! - **render**: advances playback through the committed snapshot.
//!
//! The tasks only share the [`PlayerState`] watch channel. Commits replace
//! the state atomically, so when two fetches overlap the one that completes
//! last wins.

use crate::error::{Error, ErrorKind, Result};
use crate::fetch::FetcherHandle;
use crate::prefetch::Prefetcher;
use crate::remote::RemoteHandle;
use crate::render::render_loop;
use crate::settings::Settings;
use crate::state::{Connectivity, Notice, NowPlaying, Phase, PlayerState};
use exn::ResultExt;
use marquee_cache::SnapshotHandle;
use marquee_model::{MediaItem, PlayerKey, PlaylistSnapshot};
use marquee_storage::BlobHandle;
use std::future::Future;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tracing::Instrument;

/// Starts playback sessions. Cheap to keep around; holds only handles.
pub struct Reconciler {
    remote: RemoteHandle,
    snapshots: SnapshotHandle,
    prefetcher: Arc<Prefetcher>,
    settings: Settings,
}

impl Reconciler {
    pub fn new(
        remote: RemoteHandle,
        snapshots: SnapshotHandle,
        blobs: BlobHandle,
        fetcher: FetcherHandle,
        settings: Settings,
    ) -> Self {
        let prefetcher = Prefetcher::new(blobs, fetcher, settings.max_cache_bytes)
            .with_concurrency(settings.prefetch_concurrency)
            .with_retry(settings.retry);
        Self {
            remote,
            snapshots,
            prefetcher: Arc::new(prefetcher),
            settings,
        }
    }

    /// Start playing for the screen identified by `player_key`.
    ///
    /// Must be called from within a Tokio runtime. A malformed key yields a
    /// session stuck in [`Phase::Error`] that never contacts the backend.
    pub fn start(&self, player_key: &str) -> Session {
        let inner = Arc::new(Inner {
            remote: self.remote.clone(),
            snapshots: self.snapshots.clone(),
            prefetcher: self.prefetcher.clone(),
            settings: self.settings.clone(),
            state: Arc::new(watch::Sender::new(PlayerState::default())),
        });
        let mut tasks = JoinSet::new();
        let parsed = PlayerKey::parse(player_key).or_raise(|| ErrorKind::InvalidIdentity(player_key.to_string()));
        let player = match parsed {
            Ok(player) => player,
            Err(err) => {
                tracing::error!(error = ?err, "Refusing to start playback");
                inner.state.send_modify(|state| {
                    state.phase = Phase::Error;
                    state.notice = Some(Notice::InvalidIdentity(player_key.to_string()));
                });
                return Session { player: None, inner, tasks };
            }
        };
        tracing::info!(player = %player, "Starting playback session");
        let span = tracing::info_span!("session", player = %player);
        tasks.spawn(inner.clone().seed(player.clone()).instrument(span.clone()));
        tasks.spawn(inner.clone().poll_loop(player.clone()).instrument(span.clone()));
        tasks.spawn(inner.clone().heartbeat_loop(player.clone()).instrument(span.clone()));
        tasks.spawn(render_loop(inner.state.clone()).instrument(span));
        Session {
            player: Some(player),
            inner,
            tasks,
        }
    }
}

/// A running playback session for one screen.
///
/// Dropping the session (or calling [`shutdown()`](Self::shutdown)) stops
/// every task it started. Downloads in flight are abandoned; blobs already
/// written stay valid for the next session.
pub struct Session {
    player: Option<PlayerKey>,
    inner: Arc<Inner>,
    tasks: JoinSet<()>,
}

impl Session {
    /// `None` if the session was started with a malformed key.
    pub fn player(&self) -> Option<&PlayerKey> {
        self.player.as_ref()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerState> {
        self.inner.state.subscribe()
    }

    pub fn state(&self) -> PlayerState {
        self.inner.state.borrow().clone()
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.inner.state.borrow().now_playing()
    }

    /// Cached content of `media`, for whatever is drawing the screen.
    pub async fn media_bytes(&self, media: &MediaItem) -> Result<Vec<u8>> {
        self.inner.prefetcher.store().get(&media.url).await.or_raise(|| ErrorKind::Storage)
    }

    /// Refresh the assignment now instead of waiting for the next poll. May
    /// run alongside a scheduled poll.
    pub async fn refresh(&self) -> Phase {
        match &self.player {
            Some(player) => self.inner.sync(player).await,
            None => Phase::Error,
        }
    }

    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
        tracing::info!("Playback session ended");
    }
}

struct Inner {
    remote: RemoteHandle,
    snapshots: SnapshotHandle,
    prefetcher: Arc<Prefetcher>,
    settings: Settings,
    state: Arc<watch::Sender<PlayerState>>,
}

impl Inner {
    async fn seed(self: Arc<Self>, player: PlayerKey) {
        let stored = match self.snapshots.load(&player).await {
            Ok(Some(stored)) if !stored.snapshot.is_empty() => stored,
            Ok(_) => {
                tracing::debug!("No stored snapshot to start from");
                return;
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Could not load stored snapshot");
                return;
            }
        };
        let playlist = stored.snapshot.playlist_id.clone();
        let stale = stored.stale;
        let applied = self.state.send_if_modified(|state| {
            // Anything the backend said wins over what was stored.
            if state.remote_answered || state.snapshot.is_some() {
                return false;
            }
            state.replace_snapshot(Some(stored.snapshot));
            state.stale = stale;
            if state.connectivity == Connectivity::Offline {
                state.phase = Phase::Degraded;
            }
            true
        });
        if applied {
            tracing::info!(playlist = %playlist, stale, "Playing stored snapshot");
        }
    }

    async fn poll_loop(self: Arc<Self>, player: PlayerKey) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sync(&player).await;
        }
    }

    async fn heartbeat_loop(self: Arc<Self>, player: PlayerKey) {
        let mut ticker = interval(self.settings.heartbeat_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.call(self.remote.report_heartbeat(&player, UtcDateTime::now())).await {
                Ok(()) => tracing::trace!("Heartbeat sent"),
                Err(err) => tracing::debug!(error = ?err, "Heartbeat failed"),
            }
        }
    }

    /// One full refresh cycle. Returns the phase afterwards.
    async fn sync(&self, player: &PlayerKey) -> Phase {
        match self.resolve(player).await {
            Ok(Some(snapshot)) => self.commit(player, snapshot).await,
            Ok(None) => self.commit_unassigned(player).await,
            Err(err) => self.record_failure(err),
        }
        self.state.borrow().phase
    }

    /// Ask the backend what to play, and get its media on disk. `None` means
    /// nothing is assigned.
    async fn resolve(&self, player: &PlayerKey) -> Result<Option<PlaylistSnapshot>> {
        let assignment = self.call(self.remote.assignment(player)).await?;
        let Some(playlist_id) = assignment.playlist_id else {
            tracing::info!("No playlist assigned to this screen");
            return Ok(None);
        };
        let Some(playlist) = self.call(self.remote.playlist(&playlist_id)).await? else {
            tracing::warn!(playlist = %playlist_id, "Assigned playlist no longer exists");
            return Ok(None);
        };
        let ids = playlist.media_ids();
        let media: Vec<MediaItem> =
            self.call(self.remote.media_records(&ids)).await?.into_iter().filter(|m| ids.contains(&m.id)).collect();
        for id in ids.iter().filter(|id| !media.iter().any(|m| &m.id == *id)) {
            tracing::warn!(playlist = %playlist.id, media = %id, "Playlist references unknown media, skipping it");
        }
        let report = self.prefetcher.ensure_available(&media).await;
        Ok(Some(PlaylistSnapshot::resolve(
            playlist.id,
            playlist.items,
            media,
            &report.ready,
            UtcDateTime::now(),
        )))
    }

    async fn commit(&self, player: &PlayerKey, snapshot: PlaylistSnapshot) {
        if let Err(err) = self.snapshots.save(player, &snapshot).await {
            tracing::warn!(error = ?err, "Could not store snapshot, keeping it in memory only");
        }
        let playlist = snapshot.playlist_id.clone();
        let items = snapshot.len();
        let now = UtcDateTime::now();
        let mut restarted = false;
        self.state.send_modify(|state| {
            let epoch = state.epoch;
            state.remote_answered = true;
            state.mark_online(now);
            state.stale = false;
            state.replace_snapshot(Some(snapshot));
            state.phase = if state.snapshot.is_some() { Phase::Synced } else { Phase::Empty };
            restarted = state.epoch != epoch;
        });
        if restarted {
            tracing::info!(playlist = %playlist, items, "Playing updated playlist");
        } else {
            tracing::debug!(playlist = %playlist, items, "Playlist unchanged");
        }
    }

    async fn commit_unassigned(&self, player: &PlayerKey) {
        if let Err(err) = self.snapshots.clear(player).await {
            tracing::warn!(error = ?err, "Could not clear stored snapshot");
        }
        let now = UtcDateTime::now();
        self.state.send_modify(|state| {
            state.remote_answered = true;
            state.mark_online(now);
            state.stale = false;
            state.replace_snapshot(None);
            state.phase = Phase::Empty;
        });
    }

    fn record_failure(&self, err: Error) {
        tracing::warn!(error = ?err, "Could not refresh assignment");
        let now = Instant::now();
        let escalation = self.settings.offline_escalation;
        let mut escalated = None;
        self.state.send_modify(|state| {
            if state.connectivity == Connectivity::Online {
                state.connectivity = Connectivity::Offline;
                state.offline_since = Some(UtcDateTime::now());
                state.failing_since = Some(now);
            }
            state.phase = if state.snapshot.is_some() { Phase::Degraded } else { Phase::Empty };
            if state.offline_indicator {
                return;
            }
            if let (Some(started), Some(since)) = (state.failing_since, state.offline_since)
                && now.duration_since(started) >= escalation
            {
                state.offline_indicator = true;
                state.notice = Some(Notice::Offline { since });
                escalated = Some(since);
            }
        });
        if let Some(since) = escalated {
            tracing::warn!(%since, "Backend unreachable for too long, showing offline indicator");
        }
    }

    /// Run a backend call with the per-call timeout.
    async fn call<T>(&self, request: impl Future<Output = Result<T>>) -> Result<T> {
        match timeout(self.settings.remote_timeout, request).await {
            Ok(result) => result,
            Err(_) => exn::bail!(ErrorKind::Timeout(self.settings.remote_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Playlist;
    use crate::testing::{Behaviour, FailingSnapshots, FakeFetcher, FakeRemote, image, key, snapshot};
    use marquee_cache::{MemorySnapshotStore, SnapshotStore};
    use marquee_model::PlaylistItem;
    use marquee_storage::MemoryBlobStore;
    use std::time::Duration;
    use tokio::time::sleep;

    const PLAYER: &str = "lobby-screen";

    struct Harness {
        remote: Arc<FakeRemote>,
        snapshots: Arc<MemorySnapshotStore>,
        fetcher: Arc<FakeFetcher>,
    }

    impl Harness {
        fn new(remote: FakeRemote) -> Self {
            Self {
                remote: Arc::new(remote),
                snapshots: Arc::new(MemorySnapshotStore::default()),
                fetcher: Arc::new(FakeFetcher::default()),
            }
        }

        fn with_stored(mut self, snapshot: PlaylistSnapshot) -> Self {
            self.snapshots = Arc::new(MemorySnapshotStore::with_snapshot(key(PLAYER), snapshot));
            self
        }

        fn with_fetcher(mut self, fetcher: FakeFetcher) -> Self {
            self.fetcher = Arc::new(fetcher);
            self
        }

        fn start(&self) -> Session {
            self.start_with(self.snapshots.clone())
        }

        fn start_with(&self, snapshots: SnapshotHandle) -> Session {
            Reconciler::new(
                self.remote.clone(),
                snapshots,
                Arc::new(MemoryBlobStore::default()),
                self.fetcher.clone(),
                Settings::default(),
            )
            .start(PLAYER)
        }
    }

    async fn wait_until(session: &Session, condition: impl FnMut(&PlayerState) -> bool) -> PlayerState {
        let mut rx = session.subscribe();
        let state = timeout(Duration::from_secs(3 * 60 * 60), rx.wait_for(condition))
            .await
            .expect("condition not reached in time")
            .expect("session state closed")
            .clone();
        state
    }

    fn lobby() -> (Playlist, Vec<MediaItem>) {
        let playlist = Playlist::new(
            "lobby",
            vec![PlaylistItem::new("a", 5), PlaylistItem::new("b", 10), PlaylistItem::new("c", 5)],
        );
        (playlist, vec![image("a", 5), image("b", 10), image("c", 5)])
    }

    fn media_ids(state: &PlayerState) -> Vec<String> {
        state.snapshot.as_ref().map(|s| s.items.iter().map(|i| i.media_id.clone()).collect()).unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    async fn test_syncs_and_cycles_through_items() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media));
        let session = harness.start();
        let synced = wait_until(&session, |s| s.phase == Phase::Synced).await;
        assert_eq!(synced.current_index, 0);
        assert_eq!(media_ids(&synced), ["a", "b", "c"]);
        assert!(harness.snapshots.load(&key(PLAYER)).await.unwrap().is_some());

        // Three full loops, straight through two scheduled polls.
        let start = Instant::now();
        let expected = [(1, 5), (2, 15), (0, 20), (1, 25), (2, 35), (0, 40), (1, 45), (2, 55), (0, 60)];
        for (n, (index, at)) in expected.into_iter().enumerate() {
            let state = wait_until(&session, |s| s.advanced > n as u64).await;
            assert_eq!(state.current_index, index, "advance {n}");
            assert_eq!(start.elapsed(), Duration::from_secs(at), "advance {n}");
        }
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_with_same_playlist_keeps_position() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media));
        let session = harness.start();
        wait_until(&session, |s| s.phase == Phase::Synced).await;
        wait_until(&session, |s| s.current_index == 1).await;
        assert_eq!(session.refresh().await, Phase::Synced);
        assert_eq!(session.state().current_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_with_new_playlist_restarts() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media.clone()));
        let session = harness.start();
        wait_until(&session, |s| s.current_index == 1).await;
        harness.remote.publish(
            Playlist::new("foyer", vec![PlaylistItem::new("c", 5), PlaylistItem::new("a", 5)]),
            media,
        );
        assert_eq!(session.refresh().await, Phase::Synced);
        let state = session.state();
        assert_eq!(state.playlist_id(), Some("foyer"));
        assert_eq!(state.current_index, 0);
        assert_eq!(session.now_playing().unwrap().media.id, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_degraded_through_repeated_failures() {
        let stored = snapshot("lobby", &[("a", 10), ("b", 10)]);
        let harness = Harness::new(FakeRemote::offline()).with_stored(stored.clone());
        let session = harness.start();
        wait_until(&session, |s| s.phase == Phase::Degraded).await;
        while harness.remote.assignment_calls() < 5 {
            sleep(Duration::from_secs(1)).await;
        }
        let state = session.state();
        assert_eq!(state.phase, Phase::Degraded);
        assert_eq!(state.connectivity, Connectivity::Offline);
        assert_eq!(state.snapshot.as_deref(), Some(&stored));
        assert!(state.advanced > 0);
        assert!(!state.offline_indicator);
        assert!(state.notice.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_indicator_only_after_threshold() {
        let harness = Harness::new(FakeRemote::offline()).with_stored(snapshot("lobby", &[("a", 10)]));
        let start = Instant::now();
        let session = harness.start();
        sleep(Duration::from_secs(29 * 60)).await;
        assert!(!session.state().offline_indicator);

        let state = wait_until(&session, |s| s.offline_indicator).await;
        assert!(start.elapsed() >= Duration::from_secs(30 * 60));
        assert!(start.elapsed() <= Duration::from_secs(31 * 60));
        assert!(matches!(state.notice, Some(Notice::Offline { .. })));
        assert_eq!(state.phase, Phase::Degraded);

        let (playlist, media) = lobby();
        harness.remote.publish(playlist, media);
        harness.remote.set_online(true);
        let state = wait_until(&session, |s| s.phase == Phase::Synced).await;
        assert!(!state.offline_indicator);
        assert!(state.notice.is_none());
        assert_eq!(state.connectivity, Connectivity::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_media_dropped_in_order() {
        let (playlist, mut media) = lobby();
        media.retain(|m| m.id != "b");
        let harness = Harness::new(FakeRemote::serving(playlist, media));
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Synced).await;
        assert_eq!(media_ids(&state), ["a", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undownloadable_media_dropped() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media))
            .with_fetcher(FakeFetcher::default().with(&image("a", 5).url, Behaviour::Missing));
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Synced).await;
        assert_eq!(media_ids(&state), ["b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_then_recovered() {
        let harness = Harness::new(FakeRemote::offline());
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Empty).await;
        assert!(state.snapshot.is_none());

        let (playlist, media) = lobby();
        harness.remote.publish(playlist, media);
        harness.remote.set_online(true);
        let state = wait_until(&session, |s| s.phase == Phase::Synced).await;
        assert_eq!(state.current_index, 0);
        assert_eq!(session.now_playing().unwrap().media.id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_key_never_calls_backend() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media));
        let session = Reconciler::new(
            harness.remote.clone(),
            harness.snapshots.clone(),
            Arc::new(MemoryBlobStore::default()),
            harness.fetcher.clone(),
            Settings::default(),
        )
        .start("not a valid key!");
        let state = session.state();
        assert_eq!(state.phase, Phase::Error);
        assert_eq!(state.notice, Some(Notice::InvalidIdentity("not a valid key!".to_string())));
        assert!(session.player().is_none());

        sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(harness.remote.total_calls(), 0);
        assert_eq!(session.state().phase, Phase::Error);
        assert_eq!(session.refresh().await, Phase::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unassigned_clears_stored_snapshot() {
        let harness = Harness::new(FakeRemote::default()).with_stored(snapshot("lobby", &[("a", 10)]));
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Empty).await;
        assert!(state.snapshot.is_none());
        assert_eq!(state.connectivity, Connectivity::Online);
        assert!(harness.snapshots.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_playlist_counts_as_unassigned() {
        let harness = Harness::new(FakeRemote::default()).with_stored(snapshot("lobby", &[("a", 10)]));
        harness.remote.assign("deleted-playlist");
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Empty).await;
        assert!(state.snapshot.is_none());
        assert!(harness.snapshots.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_without_playable_items_is_empty() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media))
            .with_fetcher(FakeFetcher::default().with_default(Behaviour::Missing));
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Empty).await;
        assert!(state.snapshot.is_none());
        assert_eq!(state.connectivity, Connectivity::Online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_still_plays() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media));
        let session = harness.start_with(Arc::new(FailingSnapshots));
        let state = wait_until(&session, |s| s.phase == Phase::Synced).await;
        assert_eq!(media_ids(&state), ["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_seed_is_flagged_but_played() {
        let mut stored = snapshot("lobby", &[("a", 10)]);
        stored.captured_at -= time::Duration::hours(25);
        let harness = Harness::new(FakeRemote::offline()).with_stored(stored);
        let session = harness.start();
        let state = wait_until(&session, |s| s.phase == Phase::Degraded).await;
        assert!(state.stale);
        assert_eq!(state.playlist_id(), Some("lobby"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_answer_beats_stored_snapshot() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media)).with_stored(snapshot("old", &[("z", 10)]));
        let session = harness.start();
        wait_until(&session, |s| s.phase == Phase::Synced).await;
        // A late store read must not undo the backend's answer.
        session.inner.clone().seed(key(PLAYER)).await;
        let state = session.state();
        assert_eq!(state.playlist_id(), Some("lobby"));
        assert!(!state.stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_backend_times_out() {
        let harness = Harness::new(FakeRemote::default()).with_stored(snapshot("lobby", &[("a", 10)]));
        harness.remote.set_hanging(true);
        let start = Instant::now();
        let session = harness.start();
        wait_until(&session, |s| s.phase == Phase::Degraded).await;
        assert_eq!(start.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_independent_of_sync() {
        let harness = Harness::new(FakeRemote::offline()).with_stored(snapshot("lobby", &[("a", 10)]));
        let session = harness.start();
        sleep(Duration::from_secs(5 * 60 + 1)).await;
        // Ticks at 0, 60, ... 300 seconds, failing or not.
        assert_eq!(harness.remote.heartbeats(), 6);
        assert_eq!(session.state().phase, Phase::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_bytes_from_cache() {
        let (playlist, media) = lobby();
        let harness =
            Harness::new(FakeRemote::serving(playlist, media)).with_fetcher(FakeFetcher::default().with_size(32));
        let session = harness.start();
        wait_until(&session, |s| s.phase == Phase::Synced).await;
        let playing = session.now_playing().unwrap();
        assert_eq!(session.media_bytes(&playing.media).await.unwrap().len(), 32);
        let missing = image("nope", 5);
        let err = session.media_bytes(&missing).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Storage));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_everything() {
        let (playlist, media) = lobby();
        let harness = Harness::new(FakeRemote::serving(playlist, media));
        let session = harness.start();
        wait_until(&session, |s| s.phase == Phase::Synced).await;
        let mut rx = session.subscribe();
        session.shutdown().await;
        rx.borrow_and_update();
        let calls = harness.remote.total_calls();
        sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(harness.remote.total_calls(), calls);
        assert!(rx.changed().await.is_err());
    }
}
