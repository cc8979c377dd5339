//! What the player is doing right now.

use derive_more::Display;
use marquee_model::{MediaItem, PlaylistItem, PlaylistSnapshot};
use std::sync::Arc;
use time::UtcDateTime;
use tokio::time::Instant;

/// Coarse state of a playback session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum Phase {
    /// Waiting for the first answer from the backend or the snapshot store.
    #[default]
    #[display("initializing")]
    Initializing,
    /// Playing what the backend most recently said to play.
    #[display("synced")]
    Synced,
    /// The backend is unreachable; playing the last known snapshot.
    #[display("degraded")]
    Degraded,
    /// Nothing to play.
    #[display("empty")]
    Empty,
    /// The session cannot run at all. Terminal.
    #[display("error")]
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display)]
pub enum Connectivity {
    #[default]
    #[display("online")]
    Online,
    #[display("offline")]
    Offline,
}

/// Something worth showing on screen, on top of (or instead of) content.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Notice {
    #[display("Invalid player key: {_0:?}")]
    InvalidIdentity(String),
    #[display("Offline since {since}")]
    Offline { since: UtcDateTime },
}

/// The item currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub index: usize,
    pub item: PlaylistItem,
    pub media: MediaItem,
}

/// Published state of a playback session. Only the session's own tasks
/// write it; everyone else gets a copy through a watch channel.
#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub phase: Phase,
    pub snapshot: Option<Arc<PlaylistSnapshot>>,
    pub current_index: usize,
    pub connectivity: Connectivity,
    pub last_online_at: Option<UtcDateTime>,
    /// When the current run of failed refreshes started.
    pub offline_since: Option<UtcDateTime>,
    /// Set once the backend has been unreachable for longer than the
    /// escalation threshold.
    pub offline_indicator: bool,
    /// The snapshot being played came from storage and is past the
    /// staleness ceiling.
    pub stale: bool,
    pub notice: Option<Notice>,
    /// Total number of item advances since the session started.
    pub advanced: u64,
    /// Changes whenever playback has to restart from the current index.
    pub(crate) epoch: u64,
    /// Whether the backend has answered at least once, in which case a
    /// snapshot from storage is no longer wanted.
    pub(crate) remote_answered: bool,
    pub(crate) failing_since: Option<Instant>,
}

impl PlayerState {
    pub fn now_playing(&self) -> Option<NowPlaying> {
        let snapshot = self.snapshot.as_ref()?;
        Some(NowPlaying {
            index: self.current_index,
            item: snapshot.item(self.current_index)?.clone(),
            media: snapshot.media_for(self.current_index)?.clone(),
        })
    }

    pub fn playlist_id(&self) -> Option<&str> {
        self.snapshot.as_ref().map(|s| s.playlist_id.as_str())
    }

    /// Replace the snapshot being played. Playback restarts from the first
    /// item unless the new snapshot plays the exact same sequence.
    pub(crate) fn replace_snapshot(&mut self, snapshot: Option<PlaylistSnapshot>) {
        let same = match (&self.snapshot, &snapshot) {
            (Some(current), Some(new)) => current.same_sequence(new),
            (None, None) => true,
            _ => false,
        };
        self.snapshot = snapshot.filter(|s| !s.is_empty()).map(Arc::new);
        if !same {
            self.current_index = 0;
            self.epoch += 1;
        }
    }

    pub(crate) fn mark_online(&mut self, now: UtcDateTime) {
        self.connectivity = Connectivity::Online;
        self.last_online_at = Some(now);
        self.offline_since = None;
        self.failing_since = None;
        self.offline_indicator = false;
        if matches!(self.notice, Some(Notice::Offline { .. })) {
            self.notice = None;
        }
    }
}
