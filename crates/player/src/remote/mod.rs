//! The backend the player takes its orders from.
//!
//! Everything the player knows about its assignment comes through
//! [`RemoteSource`], so the reconciler can be driven by a fake in tests and
//! by [`RestRemote`] in production.

mod rest;

pub use self::rest::RestRemote;
use crate::error::Result;
use async_trait::async_trait;
use marquee_model::{MediaItem, PlayerKey, PlaylistItem};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use time::UtcDateTime;

/// Which playlist a screen is supposed to show.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    /// `None` if nothing is assigned (or the screen is unknown).
    pub playlist_id: Option<String>,
}
impl Assignment {
    pub fn playlist(id: impl Into<String>) -> Self {
        Self { playlist_id: Some(id.into()) }
    }

    pub fn unassigned() -> Self {
        Self::default()
    }
}

/// A playlist as the backend stores it: an ordered list of media references.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Playlist {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<PlaylistItem>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<PlaylistItem>, D::Error> {
    Ok(Option::<Vec<PlaylistItem>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Playlist {
    pub fn new(id: impl Into<String>, items: Vec<PlaylistItem>) -> Self {
        Self { id: id.into(), items }
    }

    /// Distinct media ids referenced by the playlist, in first-use order.
    pub fn media_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if !ids.contains(&item.media_id) {
                ids.push(item.media_id.clone());
            }
        }
        ids
    }
}

/// Source of truth for assignments, playlists and media records.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// What the screen identified by `player` should currently show.
    async fn assignment(&self, player: &PlayerKey) -> Result<Assignment>;

    /// A playlist by id, or `None` if it no longer exists.
    async fn playlist(&self, playlist_id: &str) -> Result<Option<Playlist>>;

    /// Media records for the given ids. Unknown ids are simply absent from
    /// the result.
    async fn media_records(&self, ids: &[String]) -> Result<Vec<MediaItem>>;

    /// Tell the backend the screen is alive.
    async fn report_heartbeat(&self, player: &PlayerKey, at: UtcDateTime) -> Result<()>;
}

pub type RemoteHandle = Arc<dyn RemoteSource + Send + Sync>;
