//! Data model for the signage player.
//!
//! Media records and playlists come from the remote backend; a
//! [`PlaylistSnapshot`] is the fully-resolved form the player actually renders
//! and persists between restarts.

pub mod error;
mod key;
mod media;
mod snapshot;

pub use crate::key::PlayerKey;
pub use crate::media::{MediaItem, MediaKind, PlaylistItem, whole_seconds};
pub use crate::snapshot::PlaylistSnapshot;
