use crate::media::{MediaItem, PlaylistItem};
use std::collections::{HashMap, HashSet};
use time::UtcDateTime;

/// A playlist together with every media record it references, as it was at
/// `captured_at`.
///
/// Every `media_id` in `items` has an entry in `resolved_media`. Items whose
/// media could not be resolved are dropped when the snapshot is built, never
/// left dangling, so the render loop can index into it without checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSnapshot {
    pub playlist_id: String,
    pub items: Vec<PlaylistItem>,
    pub resolved_media: HashMap<String, MediaItem>,
    pub captured_at: UtcDateTime,
}

impl PlaylistSnapshot {
    /// Build a snapshot from a playlist and whatever media could be resolved.
    ///
    /// - `media` is every record the backend returned for the playlist.
    /// - `ready` is the set of media ids whose content is available locally.
    ///
    /// An item survives only if its media is both resolved and ready. An item
    /// with a zero duration inherits its media's duration; if that is zero
    /// too, the item has nothing sensible to show and is dropped.
    pub fn resolve(
        playlist_id: impl Into<String>,
        items: impl IntoIterator<Item = PlaylistItem>,
        media: impl IntoIterator<Item = MediaItem>,
        ready: &HashSet<String>,
        captured_at: UtcDateTime,
    ) -> Self {
        let available: HashMap<String, MediaItem> =
            media.into_iter().filter(|m| ready.contains(&m.id)).map(|m| (m.id.clone(), m)).collect();
        let items: Vec<PlaylistItem> = items
            .into_iter()
            .filter_map(|item| {
                let media = available.get(&item.media_id)?;
                let duration = if item.duration > 0 { item.duration } else { media.duration };
                (duration > 0).then(|| PlaylistItem::new(item.media_id, duration))
            })
            .collect();
        // Only keep media that is actually referenced.
        let referenced: HashSet<&str> = items.iter().map(|i| i.media_id.as_str()).collect();
        let resolved_media = available.into_iter().filter(|(id, _)| referenced.contains(id.as_str())).collect();
        Self {
            playlist_id: playlist_id.into(),
            items,
            resolved_media,
            captured_at,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, index: usize) -> Option<&PlaylistItem> {
        self.items.get(index)
    }

    /// The media record shown at `index`.
    pub fn media_for(&self, index: usize) -> Option<&MediaItem> {
        self.item(index).and_then(|item| self.resolved_media.get(&item.media_id))
    }

    /// Every distinct media record in the snapshot.
    pub fn media(&self) -> impl Iterator<Item = &MediaItem> {
        self.resolved_media.values()
    }

    /// Whether `other` would play the exact same sequence. Used to decide if
    /// a refresh needs to restart playback.
    pub fn same_sequence(&self, other: &Self) -> bool {
        self.items == other.items
    }

    /// Whether the invariant between `items` and `resolved_media` holds.
    /// Snapshots built with [`resolve()`](Self::resolve) always satisfy it;
    /// snapshots read back from storage are checked with this.
    pub fn is_consistent(&self) -> bool {
        self.items.iter().all(|i| self.resolved_media.contains_key(&i.media_id))
    }
}
