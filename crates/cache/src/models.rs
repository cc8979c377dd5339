use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use marquee_model::{MediaItem, PlayerKey, PlaylistItem, PlaylistSnapshot};
use time::UtcDateTime;

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SnapshotRow {
    pub(crate) player_key: String,
    pub(crate) playlist_id: String,
    pub(crate) items: String,
    pub(crate) resolved_media: String,
    pub(crate) captured_at: i64,
    pub(crate) saved_at: i64,
}
impl SnapshotRow {
    pub(crate) fn new(player: &PlayerKey, snapshot: &PlaylistSnapshot, saved_at: UtcDateTime) -> Result<Self, Error> {
        // Sorted so the same snapshot always serializes to the same text.
        let mut media: Vec<&MediaItem> = snapshot.media().collect();
        media.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self {
            player_key: player.to_string(),
            playlist_id: snapshot.playlist_id.clone(),
            items: serde_json::to_string(&snapshot.items).or_raise(|| ErrorKind::InvalidData("items"))?,
            resolved_media: serde_json::to_string(&media).or_raise(|| ErrorKind::InvalidData("resolved media"))?,
            captured_at: snapshot.captured_at.unix_timestamp(),
            saved_at: saved_at.unix_timestamp(),
        })
    }

    pub(crate) fn saved_at(&self) -> Result<UtcDateTime, Error> {
        UtcDateTime::from_unix_timestamp(self.saved_at).or_raise(|| ErrorKind::InvalidData("saved date"))
    }
}
impl TryFrom<SnapshotRow> for PlaylistSnapshot {
    type Error = Error;
    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let items: Vec<PlaylistItem> =
            serde_json::from_str(&row.items).or_raise(|| ErrorKind::InvalidData("items"))?;
        let media: Vec<MediaItem> =
            serde_json::from_str(&row.resolved_media).or_raise(|| ErrorKind::InvalidData("resolved media"))?;
        let snapshot = PlaylistSnapshot {
            playlist_id: row.playlist_id,
            items,
            resolved_media: media.into_iter().map(|m| (m.id.clone(), m)).collect(),
            captured_at: UtcDateTime::from_unix_timestamp(row.captured_at)
                .or_raise(|| ErrorKind::InvalidData("capture date"))?,
        };
        if !snapshot.is_consistent() {
            exn::bail!(ErrorKind::InvalidData("snapshot references unresolved media"));
        }
        Ok(snapshot)
    }
}
