use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// How a piece of media is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Image => f.write_str("image"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// A media record as stored by the backend.
///
/// Immutable once fetched. `id` is the identity, `url` doubles as the key
/// into the local blob cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Default display time in seconds.
    pub duration: u32,
}

impl MediaItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: MediaKind, duration: u32) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind,
            duration,
        }
    }
}

/// One entry of a playlist: which media to show, and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistItem {
    #[serde(rename = "mediaId")]
    pub media_id: String,
    /// Display time in seconds. Zero means "use the media's own duration".
    ///
    /// Read leniently: the playlist editor stores whatever was typed, so
    /// negative, fractional or `null` values must not fail the playlist.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration: u32,
}

/// A duration as sent by the backend, in whole seconds. Fractions round up;
/// anything missing, non-finite or not positive is 0.
///
/// ```
/// use marquee_model::whole_seconds;
///
/// assert_eq!(whole_seconds(Some(12.5)), 13);
/// assert_eq!(whole_seconds(Some(-5.0)), 0);
/// assert_eq!(whole_seconds(None), 0);
/// ```
pub fn whole_seconds(value: Option<f64>) -> u32 {
    match value {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => seconds.ceil().min(f64::from(u32::MAX)) as u32,
        _ => 0,
    }
}

fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(whole_seconds(Option::<f64>::deserialize(deserializer)?))
}

impl PlaylistItem {
    pub fn new(media_id: impl Into<String>, duration: u32) -> Self {
        Self {
            media_id: media_id.into(),
            duration,
        }
    }
}
