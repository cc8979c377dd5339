//! Client for a PostgREST-style backend.
//!
//! The backend exposes three tables the player cares about:
//!
//! - `screens`: `player_key`, `assigned_playlist`, `last_seen`
//! - `playlists`: `id`, `items` (JSON array of `{mediaId, duration}`)
//! - `media`: `id`, `url`, `type`, `duration`
//!
//! Filters use PostgREST operators in the query string, e.g.
//! `screens?player_key=eq.abc&select=assigned_playlist`.

use super::{Assignment, Playlist, RemoteSource};
use crate::error::{ErrorKind, Result};
use crate::http;
use async_trait::async_trait;
use exn::ResultExt;
use marquee_model::{MediaItem, MediaKind, PlayerKey, whole_seconds};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use time::UtcDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;

#[derive(Debug, Deserialize)]
struct ScreenRow {
    assigned_playlist: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaRow {
    id: String,
    url: String,
    #[serde(rename = "type")]
    kind: String,
    duration: Option<f64>,
}
impl MediaRow {
    /// `None` for media the player has no way of showing.
    fn into_media(self) -> Option<MediaItem> {
        let kind = match self.kind.as_str() {
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            other => {
                tracing::warn!(media = %self.id, kind = %other, "Skipping media of unknown type");
                return None;
            }
        };
        Some(MediaItem::new(self.id, self.url, kind, whole_seconds(self.duration)))
    }
}

/// PostgREST `in` filter value: `in.("a","b")`.
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> =
        ids.iter().map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))).collect();
    format!("in.({})", quoted.join(","))
}

/// [`RemoteSource`] backed by a PostgREST-style REST API.
#[derive(Debug, Clone)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RestRemote {
    /// `base_url` is the REST root, e.g. `https://example.supabase.co/rest/v1`.
    /// Every request gives up after `timeout`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .or_raise(|| ErrorKind::Configuration("could not build HTTP client".to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{table}", self.base_url))
            .header(ACCEPT, "application/json");
        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteSource for RestRemote {
    #[instrument(level = "debug", skip(self), fields(player = %player))]
    async fn assignment(&self, player: &PlayerKey) -> Result<Assignment> {
        let request = self
            .request(Method::GET, "screens")
            .query(&[("player_key", format!("eq.{player}")), ("select", "assigned_playlist".to_string())]);
        let response = http::send(request, "screens", self.timeout).await?;
        let rows: Vec<ScreenRow> = http::read_json(response, "screens", self.timeout).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Assignment { playlist_id: row.assigned_playlist }),
            None => {
                tracing::warn!(player = %player, "Backend does not know this screen");
                Ok(Assignment::unassigned())
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn playlist(&self, playlist_id: &str) -> Result<Option<Playlist>> {
        let request = self
            .request(Method::GET, "playlists")
            .query(&[("id", format!("eq.{playlist_id}")), ("select", "id,items".to_string())]);
        let response = http::send(request, "playlists", self.timeout).await?;
        let rows: Vec<Playlist> = http::read_json(response, "playlists", self.timeout).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(level = "debug", skip(self), fields(count = ids.len()))]
    async fn media_records(&self, ids: &[String]) -> Result<Vec<MediaItem>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self
            .request(Method::GET, "media")
            .query(&[("id", in_filter(ids)), ("select", "id,url,type,duration".to_string())]);
        let response = http::send(request, "media", self.timeout).await?;
        let rows: Vec<MediaRow> = http::read_json(response, "media", self.timeout).await?;
        Ok(rows.into_iter().filter_map(MediaRow::into_media).collect())
    }

    async fn report_heartbeat(&self, player: &PlayerKey, at: UtcDateTime) -> Result<()> {
        let last_seen = at.format(&Rfc3339).or_raise(|| ErrorKind::Protocol("heartbeat timestamp".to_string()))?;
        let request = self
            .request(Method::PATCH, "screens")
            .query(&[("player_key", format!("eq.{player}"))])
            .json(&serde_json::json!({ "last_seen": last_seen }));
        http::send(request, "screens", self.timeout).await?;
        Ok(())
    }
}
