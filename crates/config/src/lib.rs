//! Configuration loading and validation.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default()`]).
//! 2. A config file: TOML, YAML or JSON, picked by extension. Either given
//!    explicitly, or `config.toml` in the platform config directory if it
//!    exists.
//! 3. Environment variables prefixed with `MARQUEE_`. Nested keys are
//!    separated by a double underscore: `MARQUEE_REMOTE__URL`.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "MARQUEE_";
const MIB: u64 = 1024 * 1024;

/// Connection details for the backend the player syncs with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST API, e.g. `https://example.supabase.co/rest/v1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity of this screen. Usually passed on the command line instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_key: Option<String>,
    pub poll_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    /// Snapshots captured longer ago than this are flagged as stale.
    pub stale_ceiling_hours: u64,
    /// Byte budget for cached media.
    pub max_cache_bytes: u64,
    /// How long the backend must be unreachable before the screen shows an
    /// offline indicator.
    pub offline_escalation_minutes: u64,
    pub media_fetch_timeout_seconds: u64,
    pub remote_timeout_seconds: u64,
    pub prefetch_concurrency: usize,
    /// Attempts per media download, including the first one.
    pub fetch_attempts: u32,
    pub backoff_base_ms: u64,
    /// Where downloaded media is kept. Blobs go directly in this directory.
    pub cache_dir: PathBuf,
    /// Where the snapshot database is kept.
    pub data_dir: PathBuf,
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        let dirs = project_dirs();
        let fallback = std::env::temp_dir().join("marquee");
        Self {
            player_key: None,
            poll_interval_seconds: 60,
            heartbeat_interval_seconds: 60,
            stale_ceiling_hours: 24,
            max_cache_bytes: 500 * MIB,
            offline_escalation_minutes: 30,
            media_fetch_timeout_seconds: 15,
            remote_timeout_seconds: 8,
            prefetch_concurrency: 4,
            fetch_attempts: 3,
            backoff_base_ms: 500,
            cache_dir: dirs.as_ref().map_or_else(|| fallback.join("media"), |d| d.cache_dir().join("media")),
            data_dir: dirs.as_ref().map_or_else(|| fallback.join("data"), |d| d.data_dir().to_path_buf()),
            remote: RemoteConfig::default(),
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "marquee")
}

/// `config.toml` in the platform's config directory, e.g.
/// `~/.config/marquee/config.toml` on Linux.
pub fn default_config_file() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.toml"))
}

impl Config {
    /// Load configuration from every layer and validate it.
    ///
    /// An explicit `file` must exist. Without one, the default config file is
    /// used only if present.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = match file {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file().filter(|path| path.is_file()),
        };
        Self::from_figment(Self::figment(file.as_deref())?)
    }

    /// The layered figment, before extraction. `file` must exist if given.
    pub fn figment(file: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Loading config file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file_exact(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
                Some("json") => figment.merge(Json::file_exact(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from `figment`.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the player cannot run with.
    pub fn validate(&self) -> Result<()> {
        const ZERO: &str = "must be greater than zero";
        let positive = [
            ("poll_interval_seconds", self.poll_interval_seconds),
            ("heartbeat_interval_seconds", self.heartbeat_interval_seconds),
            ("stale_ceiling_hours", self.stale_ceiling_hours),
            ("max_cache_bytes", self.max_cache_bytes),
            ("media_fetch_timeout_seconds", self.media_fetch_timeout_seconds),
            ("remote_timeout_seconds", self.remote_timeout_seconds),
            ("prefetch_concurrency", self.prefetch_concurrency as u64),
            ("fetch_attempts", u64::from(self.fetch_attempts)),
        ];
        if let Some(&(name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            exn::bail!(ErrorKind::Invalid(name, ZERO));
        }
        if !self.cache_dir.is_absolute() {
            exn::bail!(ErrorKind::Invalid("cache_dir", "must be an absolute path"));
        }
        if !self.data_dir.is_absolute() {
            exn::bail!(ErrorKind::Invalid("data_dir", "must be an absolute path"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_ceiling_hours.saturating_mul(60 * 60))
    }

    pub fn offline_escalation(&self) -> Duration {
        Duration::from_secs(self.offline_escalation_minutes.saturating_mul(60))
    }

    pub fn media_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.media_fetch_timeout_seconds)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_seconds)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Location of the snapshot database inside [`data_dir`](Self::data_dir).
    pub fn snapshot_db_path(&self) -> PathBuf {
        self.data_dir.join("snapshots.db")
    }
}
