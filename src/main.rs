//! Headless signage player.
//!
//! `marquee play` keeps a screen's playlist cached and playing, and logs what
//! would be on screen. The `cache` and `snapshot` subcommands inspect and
//! reset the local state a player keeps between restarts.

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use exn::{OptionExt, ResultExt};
use marquee_cache::{Database, Repository, SnapshotStore};
use marquee_config::Config;
use marquee_model::PlayerKey;
use marquee_player::{HttpFetcher, Phase, PlayerState, Reconciler, RestRemote, Settings};
use marquee_storage::{BlobStore, LocalBlobStore, format_bytes};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Display, Error)]
enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    #[display("no player key given: pass --player-key or set MARQUEE_PLAYER_KEY")]
    MissingPlayerKey,
    #[display("invalid player key")]
    InvalidPlayerKey,
    #[display("no backend configured: set remote.url or MARQUEE_REMOTE__URL")]
    MissingRemote,
    #[display("could not open local storage")]
    Storage,
    #[display("could not set up network clients")]
    Network,
}

type Result<T> = std::result::Result<T, exn::Exn<ErrorKind>>;

#[derive(Parser, Debug)]
#[command(name = "marquee", version, about = "Headless signage player with an offline-resilient media cache")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Identity of the screen to play for (overrides config)
    #[arg(long, global = true, env = "MARQUEE_PLAYER_KEY")]
    player_key: Option<String>,

    /// More logging; repeat for even more. RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play the screen's assigned playlist until interrupted
    Play,
    /// Inspect or reset the media cache
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Inspect or reset the stored playlist snapshot
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// Show how much media is cached
    Info,
    /// Delete every cached blob
    Clear,
}

#[derive(Subcommand, Debug)]
enum SnapshotCommand {
    /// Show the stored snapshot for the player
    Show,
    /// Forget the stored snapshot for the player
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let player_key = cli.player_key.or_else(|| config.player_key.clone());
    match cli.command {
        Command::Play => play(&config, player_key).await,
        Command::Cache(CacheCommand::Info) => cache_info(&config).await,
        Command::Cache(CacheCommand::Clear) => {
            blob_store(&config).await?.clear().await.or_raise(|| ErrorKind::Storage)?;
            println!("Media cache cleared");
            Ok(())
        }
        Command::Snapshot(SnapshotCommand::Show) => snapshot_show(&config, player_key).await,
        Command::Snapshot(SnapshotCommand::Clear) => {
            let player = parse_player(player_key)?;
            let db = database(&config).await?;
            Repository::from(&db).clear(&player).await.or_raise(|| ErrorKind::Storage)?;
            db.close().await;
            println!("Snapshot for {player} cleared");
            Ok(())
        }
    }
}

fn parse_player(player_key: Option<String>) -> Result<PlayerKey> {
    let raw = player_key.ok_or_raise(|| ErrorKind::MissingPlayerKey)?;
    PlayerKey::parse(&raw).or_raise(|| ErrorKind::InvalidPlayerKey)
}

async fn blob_store(config: &Config) -> Result<LocalBlobStore> {
    tokio::fs::create_dir_all(&config.cache_dir).await.or_raise(|| ErrorKind::Storage)?;
    LocalBlobStore::new("media", &config.cache_dir).or_raise(|| ErrorKind::Storage)
}

async fn database(config: &Config) -> Result<Database> {
    tokio::fs::create_dir_all(&config.data_dir).await.or_raise(|| ErrorKind::Storage)?;
    Database::connect(config.snapshot_db_path()).await.or_raise(|| ErrorKind::Storage)
}

fn repository(db: &Database, config: &Config) -> Result<Repository> {
    let stale_after = time::Duration::try_from(config.stale_after()).or_raise(|| ErrorKind::Config)?;
    Ok(Repository::from(db).with_stale_after(stale_after))
}

async fn play(config: &Config, player_key: Option<String>) -> Result<()> {
    // Checked by the session too, but failing before touching the disk is
    // friendlier on the command line.
    let raw = player_key.ok_or_raise(|| ErrorKind::MissingPlayerKey)?;
    let url = config.remote.url.clone().ok_or_raise(|| ErrorKind::MissingRemote)?;
    let remote =
        RestRemote::new(url, config.remote.api_key.clone(), config.remote_timeout()).or_raise(|| ErrorKind::Network)?;
    let fetcher = HttpFetcher::new().or_raise(|| ErrorKind::Network)?;
    let blobs = blob_store(config).await?;
    let db = database(config).await?;
    let reconciler = Reconciler::new(
        Arc::new(remote),
        Arc::new(repository(&db, config)?),
        Arc::new(blobs),
        Arc::new(fetcher),
        Settings::from(config),
    );

    let session = reconciler.start(&raw);
    let mut rx = session.subscribe();
    let mut shown = Shown::default();
    loop {
        shown.report(&rx.borrow_and_update());
        if shown.phase == Some(Phase::Error) {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }
    let failed = shown.phase == Some(Phase::Error);
    session.shutdown().await;
    db.close().await;
    if failed {
        exn::bail!(ErrorKind::InvalidPlayerKey);
    }
    Ok(())
}

/// What has already been logged, so only changes get reported.
#[derive(Default)]
struct Shown {
    phase: Option<Phase>,
    advanced: Option<u64>,
    offline_indicator: bool,
}

impl Shown {
    fn report(&mut self, state: &PlayerState) {
        if self.phase != Some(state.phase) {
            tracing::info!(phase = %state.phase, connectivity = %state.connectivity, stale = state.stale, "Phase changed");
            self.phase = Some(state.phase);
            self.advanced = None;
        }
        if state.offline_indicator != self.offline_indicator {
            match &state.notice {
                Some(notice) if state.offline_indicator => tracing::warn!(%notice, "Showing offline indicator"),
                _ => tracing::info!("Offline indicator cleared"),
            }
            self.offline_indicator = state.offline_indicator;
        }
        if self.advanced == Some(state.advanced) {
            return;
        }
        self.advanced = Some(state.advanced);
        if let Some(playing) = state.now_playing() {
            tracing::info!(
                index = playing.index,
                media = %playing.media.id,
                kind = %playing.media.kind,
                seconds = playing.item.duration,
                url = %playing.media.url,
                "Now playing"
            );
        }
    }
}

async fn cache_info(config: &Config) -> Result<()> {
    let usage = blob_store(config).await?.usage().await.or_raise(|| ErrorKind::Storage)?;
    println!("Location: {}", config.cache_dir.display());
    println!("Items:    {}", usage.item_count);
    println!("Size:     {} of {}", format_bytes(usage.total_bytes), format_bytes(config.max_cache_bytes));
    Ok(())
}

async fn snapshot_show(config: &Config, player_key: Option<String>) -> Result<()> {
    let player = parse_player(player_key)?;
    let db = database(config).await?;
    let stored = repository(&db, config)?.load(&player).await.or_raise(|| ErrorKind::Storage);
    db.close().await;
    let Some(stored) = stored? else {
        println!("No snapshot stored for {player}");
        return Ok(());
    };
    let snapshot = &stored.snapshot;
    println!("Player:   {player}");
    println!("Playlist: {}", snapshot.playlist_id);
    println!("Captured: {}{}", snapshot.captured_at, if stored.stale { " (stale)" } else { "" });
    println!("Saved:    {}", stored.saved_at);
    for (index, item) in snapshot.items.iter().enumerate() {
        let url = snapshot.media_for(index).map(|m| m.url.as_str()).unwrap_or("?");
        println!("{index:>4}. {} {}s {url}", item.media_id, item.duration);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_store_uses_cache_dir_as_is() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config {
            cache_dir: temp_dir.path().join("media"),
            ..Config::default()
        };
        let store = blob_store(&config).await.unwrap();
        assert_eq!(store.root(), config.cache_dir);
        assert!(!config.cache_dir.join("media").exists());
    }
}
