//! Offline-resilient playback for a signage screen.
//!
//! The [`Reconciler`] keeps a screen showing *something*: what the backend
//! says it should show when the backend is reachable, the last snapshot that
//! was good enough otherwise. Media is downloaded ahead of time by the
//! [`Prefetcher`] into a local blob store, so playback never waits on the
//! network.
//!
//! ```no_run
//! use marquee_cache::{Database, Repository};
//! use marquee_player::{HttpFetcher, Reconciler, RestRemote, Settings};
//! use marquee_storage::LocalBlobStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("/var/lib/marquee/snapshots.db").await?;
//! let remote = RestRemote::new("https://backend.example/rest/v1", None, Duration::from_secs(8))?;
//! let reconciler = Reconciler::new(
//!     Arc::new(remote),
//!     Arc::new(Repository::from(&db)),
//!     Arc::new(LocalBlobStore::new("media", "/var/cache/marquee/media")?),
//!     Arc::new(HttpFetcher::new()?),
//!     Settings::default(),
//! );
//! let session = reconciler.start("lobby-screen");
//! let mut state = session.subscribe();
//! while state.changed().await.is_ok() {
//!     if let Some(playing) = state.borrow_and_update().now_playing() {
//!         println!("showing {}", playing.media.url);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod fetch;
mod http;
mod prefetch;
mod reconciler;
pub mod remote;
mod render;
mod settings;
mod state;
#[cfg(test)]
mod testing;

pub use crate::fetch::{FetcherHandle, HttpFetcher, MediaFetcher};
pub use crate::prefetch::{PrefetchReport, Prefetcher, RetryPolicy};
pub use crate::reconciler::{Reconciler, Session};
pub use crate::remote::{RemoteHandle, RemoteSource, RestRemote};
pub use crate::settings::Settings;
pub use crate::state::{Connectivity, Notice, NowPlaying, Phase, PlayerState};
