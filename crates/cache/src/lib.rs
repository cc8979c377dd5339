//! Durable snapshot store for the player.
//!
//! Every time the player resolves its assigned playlist it stores the result
//! here, keyed by player key. After a restart without network the stored
//! snapshot is what keeps the screen showing content. The store is not the
//! source of truth (the backend is); losing the database only costs the
//! offline fallback until the next successful sync.

mod db;
pub mod error;
#[cfg(any(test, feature = "mock"))]
mod memory;
mod models;
mod repo;
mod store;

pub use crate::db::Database;
#[cfg(any(test, feature = "mock"))]
pub use crate::memory::MemorySnapshotStore;
pub use crate::repo::Repository;
pub use crate::store::{DEFAULT_STALE_AFTER, SnapshotStore, StoredSnapshot, is_stale};
use std::sync::Arc;

pub type SnapshotHandle = Arc<dyn SnapshotStore + Send + Sync>;
