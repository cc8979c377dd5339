//! Local media cache for the player.
//!
//! Downloaded media lives in a [`BlobStore`], keyed by the URL it came from.
//! A [`Governor`] keeps the store within a byte budget.

pub mod backend;
pub mod error;
mod governor;
mod key;
mod models;

pub use crate::backend::BlobStore;
pub use crate::backend::LocalBlobStore;
#[cfg(any(test, feature = "mock"))]
pub use crate::backend::MemoryBlobStore;
pub use crate::governor::{EvictionPlan, EvictionReport, Governor, eviction_cap, plan_evictions};
pub use crate::key::validate as validate_key;
pub use crate::models::{BlobInfo, CacheUsage, format_bytes};
use std::sync::Arc;

pub type BlobHandle = Arc<dyn BlobStore + Send + Sync>;
