//! Size budget enforcement for a blob store.
//!
//! Signage playlists loop. The same short clips come round again every few
//! minutes, so evicting by recency would throw out exactly the media that is
//! about to be shown again. Instead the governor evicts the *smallest*
//! entries first, and never removes more than 30% of the entries in a single
//! pass so one oversized download cannot wipe the whole cache.

use crate::BlobHandle;
use crate::error::Result;
use crate::models::BlobInfo;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::instrument;

/// Maximum share of entries (in percent) a single pass may evict.
const MAX_EVICTION_PERCENT: usize = 30;

/// What [`plan_evictions`] decided, before anything is deleted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Entries to delete, in deletion order.
    pub evict: Vec<BlobInfo>,
    /// Entries that are individually larger than the whole budget. They are
    /// kept, but the caller should know the budget cannot be met.
    pub oversized: Vec<BlobInfo>,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// Outcome of a [`Governor`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EvictionReport {
    /// Keys that were actually deleted.
    pub evicted: Vec<String>,
    /// Keys retained despite exceeding the budget on their own.
    pub oversized: Vec<String>,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub max_bytes: u64,
}
impl EvictionReport {
    /// Whether a single entry is larger than the entire budget.
    pub fn capacity_exceeded(&self) -> bool {
        !self.oversized.is_empty()
    }

    pub fn within_budget(&self) -> bool {
        self.bytes_after <= self.max_bytes
    }
}

/// Most entries one pass may evict out of `count`.
///
/// 30% rounded down, but at least one. For caches of fewer than four
/// entries that one eviction is more than 30% of the entries; a cache of two
/// large files over budget still has to be able to shed one of them.
pub fn eviction_cap(count: usize) -> usize {
    (count * MAX_EVICTION_PERCENT / 100).max(1)
}

/// Decide which entries to evict so the total fits in `max_bytes`.
///
/// - Nothing is evicted while the total is within budget.
/// - Entries bigger than the budget on their own are never candidates and
///   are reported as oversized, pinned or not.
/// - Entries in `pinned` are never candidates.
/// - Candidates go smallest first; ties go to the least recently accessed,
///   then to the key so the plan is deterministic.
/// - Evicting stops once the total is within budget or
///   [`eviction_cap`] entries have been chosen, whichever comes first.
pub fn plan_evictions(entries: Vec<BlobInfo>, max_bytes: u64, pinned: &HashSet<String>) -> EvictionPlan {
    let total: u64 = entries.iter().map(|e| e.size).sum();
    let mut plan = EvictionPlan {
        bytes_before: total,
        bytes_after: total,
        ..Default::default()
    };
    if total <= max_bytes {
        return plan;
    }
    let cap = eviction_cap(entries.len());
    let (oversized, candidates): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.size > max_bytes);
    plan.oversized = oversized;
    let mut candidates: Vec<BlobInfo> = candidates.into_iter().filter(|e| !pinned.contains(&e.key)).collect();
    candidates.sort_by(|a, b| match a.size.cmp(&b.size) {
        Ordering::Equal => a.last_accessed.cmp(&b.last_accessed).then_with(|| a.key.cmp(&b.key)),
        other => other,
    });
    for entry in candidates {
        if plan.bytes_after <= max_bytes || plan.evict.len() >= cap {
            break;
        }
        plan.bytes_after -= entry.size;
        plan.evict.push(entry);
    }
    plan
}

/// Enforces a byte budget over a blob store.
///
/// The governor holds no copy of the cache metadata; every pass reads the
/// store's current entries and instructs deletions.
#[derive(Clone)]
pub struct Governor {
    store: BlobHandle,
}
impl Governor {
    pub fn new(store: BlobHandle) -> Self {
        Self { store }
    }

    /// Evict entries until the store fits `max_bytes` (or the per-pass cap
    /// is hit). See [`plan_evictions`] for the selection rules.
    pub async fn enforce_budget(&self, max_bytes: u64) -> Result<EvictionReport> {
        self.enforce_budget_pinned(max_bytes, &HashSet::new()).await
    }

    /// Same as [`enforce_budget()`](Self::enforce_budget), but never evicts
    /// the keys in `pinned`: media the player needs for imminent playback.
    #[instrument(level = "debug", skip(self, pinned), fields(store = self.store.name()))]
    pub async fn enforce_budget_pinned(&self, max_bytes: u64, pinned: &HashSet<String>) -> Result<EvictionReport> {
        let entries = self.store.entries().await?;
        let plan = plan_evictions(entries, max_bytes, pinned);
        let mut report = EvictionReport {
            oversized: plan.oversized.iter().map(|e| e.key.clone()).collect(),
            bytes_before: plan.bytes_before,
            bytes_after: plan.bytes_before,
            max_bytes,
            ..Default::default()
        };
        for entry in plan.evict {
            // One stubborn file shouldn't stop the rest of the pass.
            if let Err(e) = self.store.delete(&entry.key).await {
                tracing::warn!(key = %entry.key, error = ?e, "Could not evict blob");
                continue;
            }
            report.bytes_after -= entry.size;
            report.evicted.push(entry.key);
        }
        for key in &report.oversized {
            tracing::warn!(key = %key, max_bytes, "Cached blob exceeds the entire cache budget; retaining it");
        }
        if !report.evicted.is_empty() {
            tracing::info!(
                evicted = report.evicted.len(),
                bytes_before = report.bytes_before,
                bytes_after = report.bytes_after,
                max_bytes,
                "Cache budget enforced"
            );
        }
        Ok(report)
    }
}
