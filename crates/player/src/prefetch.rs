//! Making sure every piece of media a playlist needs is on disk.

use crate::error::{ErrorKind, Result};
use crate::fetch::FetcherHandle;
use exn::ResultExt;
use futures::{StreamExt, stream};
use marquee_model::MediaItem;
use marquee_storage::{BlobHandle, EvictionReport, Governor};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::instrument;

const DEFAULT_CONCURRENCY: usize = 4;

/// How hard to try before giving up on a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts in total, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubles for every retry after that.
    pub backoff_base: Duration,
    /// Each attempt is abandoned after this long.
    pub attempt_timeout: Duration,
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_base: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(15),
        }
    }
}
impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    ///
    /// ```
    /// use marquee_player::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_millis(500));
    /// assert_eq!(policy.backoff(2), Duration::from_millis(1000));
    /// ```
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

/// Outcome of [`Prefetcher::ensure_available()`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Media ids whose content is in the blob store.
    pub ready: HashSet<String>,
    /// Media ids whose content could not be made available.
    pub failed: HashSet<String>,
    /// Number of downloads that actually happened.
    pub fetched: usize,
    /// What the budget pass after the batch did, if it ran successfully.
    pub eviction: Option<EvictionReport>,
}

/// Downloads missing media into the blob store, then keeps the store within
/// its byte budget.
pub struct Prefetcher {
    store: BlobHandle,
    governor: Governor,
    fetcher: FetcherHandle,
    max_bytes: u64,
    concurrency: usize,
    retry: RetryPolicy,
}

impl Prefetcher {
    pub fn new(store: BlobHandle, fetcher: FetcherHandle, max_bytes: u64) -> Self {
        Self {
            governor: Governor::new(store.clone()),
            store,
            fetcher,
            max_bytes,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    /// Maximum number of downloads in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &BlobHandle {
        &self.store
    }

    /// Make sure the content of every item in `media` is in the blob store.
    ///
    /// Items already cached are ready without a download. Missing items are
    /// downloaded concurrently, each on its own: one failing never affects
    /// the others. Several items sharing a URL cost a single download. Once
    /// every item has settled, the cache budget is enforced with this batch's
    /// URLs protected from eviction.
    #[instrument(level = "debug", skip_all, fields(items = media.len()))]
    pub async fn ensure_available(&self, media: &[MediaItem]) -> PrefetchReport {
        let mut by_url: HashMap<&str, Vec<&str>> = HashMap::new();
        for item in media {
            by_url.entry(item.url.as_str()).or_default().push(item.id.as_str());
        }
        let pinned: HashSet<String> = by_url.keys().map(|url| url.to_string()).collect();
        let pinned_ref = &pinned;
        let urls: Vec<String> = pinned.iter().cloned().collect();
        let outcomes: Vec<(String, Result<bool>)> = stream::iter(urls)
            .map(|url| async move {
                let outcome = self.ensure_one(&url, pinned_ref).await;
                (url, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = PrefetchReport::default();
        for (url, outcome) in outcomes {
            let url = url.as_str();
            let ids = by_url.get(url).into_iter().flatten().map(|id| id.to_string());
            match outcome {
                Ok(fetched) => {
                    report.fetched += usize::from(fetched);
                    report.ready.extend(ids);
                }
                Err(err) => {
                    tracing::warn!(url, error = ?err, "Media unavailable");
                    report.failed.extend(ids);
                }
            }
        }
        report.eviction = match self.governor.enforce_budget_pinned(self.max_bytes, &pinned).await {
            Ok(eviction) => Some(eviction),
            Err(err) => {
                tracing::warn!(error = ?err, "Could not enforce cache budget");
                None
            }
        };
        tracing::debug!(
            ready = report.ready.len(),
            failed = report.failed.len(),
            fetched = report.fetched,
            "Prefetch finished"
        );
        report
    }

    /// Returns whether a download happened.
    async fn ensure_one(&self, url: &str, pinned: &HashSet<String>) -> Result<bool> {
        match self.store.contains(url).await {
            Ok(true) => return Ok(false),
            Ok(false) => {}
            Err(err) => tracing::warn!(url, error = ?err, "Could not check blob store, downloading anyway"),
        }
        let data = self.fetch_with_retry(url).await?;
        self.store_blob(url, &data, pinned).await?;
        Ok(true)
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 1;
        loop {
            let err = match timeout(self.retry.attempt_timeout, self.fetcher.fetch(url)).await {
                Ok(Ok(data)) => return Ok(data),
                Ok(Err(err)) => err,
                Err(_) => exn::Exn::from(ErrorKind::Timeout(self.retry.attempt_timeout)),
            };
            if attempt >= self.retry.attempts || !err.is_retryable() {
                return Err(err);
            }
            let delay = self.retry.backoff(attempt);
            tracing::debug!(url, attempt, delay_ms = delay.as_millis() as u64, error = ?err, "Retrying download");
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// A failed write is most likely a full disk: make room for this blob
    /// and try once more.
    async fn store_blob(&self, url: &str, data: &[u8], pinned: &HashSet<String>) -> Result<()> {
        let Err(err) = self.store.put(url, data).await else {
            return Ok(());
        };
        tracing::warn!(url, bytes = data.len(), error = ?err, "Could not store media, evicting and retrying");
        let budget = self.max_bytes.saturating_sub(data.len() as u64);
        if let Err(err) = self.governor.enforce_budget_pinned(budget, pinned).await {
            tracing::warn!(error = ?err, "Could not make room in cache");
        }
        self.store.put(url, data).await.or_raise(|| ErrorKind::Storage)
    }
}
