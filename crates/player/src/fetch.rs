//! Downloading media content.

use crate::error::{ErrorKind, Result};
use crate::http;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches the content behind a media URL.
///
/// One call is one attempt: retries and per-attempt timeouts are the
/// [`Prefetcher`](crate::Prefetcher)'s business.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

pub type FetcherHandle = Arc<dyn MediaFetcher + Send + Sync>;

/// [`MediaFetcher`] over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .or_raise(|| ErrorKind::Configuration("could not build HTTP client".to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = http::send(self.client.get(url), url, CONNECT_TIMEOUT).await?;
        let bytes = http::read_bytes(response, url, CONNECT_TIMEOUT).await?;
        tracing::trace!(url, bytes = bytes.len(), "Downloaded media");
        Ok(bytes)
    }
}
