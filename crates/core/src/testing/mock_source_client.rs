//! Mock source client for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::sync::{
    EpgProgram, LiveCatalog, SourceClient, SourceClientError, SourceConfig, VodCatalog,
};

/// A recorded fetch for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    /// Which source was fetched.
    pub source_id: String,
    /// Which catalog was requested ("live", "vod", "epg").
    pub catalog: &'static str,
    /// When the fetch was made.
    pub timestamp: Instant,
}

/// Mock implementation of the [`SourceClient`] trait.
///
/// Provides controllable behavior for testing:
/// - Return configurable catalogs per fetch
/// - Track fetches for assertions
/// - Simulate provider failures
///
/// # Example
///
/// ```rust,ignore
/// use zaptv_core::testing::MockSourceClient;
///
/// let client = MockSourceClient::new();
/// client.set_live_catalog(LiveCatalog { channels, categories, epg_url: None }).await;
///
/// let report = reconciler.sync_live(&client, &source).await;
/// assert!(report.is_success());
///
/// let fetches = client.recorded_fetches().await;
/// assert_eq!(fetches[0].catalog, "live");
/// ```
#[derive(Default)]
pub struct MockSourceClient {
    /// Configured live catalog to return.
    live: Arc<RwLock<LiveCatalog>>,
    /// Configured VOD catalog to return.
    vod: Arc<RwLock<VodCatalog>>,
    /// Configured EPG listing to return.
    epg: Arc<RwLock<Vec<EpgProgram>>>,
    /// If set, the next fetch fails with this message.
    next_error: Arc<RwLock<Option<String>>>,
    /// Recorded fetches.
    fetches: Arc<RwLock<Vec<RecordedFetch>>>,
}

impl MockSourceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the live catalog returned by subsequent fetches.
    pub async fn set_live_catalog(&self, catalog: LiveCatalog) {
        *self.live.write().await = catalog;
    }

    /// Configure the VOD catalog returned by subsequent fetches.
    pub async fn set_vod_catalog(&self, catalog: VodCatalog) {
        *self.vod.write().await = catalog;
    }

    /// Configure the EPG listing returned by subsequent fetches.
    pub async fn set_epg(&self, programs: Vec<EpgProgram>) {
        *self.epg.write().await = programs;
    }

    /// Make the next fetch fail with the given message.
    pub async fn fail_next(&self, message: impl Into<String>) {
        *self.next_error.write().await = Some(message.into());
    }

    /// All fetches made so far.
    pub async fn recorded_fetches(&self) -> Vec<RecordedFetch> {
        self.fetches.read().await.clone()
    }

    async fn record(&self, source: &SourceConfig, catalog: &'static str) {
        self.fetches.write().await.push(RecordedFetch {
            source_id: source.id.clone(),
            catalog,
            timestamp: Instant::now(),
        });
    }

    async fn take_error(&self) -> Option<SourceClientError> {
        self.next_error
            .write()
            .await
            .take()
            .map(SourceClientError::Request)
    }
}

#[async_trait]
impl SourceClient for MockSourceClient {
    async fn fetch_live_catalog(
        &self,
        source: &SourceConfig,
    ) -> Result<LiveCatalog, SourceClientError> {
        self.record(source, "live").await;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.live.read().await.clone())
    }

    async fn fetch_vod_catalog(
        &self,
        source: &SourceConfig,
    ) -> Result<VodCatalog, SourceClientError> {
        self.record(source, "vod").await;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.vod.read().await.clone())
    }

    async fn fetch_epg(
        &self,
        source: &SourceConfig,
    ) -> Result<Vec<EpgProgram>, SourceClientError> {
        self.record(source, "epg").await;
        if let Some(error) = self.take_error().await {
            return Err(error);
        }
        Ok(self.epg.read().await.clone())
    }
}

impl std::fmt::Debug for MockSourceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSourceClient").finish()
    }
}
