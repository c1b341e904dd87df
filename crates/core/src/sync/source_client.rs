//! Remote catalog provider abstraction.
//!
//! A `SourceClient` knows how to talk one provider protocol (Xtream, M3U,
//! Stalker, ...) and delivers typed catalog entities. Implementations live
//! outside this crate; the reconciler only relies on fetches being fallible
//! and idempotent.

use async_trait::async_trait;
use thiserror::Error;

use super::entities::{EpgProgram, LiveCatalog, VodCatalog};
use super::types::SourceConfig;

/// Errors a provider fetch can raise.
#[derive(Debug, Error)]
pub enum SourceClientError {
    /// The provider could not be reached or rejected the request.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider answered with a payload we could not interpret.
    #[error("provider returned malformed payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A configured remote catalog provider.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the live catalog: channels, categories and the EPG endpoint.
    async fn fetch_live_catalog(
        &self,
        source: &SourceConfig,
    ) -> Result<LiveCatalog, SourceClientError>;

    /// Fetch the VOD catalog: movies and series.
    async fn fetch_vod_catalog(
        &self,
        source: &SourceConfig,
    ) -> Result<VodCatalog, SourceClientError>;

    /// Fetch the EPG program listing.
    async fn fetch_epg(&self, source: &SourceConfig)
        -> Result<Vec<EpgProgram>, SourceClientError>;
}
