//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides a mock source client and entity fixtures so sync
//! behavior can be tested end to end without a real provider.
//!
//! # Example
//!
//! ```rust,ignore
//! use zaptv_core::testing::{fixtures, MockSourceClient};
//!
//! let client = MockSourceClient::new();
//! client.set_live_catalog(LiveCatalog {
//!     channels: vec![fixtures::channel("1", "BBC One")],
//!     categories: vec![fixtures::category("10", "News")],
//!     epg_url: None,
//! }).await;
//! ```

mod mock_source_client;

pub use mock_source_client::{MockSourceClient, RecordedFetch};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::sync::{CategoryEntry, EpgProgram, LiveChannel, SourceConfig, VodMovie, VodSeries};

    /// Create a test source config with reasonable defaults.
    pub fn source(id: &str) -> SourceConfig {
        SourceConfig {
            id: id.to_string(),
            name: format!("Source {}", id),
            url: format!("http://provider.test/{}", id),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            epg_url: None,
        }
    }

    /// Create a test live channel.
    pub fn channel(stream_id: &str, name: &str) -> LiveChannel {
        LiveChannel {
            stream_id: stream_id.to_string(),
            name: name.to_string(),
            category_ids: Some(vec!["1".to_string()]),
            stream_type: Some("live".to_string()),
            stream_icon: Some(format!("http://provider.test/icons/{}.png", stream_id)),
            live: Some(true),
            ..Default::default()
        }
    }

    /// Create a test category.
    pub fn category(category_id: &str, name: &str) -> CategoryEntry {
        CategoryEntry {
            category_id: category_id.to_string(),
            category_name: name.to_string(),
            parent_id: None,
            channel_count: None,
        }
    }

    /// Create a test EPG program.
    pub fn program(id: &str, stream_id: &str, title: &str) -> EpgProgram {
        EpgProgram {
            id: id.to_string(),
            stream_id: stream_id.to_string(),
            title: title.to_string(),
            description: None,
            start: "2024-06-01T10:00:00Z".to_string(),
            end: "2024-06-01T11:00:00Z".to_string(),
        }
    }

    /// Create a test VOD movie.
    pub fn movie(stream_id: &str, name: &str) -> VodMovie {
        VodMovie {
            stream_id: stream_id.to_string(),
            name: name.to_string(),
            category_ids: Some(vec!["100".to_string()]),
            container_extension: Some("mkv".to_string()),
            year: Some("2020".to_string()),
            ..Default::default()
        }
    }

    /// Create a test VOD series.
    pub fn series(series_id: &str, name: &str) -> VodSeries {
        VodSeries {
            series_id: series_id.to_string(),
            name: name.to_string(),
            category_ids: Some(vec!["200".to_string()]),
            ..Default::default()
        }
    }
}
