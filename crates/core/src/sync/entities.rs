//! Typed catalog entities delivered by a source client.
//!
//! These mirror the provider-facing shape of each entity kind. User-owned
//! fields (favorites, enabled flags, enrichment ids) are deliberately absent:
//! providers never supply them, the reconciler defaults them for new rows and
//! carries them forward for existing ones.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::Record;

/// A live channel as fetched from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveChannel {
    pub stream_id: String,
    pub name: String,
    #[serde(default)]
    pub category_ids: Option<Vec<String>>,
    #[serde(default)]
    pub channel_num: Option<i64>,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub epg_channel_id: Option<String>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub custom_sid: Option<String>,
    #[serde(default)]
    pub tv_archive: Option<bool>,
    #[serde(default)]
    pub direct_source: Option<String>,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub xmltv_id: Option<String>,
    #[serde(default)]
    pub series_no: Option<i64>,
    #[serde(default)]
    pub live: Option<bool>,
}

/// A channel/VOD category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub category_id: String,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub channel_count: Option<i64>,
}

/// One EPG program. Programs are replaced wholesale per source, not diffed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpgProgram {
    pub id: String,
    pub stream_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: String,
    pub end: String,
}

/// A VOD movie as fetched from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VodMovie {
    pub stream_id: String,
    pub name: String,
    #[serde(default)]
    pub category_ids: Option<Vec<String>>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub cast: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A VOD series as fetched from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VodSeries {
    pub series_id: String,
    pub name: String,
    #[serde(default)]
    pub category_ids: Option<Vec<String>>,
    #[serde(default)]
    pub added: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
    #[serde(default)]
    pub plot: Option<String>,
    #[serde(default)]
    pub cast: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub rating_5based: Option<f64>,
    #[serde(default)]
    pub youtube_trailer: Option<String>,
    #[serde(default)]
    pub episode_run_time: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
}

/// Everything a live-catalog fetch returns.
#[derive(Debug, Clone, Default)]
pub struct LiveCatalog {
    pub channels: Vec<LiveChannel>,
    pub categories: Vec<CategoryEntry>,
    /// EPG endpoint advertised by the provider, if any.
    pub epg_url: Option<String>,
}

/// Everything a VOD-catalog fetch returns.
#[derive(Debug, Clone, Default)]
pub struct VodCatalog {
    pub movies: Vec<VodMovie>,
    pub series: Vec<VodSeries>,
}

/// Serialize a typed entity into a store record scoped to `source_id`.
pub(crate) fn to_record<T: Serialize>(entity: &T, source_id: &str) -> Record {
    let mut record = match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map,
        _ => Record::new(),
    };
    record.insert("source_id".into(), Value::String(source_id.to_string()));
    record
}
