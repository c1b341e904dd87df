use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a writer waits on a busy store before failing (ms).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Maximum bound parameters per generated statement.
    #[serde(default = "default_max_bound_params")]
    pub max_bound_params: usize,
    /// Minimum chunk size routed through the native bulk writer.
    #[serde(default = "default_native_bulk_min_chunk")]
    pub native_bulk_min_chunk: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_bound_params: default_max_bound_params(),
            native_bulk_min_chunk: default_native_bulk_min_chunk(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("zaptv.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_bound_params() -> usize {
    999
}

fn default_native_bulk_min_chunk() -> usize {
    100
}

/// Sync reconciler configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Concurrent source fetches during a sync-all pass.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    /// Grace window during which a deleted source blocks in-flight syncs (s).
    #[serde(default = "default_delete_grace_secs")]
    pub delete_grace_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: default_fetch_concurrency(),
            delete_grace_secs: default_delete_grace_secs(),
        }
    }
}

fn default_fetch_concurrency() -> usize {
    5
}

fn default_delete_grace_secs() -> u64 {
    30
}

impl DatabaseConfig {
    /// Store tuning options derived from this configuration.
    pub fn store_options(&self) -> crate::store::StoreOptions {
        crate::store::StoreOptions {
            busy_timeout: std::time::Duration::from_millis(self.busy_timeout_ms),
            max_bound_params: self.max_bound_params,
            native_min_chunk: self.native_bulk_min_chunk,
        }
    }
}
