//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Sync reconciler (runs, row churn, durations)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Sync reconciler
// =============================================================================

/// Sync runs per entity kind by result.
pub static SYNC_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("zaptv_sync_runs_total", "Total sync runs"),
        &["kind", "result"], // result: "applied", "skipped", "failed"
    )
    .unwrap()
});

/// Rows written or removed by sync runs.
pub static SYNC_ROWS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("zaptv_sync_rows_total", "Rows touched by sync runs"),
        &["kind", "op"], // op: "added", "updated", "deleted"
    )
    .unwrap()
});

/// Duration of one catalog sync per source.
pub static SYNC_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("zaptv_sync_duration_seconds", "Duration of a catalog sync")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 180.0]),
        &["catalog"], // "live", "vod", "epg"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SYNC_RUNS.clone()),
        Box::new(SYNC_ROWS.clone()),
        Box::new(SYNC_DURATION.clone()),
    ]
}
