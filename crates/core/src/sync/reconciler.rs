//! Incremental catalog reconciliation.
//!
//! A sync run never trusts the provider blindly: existing local rows are
//! loaded first, the fresh entity list is diffed against them, and only the
//! computed add/update/delete sets are persisted. User-owned fields survive
//! to the same row across a re-sync; a remote failure or an implausibly empty
//! result leaves local data untouched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::metrics;
use crate::store::schema::{KindSchema, CATEGORIES, CHANNELS, PROGRAMS, VOD_MOVIES, VOD_SERIES};
use crate::store::{CatalogStore, Record, StoreError};

use super::entities::to_record;
use super::guard::DeletionGuard;
use super::meta::patch_source_meta;
use super::source_client::SourceClient;
use super::types::{KindOutcome, SourceConfig, SyncReport};

/// Diff of fresh entities against existing local rows for one kind.
#[derive(Debug, Default)]
struct KindDiff {
    /// New plus changed records, user-owned fields resolved.
    upserts: Vec<Record>,
    /// Local primary keys absent from the (non-empty) remote set.
    deleted_keys: Vec<Value>,
    added: usize,
    updated: usize,
    unchanged: usize,
}

fn key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Field equality for change detection: absent counts as null, numbers
/// compare by value.
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Partition fresh entities into new/changed/unchanged and compute the
/// deleted set. For new entities user-owned fields get their defaults; for
/// existing ones they are copied forward from the local row.
fn diff_kind(
    schema: &'static KindSchema,
    existing: &HashMap<String, Record>,
    fresh: Vec<Record>,
) -> KindDiff {
    // Last occurrence of a duplicated primary key wins, matching upsert order.
    let mut order: Vec<String> = Vec::with_capacity(fresh.len());
    let mut by_key: HashMap<String, Record> = HashMap::with_capacity(fresh.len());
    for record in fresh {
        let key = match record.get(schema.primary_key) {
            Some(k) if !k.is_null() => key_string(k),
            _ => continue,
        };
        if by_key.insert(key.clone(), record).is_none() {
            order.push(key);
        }
    }

    let mut diff = KindDiff::default();
    for key in &order {
        let mut record = match by_key.remove(key) {
            Some(r) => r,
            None => continue,
        };
        match existing.get(key) {
            None => {
                for field in schema.user_owned {
                    let missing = record.get(field.name).map(Value::is_null).unwrap_or(true);
                    if missing {
                        record.insert(field.name.to_string(), field.default.to_value());
                    }
                }
                diff.added += 1;
                diff.upserts.push(record);
            }
            Some(current) => {
                for field in schema.user_owned {
                    let value = current
                        .get(field.name)
                        .cloned()
                        .unwrap_or_else(|| field.default.to_value());
                    record.insert(field.name.to_string(), value);
                }
                let changed = schema
                    .identity_fields
                    .iter()
                    .any(|f| !values_equal(record.get(*f), current.get(*f)));
                if changed {
                    diff.updated += 1;
                    diff.upserts.push(record);
                } else {
                    diff.unchanged += 1;
                }
            }
        }
    }

    let fresh_keys: HashSet<&String> = order.iter().collect();
    for (key, record) in existing {
        if !fresh_keys.contains(key) {
            if let Some(pk) = record.get(schema.primary_key) {
                diff.deleted_keys.push(pk.clone());
            }
        }
    }

    diff
}

/// Orchestrates sync runs against the local store.
pub struct SyncReconciler {
    store: CatalogStore,
    guard: Arc<DeletionGuard>,
    config: SyncConfig,
}

impl SyncReconciler {
    pub fn new(store: CatalogStore, config: SyncConfig) -> Self {
        let guard = Arc::new(DeletionGuard::new(Duration::from_secs(
            config.delete_grace_secs,
        )));
        Self {
            store,
            guard,
            config,
        }
    }

    /// The guard that in-flight syncs consult before persisting. Mark a
    /// source here when the user deletes it.
    pub fn deletion_guard(&self) -> Arc<DeletionGuard> {
        Arc::clone(&self.guard)
    }

    /// Sync the live catalog (channels + categories) of one source.
    pub async fn sync_live(&self, client: &dyn SourceClient, source: &SourceConfig) -> SyncReport {
        let run_id = Uuid::new_v4();
        let timer = Instant::now();
        info!(source = %source.id, %run_id, "live catalog sync started");

        let outcomes = match self.run_live(client, source).await {
            Ok(outcomes) => outcomes,
            Err(error) => {
                warn!(source = %source.id, %run_id, "live catalog sync failed: {error}");
                self.record_failure(source, &error).await;
                vec![
                    KindOutcome::failed(CHANNELS.name, error.clone()),
                    KindOutcome::failed(CATEGORIES.name, error),
                ]
            }
        };

        observe_outcomes("live", timer, &outcomes);
        let report = SyncReport {
            run_id,
            source_id: source.id.clone(),
            outcomes,
        };
        log_report("live", &report);
        report
    }

    /// Sync the VOD catalog (movies + series) of one source.
    pub async fn sync_vod(&self, client: &dyn SourceClient, source: &SourceConfig) -> SyncReport {
        let run_id = Uuid::new_v4();
        let timer = Instant::now();
        info!(source = %source.id, %run_id, "vod catalog sync started");

        let outcomes = match self.run_vod(client, source).await {
            Ok(outcomes) => outcomes,
            Err(error) => {
                warn!(source = %source.id, %run_id, "vod catalog sync failed: {error}");
                self.record_failure(source, &error).await;
                vec![
                    KindOutcome::failed(VOD_MOVIES.name, error.clone()),
                    KindOutcome::failed(VOD_SERIES.name, error),
                ]
            }
        };

        observe_outcomes("vod", timer, &outcomes);
        let report = SyncReport {
            run_id,
            source_id: source.id.clone(),
            outcomes,
        };
        log_report("vod", &report);
        report
    }

    /// Sync EPG programs of one source. Programs are replaced wholesale per
    /// source rather than diffed.
    pub async fn sync_epg(&self, client: &dyn SourceClient, source: &SourceConfig) -> SyncReport {
        let run_id = Uuid::new_v4();
        let timer = Instant::now();
        info!(source = %source.id, %run_id, "epg sync started");

        let outcomes = match self.run_epg(client, source).await {
            Ok(outcome) => vec![outcome],
            Err(error) => {
                warn!(source = %source.id, %run_id, "epg sync failed: {error}");
                self.record_failure(source, &error).await;
                vec![KindOutcome::failed(PROGRAMS.name, error)]
            }
        };

        observe_outcomes("epg", timer, &outcomes);
        let report = SyncReport {
            run_id,
            source_id: source.id.clone(),
            outcomes,
        };
        log_report("epg", &report);
        report
    }

    /// Full sync (live, EPG, VOD) of one source.
    pub async fn sync_source(
        &self,
        client: &dyn SourceClient,
        source: &SourceConfig,
    ) -> Vec<SyncReport> {
        vec![
            self.sync_live(client, source).await,
            self.sync_epg(client, source).await,
            self.sync_vod(client, source).await,
        ]
    }

    /// Sync every source, at most `fetch_concurrency` in flight at a time.
    pub async fn sync_all(
        &self,
        client: &dyn SourceClient,
        sources: &[SourceConfig],
    ) -> Vec<SyncReport> {
        let concurrency = self.config.fetch_concurrency.max(1);
        stream::iter(sources)
            .map(|source| self.sync_source(client, source))
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Delete a source and everything scoped to it, and arm the race guard so
    /// an in-flight sync of this source cannot resurrect its rows.
    pub async fn delete_source(&self, source_id: &str) -> Result<(), StoreError> {
        self.guard.mark_deleted(source_id);
        info!(source = source_id, "deleting source data");

        for schema in [&CHANNELS, &CATEGORIES, &PROGRAMS, &VOD_MOVIES, &VOD_SERIES] {
            let adapter = self.store.table(schema.name)?;
            let source_field = schema.source_field.unwrap_or("source_id");
            adapter
                .query()
                .where_eq(source_field, Value::String(source_id.to_string()))
                .delete()
                .await?;
        }
        self.store
            .table("sources_meta")?
            .delete(&Value::String(source_id.to_string()))
            .await?;
        Ok(())
    }

    async fn run_live(
        &self,
        client: &dyn SourceClient,
        source: &SourceConfig,
    ) -> Result<Vec<KindOutcome>, String> {
        let existing_channels = self
            .load_existing(&CHANNELS, &source.id)
            .map_err(|e| e.to_string())?;
        let existing_categories = self
            .load_existing(&CATEGORIES, &source.id)
            .map_err(|e| e.to_string())?;

        let catalog = client
            .fetch_live_catalog(source)
            .await
            .map_err(|e| e.to_string())?;

        let fresh_channels: Vec<Record> = catalog
            .channels
            .iter()
            .map(|c| to_record(c, &source.id))
            .collect();
        let fresh_categories: Vec<Record> = catalog
            .categories
            .iter()
            .map(|c| to_record(c, &source.id))
            .collect();

        if self.guard.is_deleted(&source.id) {
            info!(source = %source.id, "source deleted during sync, discarding results");
            return Ok(vec![
                KindOutcome::skipped(CHANNELS.name),
                KindOutcome::skipped(CATEGORIES.name),
            ]);
        }

        let channels = self
            .reconcile_kind(&CHANNELS, source, existing_channels, fresh_channels)
            .await
            .map_err(|e| e.to_string())?;
        let categories = self
            .reconcile_kind(&CATEGORIES, source, existing_categories, fresh_categories)
            .await
            .map_err(|e| e.to_string())?;

        if !self.guard.is_deleted(&source.id) {
            let mut patch = Record::new();
            patch.insert("last_synced".into(), Value::String(Utc::now().to_rfc3339()));
            if !channels.skipped {
                let count = self.count_for_source(&CHANNELS, &source.id)?;
                patch.insert("channel_count".into(), Value::from(count));
            }
            if !categories.skipped {
                let count = self.count_for_source(&CATEGORIES, &source.id)?;
                patch.insert("category_count".into(), Value::from(count));
            }
            if let Some(epg_url) = catalog.epg_url.as_ref().or(source.epg_url.as_ref()) {
                patch.insert("epg_url".into(), Value::String(epg_url.clone()));
            }
            patch.insert("error".into(), Value::Null);
            patch_source_meta(&self.store, &source.id, patch)
                .await
                .map_err(|e| e.to_string())?;
        }

        Ok(vec![channels, categories])
    }

    async fn run_vod(
        &self,
        client: &dyn SourceClient,
        source: &SourceConfig,
    ) -> Result<Vec<KindOutcome>, String> {
        let existing_movies = self
            .load_existing(&VOD_MOVIES, &source.id)
            .map_err(|e| e.to_string())?;
        let existing_series = self
            .load_existing(&VOD_SERIES, &source.id)
            .map_err(|e| e.to_string())?;

        let catalog = client
            .fetch_vod_catalog(source)
            .await
            .map_err(|e| e.to_string())?;

        let fresh_movies: Vec<Record> = catalog
            .movies
            .iter()
            .map(|m| to_record(m, &source.id))
            .collect();
        let fresh_series: Vec<Record> = catalog
            .series
            .iter()
            .map(|s| to_record(s, &source.id))
            .collect();

        if self.guard.is_deleted(&source.id) {
            info!(source = %source.id, "source deleted during sync, discarding results");
            return Ok(vec![
                KindOutcome::skipped(VOD_MOVIES.name),
                KindOutcome::skipped(VOD_SERIES.name),
            ]);
        }

        let movies = self
            .reconcile_kind(&VOD_MOVIES, source, existing_movies, fresh_movies)
            .await
            .map_err(|e| e.to_string())?;
        let series = self
            .reconcile_kind(&VOD_SERIES, source, existing_series, fresh_series)
            .await
            .map_err(|e| e.to_string())?;

        if !self.guard.is_deleted(&source.id) {
            let mut patch = Record::new();
            patch.insert(
                "vod_last_synced".into(),
                Value::String(Utc::now().to_rfc3339()),
            );
            if !movies.skipped {
                let count = self.count_for_source(&VOD_MOVIES, &source.id)?;
                patch.insert("vod_movie_count".into(), Value::from(count));
            }
            if !series.skipped {
                let count = self.count_for_source(&VOD_SERIES, &source.id)?;
                patch.insert("vod_series_count".into(), Value::from(count));
            }
            patch.insert("error".into(), Value::Null);
            patch_source_meta(&self.store, &source.id, patch)
                .await
                .map_err(|e| e.to_string())?;
        }

        Ok(vec![movies, series])
    }

    async fn run_epg(
        &self,
        client: &dyn SourceClient,
        source: &SourceConfig,
    ) -> Result<KindOutcome, String> {
        let adapter = self.store.table(PROGRAMS.name).map_err(|e| e.to_string())?;
        let existing = adapter
            .query()
            .where_eq("source_id", Value::String(source.id.clone()))
            .count()
            .map_err(|e| e.to_string())?;

        let programs = client.fetch_epg(source).await.map_err(|e| e.to_string())?;

        if programs.is_empty() && existing > 0 {
            warn!(source = %source.id, "provider returned no programs but local ones exist, skipping");
            return Ok(KindOutcome::skipped(PROGRAMS.name));
        }

        if self.guard.is_deleted(&source.id) {
            info!(source = %source.id, "source deleted during sync, discarding results");
            return Ok(KindOutcome::skipped(PROGRAMS.name));
        }

        // Duplicate program ids within one payload are dropped, first wins.
        let mut seen = HashSet::new();
        let records: Vec<Record> = programs
            .iter()
            .filter(|p| seen.insert(p.id.clone()))
            .map(|p| to_record(p, &source.id))
            .collect();

        let deleted = adapter
            .query()
            .where_eq("source_id", Value::String(source.id.clone()))
            .delete()
            .await
            .map_err(|e| e.to_string())?;
        let added = adapter
            .bulk_add(&records)
            .await
            .map_err(|e| e.to_string())?;

        Ok(KindOutcome::applied(PROGRAMS.name, added, 0, deleted))
    }

    async fn reconcile_kind(
        &self,
        schema: &'static KindSchema,
        source: &SourceConfig,
        existing: HashMap<String, Record>,
        fresh: Vec<Record>,
    ) -> Result<KindOutcome, StoreError> {
        if fresh.is_empty() && !existing.is_empty() {
            warn!(
                kind = schema.name,
                source = %source.id,
                local = existing.len(),
                "provider returned no entities but local rows exist, skipping"
            );
            return Ok(KindOutcome::skipped(schema.name));
        }

        let diff = diff_kind(schema, &existing, fresh);

        if self.guard.is_deleted(&source.id) {
            info!(kind = schema.name, source = %source.id, "source deleted during sync, discarding results");
            return Ok(KindOutcome::skipped(schema.name));
        }

        let adapter = self.store.table(schema.name)?;
        adapter.bulk_put(&diff.upserts).await?;
        let deleted = adapter.bulk_delete(&diff.deleted_keys).await?;

        info!(
            kind = schema.name,
            source = %source.id,
            added = diff.added,
            updated = diff.updated,
            unchanged = diff.unchanged,
            deleted,
            "reconciled"
        );
        Ok(KindOutcome::applied(
            schema.name,
            diff.added,
            diff.updated,
            deleted,
        ))
    }

    fn load_existing(
        &self,
        schema: &'static KindSchema,
        source_id: &str,
    ) -> Result<HashMap<String, Record>, StoreError> {
        let adapter = self.store.table(schema.name)?;
        let source_field = schema.source_field.unwrap_or("source_id");
        let rows = adapter
            .query()
            .where_eq(source_field, Value::String(source_id.to_string()))
            .to_vec()?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in rows {
            if let Some(key) = row.get(schema.primary_key) {
                map.insert(key_string(key), row);
            }
        }
        Ok(map)
    }

    fn count_for_source(
        &self,
        schema: &'static KindSchema,
        source_id: &str,
    ) -> Result<u64, String> {
        let adapter = self.store.table(schema.name).map_err(|e| e.to_string())?;
        let source_field = schema.source_field.unwrap_or("source_id");
        adapter
            .query()
            .where_eq(source_field, Value::String(source_id.to_string()))
            .count()
            .map_err(|e| e.to_string())
    }

    /// Record a run-level failure in the source's metadata, unless the source
    /// was deleted mid-run.
    async fn record_failure(&self, source: &SourceConfig, error: &str) {
        if self.guard.is_deleted(&source.id) {
            return;
        }
        let mut patch = Record::new();
        patch.insert("error".into(), Value::String(error.to_string()));
        if let Err(e) = patch_source_meta(&self.store, &source.id, patch).await {
            warn!(source = %source.id, "failed to record sync error: {e}");
        }
    }
}

fn observe_outcomes(catalog: &str, timer: Instant, outcomes: &[KindOutcome]) {
    for outcome in outcomes {
        let result = if !outcome.success {
            "failed"
        } else if outcome.skipped {
            "skipped"
        } else {
            "applied"
        };
        metrics::SYNC_RUNS
            .with_label_values(&[outcome.kind, result])
            .inc();
        metrics::SYNC_ROWS
            .with_label_values(&[outcome.kind, "added"])
            .inc_by(outcome.added as u64);
        metrics::SYNC_ROWS
            .with_label_values(&[outcome.kind, "updated"])
            .inc_by(outcome.updated as u64);
        metrics::SYNC_ROWS
            .with_label_values(&[outcome.kind, "deleted"])
            .inc_by(outcome.deleted as u64);
    }
    metrics::SYNC_DURATION
        .with_label_values(&[catalog])
        .observe(timer.elapsed().as_secs_f64());
}

fn log_report(catalog: &str, report: &SyncReport) {
    for outcome in &report.outcomes {
        info!(
            catalog,
            source = %report.source_id,
            kind = outcome.kind,
            success = outcome.success,
            skipped = outcome.skipped,
            added = outcome.added,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "sync outcome"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn existing_channel(id: &str, name: &str, favorite: bool) -> (String, Record) {
        (
            id.to_string(),
            record(&[
                ("stream_id", json!(id)),
                ("source_id", json!("src-1")),
                ("name", json!(name)),
                ("is_favorite", json!(favorite)),
                ("enabled", json!(true)),
            ]),
        )
    }

    fn fresh_channel(id: &str, name: &str) -> Record {
        record(&[
            ("stream_id", json!(id)),
            ("source_id", json!("src-1")),
            ("name", json!(name)),
        ])
    }

    #[test]
    fn test_diff_partitions_new_changed_unchanged_deleted() {
        let existing: HashMap<String, Record> = [
            existing_channel("A", "Alpha", true),
            existing_channel("B", "Beta", false),
            existing_channel("C", "Gamma", false),
        ]
        .into_iter()
        .collect();

        let fresh = vec![
            fresh_channel("A", "Alpha Renamed"),
            fresh_channel("C", "Gamma"),
            fresh_channel("D", "Delta"),
        ];
        let diff = diff_kind(&CHANNELS, &existing, fresh);

        assert_eq!(diff.added, 1);
        assert_eq!(diff.updated, 1);
        assert_eq!(diff.unchanged, 1);
        assert_eq!(diff.deleted_keys, vec![json!("B")]);
    }

    #[test]
    fn test_diff_carries_user_owned_fields_forward() {
        let existing: HashMap<String, Record> =
            [existing_channel("A", "Alpha", true)].into_iter().collect();
        let fresh = vec![fresh_channel("A", "Alpha Renamed")];

        let diff = diff_kind(&CHANNELS, &existing, fresh);
        let upsert = &diff.upserts[0];
        assert_eq!(upsert["is_favorite"], json!(true));
        assert_eq!(upsert["enabled"], json!(true));
        assert_eq!(upsert["name"], json!("Alpha Renamed"));
    }

    #[test]
    fn test_diff_defaults_user_owned_fields_for_new() {
        let existing: HashMap<String, Record> =
            [existing_channel("A", "Alpha", true)].into_iter().collect();
        let fresh = vec![fresh_channel("A", "Alpha"), fresh_channel("B", "Beta")];

        let diff = diff_kind(&CHANNELS, &existing, fresh);
        assert_eq!(diff.upserts.len(), 1);
        let new_row = &diff.upserts[0];
        assert_eq!(new_row["stream_id"], json!("B"));
        // Defaults, not values carried from the unrelated favorited row.
        assert_eq!(new_row["is_favorite"], json!(false));
        assert_eq!(new_row["enabled"], json!(true));
    }

    #[test]
    fn test_diff_unchanged_identity_produces_no_upsert() {
        let existing: HashMap<String, Record> =
            [existing_channel("A", "Alpha", false)].into_iter().collect();
        let fresh = vec![fresh_channel("A", "Alpha")];

        let diff = diff_kind(&CHANNELS, &existing, fresh);
        assert!(diff.upserts.is_empty());
        assert_eq!(diff.unchanged, 1);
    }

    #[test]
    fn test_diff_duplicate_fresh_keys_last_wins() {
        let existing = HashMap::new();
        let fresh = vec![fresh_channel("A", "First"), fresh_channel("A", "Second")];

        let diff = diff_kind(&CHANNELS, &existing, fresh);
        assert_eq!(diff.added, 1);
        assert_eq!(diff.upserts[0]["name"], json!("Second"));
    }

    #[test]
    fn test_values_equal_treats_absent_as_null() {
        assert!(values_equal(None, Some(&Value::Null)));
        assert!(!values_equal(None, Some(&json!("x"))));
        assert!(values_equal(Some(&json!(1)), Some(&json!(1.0))));
    }
}
