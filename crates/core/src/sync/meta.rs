//! Source sync metadata writes.
//!
//! One `sources_meta` row per source, created on the first sync attempt and
//! patched after every run. Patches name only the fields they set, so a live
//! sync does not clobber VOD timestamps and vice versa.

use serde_json::Value;

use crate::store::{CatalogStore, Record, StoreError};

/// Apply a partial update to a source's metadata row, creating it if absent.
pub(crate) async fn patch_source_meta(
    store: &CatalogStore,
    source_id: &str,
    patch: Record,
) -> Result<(), StoreError> {
    let meta = store.table("sources_meta")?;
    let key = Value::String(source_id.to_string());

    if meta.update(&key, &patch).await? > 0 {
        return Ok(());
    }

    let mut record = patch.clone();
    record.insert("source_id".into(), key.clone());
    match meta.add(&record).await {
        Ok(_) => Ok(()),
        // Another writer created the row between update and add.
        Err(StoreError::DuplicateKey { .. }) => {
            meta.update(&key, &patch).await?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_patch_creates_row_when_absent() {
        let store = CatalogStore::in_memory().unwrap();
        patch_source_meta(
            &store,
            "src-1",
            patch(&[("channel_count", json!(12)), ("error", Value::Null)]),
        )
        .await
        .unwrap();

        let row = store
            .table("sources_meta")
            .unwrap()
            .get(&json!("src-1"))
            .unwrap()
            .unwrap();
        assert_eq!(row["channel_count"], json!(12));
    }

    #[tokio::test]
    async fn test_patch_preserves_unnamed_fields() {
        let store = CatalogStore::in_memory().unwrap();
        patch_source_meta(
            &store,
            "src-1",
            patch(&[
                ("last_synced", json!("2024-06-01T10:00:00Z")),
                ("channel_count", json!(12)),
            ]),
        )
        .await
        .unwrap();
        patch_source_meta(
            &store,
            "src-1",
            patch(&[("vod_last_synced", json!("2024-06-02T10:00:00Z"))]),
        )
        .await
        .unwrap();

        let row = store
            .table("sources_meta")
            .unwrap()
            .get(&json!("src-1"))
            .unwrap()
            .unwrap();
        assert_eq!(row["last_synced"], json!("2024-06-01T10:00:00Z"));
        assert_eq!(row["vod_last_synced"], json!("2024-06-02T10:00:00Z"));
        assert_eq!(row["channel_count"], json!(12));
    }

    #[tokio::test]
    async fn test_patch_clears_error_with_explicit_null() {
        let store = CatalogStore::in_memory().unwrap();
        patch_source_meta(&store, "src-1", patch(&[("error", json!("boom"))]))
            .await
            .unwrap();
        patch_source_meta(&store, "src-1", patch(&[("error", Value::Null)]))
            .await
            .unwrap();

        let row = store
            .table("sources_meta")
            .unwrap()
            .get(&json!("src-1"))
            .unwrap()
            .unwrap();
        assert_eq!(row["error"], Value::Null);
    }
}
