//! Per-entity-kind table adapter.
//!
//! One adapter per kind, all sharing the store's connection, write serializer
//! and change notifier. Mutations acquire the serializer and broadcast a
//! change event after commit; reads go straight to the connection.

use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::bulk::{self, BulkWriteOp};
use super::handle::StoreInner;
use super::normalize::{expose_row, sql_to_value, stored_field, Record};
use super::notifier::{ChangeEvent, ChangeType};
use super::query::Query;
use super::schema::KindSchema;
use super::StoreError;

/// Table adapter for one entity kind.
#[derive(Clone)]
pub struct TableAdapter {
    pub(crate) inner: Arc<StoreInner>,
    pub(crate) schema: &'static KindSchema,
}

/// Human-readable key for error messages.
pub(crate) fn key_display(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TableAdapter {
    pub(crate) fn new(inner: Arc<StoreInner>, schema: &'static KindSchema) -> Self {
        Self { inner, schema }
    }

    /// The entity kind this adapter serves.
    pub fn kind(&self) -> &'static str {
        self.schema.name
    }

    fn validate_fields(&self, record: &Record) -> Result<(), StoreError> {
        for field in record.keys() {
            self.schema.require_column(field)?;
        }
        Ok(())
    }

    fn require_key<'r>(&self, record: &'r Record) -> Result<&'r Value, StoreError> {
        match record.get(self.schema.primary_key) {
            Some(key) if !key.is_null() => Ok(key),
            _ => Err(StoreError::MissingPrimaryKey {
                kind: self.schema.name,
                field: self.schema.primary_key,
            }),
        }
    }

    fn notify(&self, change: ChangeType, keys: Option<Vec<Value>>) {
        self.inner.notifier.notify(ChangeEvent {
            kind: self.schema.name,
            change,
            keys,
        });
    }

    /// Single-row read by primary key. Not serialized.
    pub fn get(&self, key: &Value) -> Result<Option<Record>, StoreError> {
        let conn = self.inner.conn.lock().unwrap();
        let sql = format!(
            "SELECT * FROM \"{}\" WHERE \"{}\" = ?",
            self.schema.name, self.schema.primary_key
        );
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from_sqlite)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let stored_key = stored_field(self.schema, self.schema.primary_key, key);

        let mut rows = stmt
            .query([stored_key])
            .map_err(StoreError::from_sqlite)?;
        match rows.next().map_err(StoreError::from_sqlite)? {
            Some(row) => {
                let mut values = Vec::with_capacity(names.len());
                for i in 0..names.len() {
                    let raw = row.get_ref(i).map_err(StoreError::from_sqlite)?;
                    values.push(sql_to_value(raw));
                }
                Ok(Some(expose_row(self.schema, &names, values)))
            }
            None => Ok(None),
        }
    }

    /// Insert a new row. Fails with [`StoreError::DuplicateKey`] if the
    /// primary key already exists. Returns the supplied key.
    pub async fn add(&self, record: &Record) -> Result<Value, StoreError> {
        self.validate_fields(record)?;
        let key = self.require_key(record)?.clone();

        self.inner
            .serializer
            .run(|| async {
                {
                    let conn = self.inner.conn.lock().unwrap();
                    let (sql, params) = self.insert_statement(record, BulkWriteOp::Insert);
                    conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                        .map_err(|e| self.map_insert_error(e, &key))?;
                }
                self.notify(ChangeType::Add, Some(vec![key.clone()]));
                Ok(key.clone())
            })
            .await
    }

    /// Insert-or-replace by primary key.
    pub async fn put(&self, record: &Record) -> Result<Value, StoreError> {
        self.validate_fields(record)?;
        let key = self.require_key(record)?.clone();

        self.inner
            .serializer
            .run(|| async {
                {
                    let conn = self.inner.conn.lock().unwrap();
                    let (sql, params) = self.insert_statement(record, BulkWriteOp::Upsert);
                    conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                        .map_err(StoreError::from_sqlite)?;
                }
                self.notify(ChangeType::Update, Some(vec![key.clone()]));
                Ok(key.clone())
            })
            .await
    }

    /// Update only the named fields of one row. Returns the affected row
    /// count (0 or 1). The primary key field itself is never rewritten.
    pub async fn update(&self, key: &Value, changes: &Record) -> Result<usize, StoreError> {
        self.validate_fields(changes)?;
        let fields: Vec<(&String, &Value)> = changes
            .iter()
            .filter(|(name, _)| name.as_str() != self.schema.primary_key)
            .collect();
        if fields.is_empty() {
            return Ok(0);
        }

        self.inner
            .serializer
            .run(|| async {
                let affected = {
                    let conn = self.inner.conn.lock().unwrap();
                    let assignments: Vec<String> = fields
                        .iter()
                        .map(|(name, _)| format!("\"{}\" = ?", name))
                        .collect();
                    let sql = format!(
                        "UPDATE \"{}\" SET {} WHERE \"{}\" = ?",
                        self.schema.name,
                        assignments.join(", "),
                        self.schema.primary_key
                    );
                    let mut params: Vec<SqlValue> = fields
                        .iter()
                        .map(|(name, value)| stored_field(self.schema, name, value))
                        .collect();
                    params.push(stored_field(self.schema, self.schema.primary_key, key));
                    conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
                        .map_err(StoreError::from_sqlite)?
                };
                if affected > 0 {
                    self.notify(ChangeType::Update, Some(vec![key.clone()]));
                }
                Ok(affected)
            })
            .await
    }

    /// Delete one row by primary key. Returns whether a row was removed.
    pub async fn delete(&self, key: &Value) -> Result<bool, StoreError> {
        self.inner
            .serializer
            .run(|| async {
                let affected = {
                    let conn = self.inner.conn.lock().unwrap();
                    let sql = format!(
                        "DELETE FROM \"{}\" WHERE \"{}\" = ?",
                        self.schema.name, self.schema.primary_key
                    );
                    let stored_key = stored_field(self.schema, self.schema.primary_key, key);
                    conn.execute(&sql, [stored_key])
                        .map_err(StoreError::from_sqlite)?
                };
                if affected > 0 {
                    self.notify(ChangeType::Delete, Some(vec![key.clone()]));
                }
                Ok(affected > 0)
            })
            .await
    }

    /// Delete rows by primary key, chunked under the parameter bound.
    /// One serialized operation, one change event.
    pub async fn bulk_delete(&self, keys: &[Value]) -> Result<usize, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        self.inner
            .serializer
            .run(|| async {
                let mut affected = 0usize;
                for chunk in keys.chunks(self.inner.max_bound_params.max(1)) {
                    let conn = self.inner.conn.lock().unwrap();
                    let placeholders = vec!["?"; chunk.len()].join(", ");
                    let sql = format!(
                        "DELETE FROM \"{}\" WHERE \"{}\" IN ({})",
                        self.schema.name, self.schema.primary_key, placeholders
                    );
                    let params: Vec<SqlValue> = chunk
                        .iter()
                        .map(|k| stored_field(self.schema, self.schema.primary_key, k))
                        .collect();
                    affected += conn
                        .execute(&sql, rusqlite::params_from_iter(params.iter()))
                        .map_err(StoreError::from_sqlite)?;
                }
                if affected > 0 {
                    self.notify(ChangeType::Delete, Some(keys.to_vec()));
                }
                Ok(affected)
            })
            .await
    }

    /// Remove all rows of this kind.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.inner
            .serializer
            .run(|| async {
                {
                    let conn = self.inner.conn.lock().unwrap();
                    let sql = format!("DELETE FROM \"{}\"", self.schema.name);
                    conn.execute(&sql, []).map_err(StoreError::from_sqlite)?;
                }
                self.notify(ChangeType::Clear, None);
                Ok(())
            })
            .await
    }

    /// Row count for this kind. Not serialized.
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.inner.conn.lock().unwrap();
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.schema.name);
        conn.query_row(&sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(StoreError::from_sqlite)
    }

    /// Count rows matching a client-side predicate. Materializes the whole
    /// table; prefer `query().count()` when the condition is expressible.
    pub fn count_where<F>(&self, predicate: F) -> Result<u64, StoreError>
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.query().filter(predicate).count()
    }

    /// Bulk insert; duplicate keys fail. One change event for the whole call;
    /// an empty batch is a successful no-op with no event.
    pub async fn bulk_add(&self, records: &[Record]) -> Result<usize, StoreError> {
        self.bulk_write(records, BulkWriteOp::Insert, ChangeType::Add)
            .await
    }

    /// Bulk insert-or-replace. One change event for the whole call; an empty
    /// batch is a successful no-op with no event.
    pub async fn bulk_put(&self, records: &[Record]) -> Result<usize, StoreError> {
        self.bulk_write(records, BulkWriteOp::Upsert, ChangeType::Update)
            .await
    }

    async fn bulk_write(
        &self,
        records: &[Record],
        op: BulkWriteOp,
        change: ChangeType,
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let plan = bulk::plan_bulk(self.schema, records, self.inner.max_bound_params)?;

        self.inner
            .serializer
            .run(|| async {
                bulk::execute_bulk(
                    &self.inner.conn,
                    self.inner.native.as_ref(),
                    self.inner.native_min_chunk,
                    self.schema,
                    &plan,
                    op,
                )
                .await?;
                self.notify(change, Some(plan.keys.clone()));
                Ok(plan.total)
            })
            .await
    }

    /// Start building a query over this kind.
    pub fn query(&self) -> Query {
        Query::new(Arc::clone(&self.inner), self.schema)
    }

    fn insert_statement(&self, record: &Record, op: BulkWriteOp) -> (String, Vec<SqlValue>) {
        let verb = match op {
            BulkWriteOp::Insert => "INSERT",
            BulkWriteOp::Upsert => "INSERT OR REPLACE",
        };
        let columns: Vec<&String> = record.keys().collect();
        let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "{} INTO \"{}\" ({}) VALUES ({})",
            verb,
            self.schema.name,
            quoted.join(", "),
            placeholders
        );
        let params: Vec<SqlValue> = record
            .iter()
            .map(|(name, value)| stored_field(self.schema, name, value))
            .collect();
        (sql, params)
    }

    fn map_insert_error(&self, e: rusqlite::Error, key: &Value) -> StoreError {
        match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::DuplicateKey {
                    kind: self.schema.name,
                    key: key_display(key),
                }
            }
            other => StoreError::from_sqlite(other),
        }
    }
}

impl std::fmt::Debug for TableAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableAdapter")
            .field("kind", &self.schema.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::notifier::ChangeType;
    use crate::store::CatalogStore;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn channel(id: &str, name: &str) -> Record {
        let mut r = Record::new();
        r.insert("stream_id".into(), json!(id));
        r.insert("source_id".into(), json!("src-1"));
        r.insert("name".into(), json!(name));
        r.insert("is_favorite".into(), json!(false));
        r.insert("category_ids".into(), json!(["1", "2"]));
        r
    }

    #[tokio::test]
    async fn test_add_and_get_round_trip() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        let key = channels.add(&channel("10", "BBC One")).await.unwrap();
        assert_eq!(key, json!("10"));

        let row = channels.get(&json!("10")).unwrap().unwrap();
        assert_eq!(row["name"], json!("BBC One"));
        // Coercions applied on the way out.
        assert_eq!(row["is_favorite"], json!(false));
        assert_eq!(row["category_ids"], json!(["1", "2"]));
    }

    #[tokio::test]
    async fn test_add_duplicate_key_fails() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        channels.add(&channel("10", "BBC One")).await.unwrap();
        let err = channels.add(&channel("10", "BBC Two")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { kind: "channels", .. }));
    }

    #[tokio::test]
    async fn test_put_replaces_existing_row() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        channels.add(&channel("10", "BBC One")).await.unwrap();
        channels.put(&channel("10", "BBC One HD")).await.unwrap();

        let row = channels.get(&json!("10")).unwrap().unwrap();
        assert_eq!(row["name"], json!("BBC One HD"));
        assert_eq!(channels.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_partial_fields() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();
        channels.add(&channel("10", "BBC One")).await.unwrap();

        let mut changes = Record::new();
        changes.insert("is_favorite".into(), json!(true));
        let affected = channels.update(&json!("10"), &changes).await.unwrap();
        assert_eq!(affected, 1);

        let row = channels.get(&json!("10")).unwrap().unwrap();
        assert_eq!(row["is_favorite"], json!(true));
        assert_eq!(row["name"], json!("BBC One"));
    }

    #[tokio::test]
    async fn test_update_missing_row_affects_zero() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        let mut changes = Record::new();
        changes.insert("name".into(), json!("x"));
        assert_eq!(channels.update(&json!("404"), &changes).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_field() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        let mut changes = Record::new();
        changes.insert("nope".into(), json!(1));
        assert!(matches!(
            channels.update(&json!("10"), &changes).await,
            Err(StoreError::UnknownField { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();
        channels.add(&channel("1", "a")).await.unwrap();
        channels.add(&channel("2", "b")).await.unwrap();

        assert!(channels.delete(&json!("1")).await.unwrap());
        assert!(!channels.delete(&json!("1")).await.unwrap());
        assert_eq!(channels.count().unwrap(), 1);

        channels.clear().await.unwrap();
        assert_eq!(channels.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_put_and_bulk_delete() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        let records: Vec<Record> = (0..250)
            .map(|i| channel(&i.to_string(), &format!("ch {}", i)))
            .collect();
        assert_eq!(channels.bulk_put(&records).await.unwrap(), 250);
        assert_eq!(channels.count().unwrap(), 250);

        let keys: Vec<Value> = (0..100).map(|i| json!(i.to_string())).collect();
        assert_eq!(channels.bulk_delete(&keys).await.unwrap(), 100);
        assert_eq!(channels.count().unwrap(), 150);
    }

    #[tokio::test]
    async fn test_count_where_predicate() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();
        channels.add(&channel("1", "News HD")).await.unwrap();
        channels.add(&channel("2", "Sports")).await.unwrap();

        let matches = channels
            .count_where(|r| r["name"].as_str().is_some_and(|s| s.contains("HD")))
            .unwrap();
        assert_eq!(matches, 1);
    }

    #[tokio::test]
    async fn test_empty_bulk_is_silent_no_op() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        let events = std::sync::Arc::new(StdMutex::new(Vec::new()));
        let events_clone = std::sync::Arc::clone(&events);
        let _sub = store.changes().subscribe(move |e| {
            events_clone.lock().unwrap().push(e.change);
        });

        assert_eq!(channels.bulk_add(&[]).await.unwrap(), 0);
        assert_eq!(channels.bulk_put(&[]).await.unwrap(), 0);
        assert_eq!(channels.bulk_delete(&[]).await.unwrap(), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mutations_notify_in_commit_order() {
        let store = CatalogStore::in_memory().unwrap();
        let channels = store.table("channels").unwrap();

        let events = std::sync::Arc::new(StdMutex::new(Vec::new()));
        let events_clone = std::sync::Arc::clone(&events);
        let _sub = store.changes().subscribe(move |e| {
            events_clone.lock().unwrap().push((e.change, e.keys.clone()));
        });

        channels.add(&channel("1", "a")).await.unwrap();
        let mut changes = Record::new();
        changes.insert("name".into(), json!("b"));
        channels.update(&json!("1"), &changes).await.unwrap();
        channels.delete(&json!("1")).await.unwrap();

        let seen = events.lock().unwrap();
        assert_eq!(
            seen.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
            vec![ChangeType::Add, ChangeType::Update, ChangeType::Delete]
        );
        assert_eq!(seen[0].1, Some(vec![json!("1")]));
    }
}
