//! Bulk write planning and execution.
//!
//! A bulk call takes records with possibly heterogeneous field sets, computes
//! the union of field names across the whole batch, and chunks rows so no
//! single statement exceeds the store's bound-parameter limit. Records
//! missing a field bind null for it.
//!
//! Two strategies per chunk, in order:
//! 1. the native batched writer (one prepared statement in a transaction),
//!    for chunks of at least `native_min_chunk` rows;
//! 2. a single multi-row parameterized statement, used directly for small
//!    chunks and as the fallback when the native call fails.
//!
//! A native failure is retried via SQL for that chunk only and never aborts
//! the remaining chunks. Long loads yield to the scheduler every couple of
//! thousand rows.

use std::sync::Mutex;

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

use super::normalize::{stored_field, Record};
use super::schema::KindSchema;
use super::StoreError;

/// Rows between cooperative yields during bulk execution.
const YIELD_EVERY_ROWS: usize = 2_000;

/// Insert flavor for a bulk write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkWriteOp {
    /// Plain insert; duplicate primary keys fail the chunk.
    Insert,
    /// Insert-or-replace by primary key.
    Upsert,
}

impl BulkWriteOp {
    fn verb(self) -> &'static str {
        match self {
            BulkWriteOp::Insert => "INSERT",
            BulkWriteOp::Upsert => "INSERT OR REPLACE",
        }
    }
}

/// The native batched insert collaborator.
///
/// Any error it raises is treated as "use the SQL fallback for this chunk".
pub trait NativeBulkWriter: Send + Sync {
    fn write_chunk(
        &self,
        conn: &mut Connection,
        table: &str,
        columns: &[&'static str],
        rows: &[Vec<SqlValue>],
        op: BulkWriteOp,
    ) -> anyhow::Result<()>;
}

/// Default native writer: one prepared statement executed per row inside a
/// transaction.
pub struct TransactionBulkWriter;

impl NativeBulkWriter for TransactionBulkWriter {
    fn write_chunk(
        &self,
        conn: &mut Connection,
        table: &str,
        columns: &[&'static str],
        rows: &[Vec<SqlValue>],
        op: BulkWriteOp,
    ) -> anyhow::Result<()> {
        let tx = conn.transaction()?;
        {
            let placeholders = vec!["?"; columns.len()].join(", ");
            let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
            let sql = format!(
                "{} INTO \"{}\" ({}) VALUES ({})",
                op.verb(),
                table,
                quoted.join(", "),
                placeholders
            );
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// A chunked plan for one bulk call.
pub(crate) struct BulkPlan {
    /// Union of field names across all records, in schema column order.
    pub columns: Vec<&'static str>,
    /// Row chunks, each sized to respect the parameter bound.
    pub chunks: Vec<Vec<Vec<SqlValue>>>,
    /// Primary keys of all records, for the change event.
    pub keys: Vec<Value>,
    /// Total record count.
    pub total: usize,
}

/// Plan a bulk write: validate fields, compute the column union, coerce to
/// stored representations, and chunk under `max_params` bound parameters.
pub(crate) fn plan_bulk(
    schema: &'static KindSchema,
    records: &[Record],
    max_params: usize,
) -> Result<BulkPlan, StoreError> {
    // Union of fields across ALL records, not just the first.
    let mut present = vec![false; schema.columns.len()];
    for record in records {
        for field in record.keys() {
            let idx = schema
                .columns
                .iter()
                .position(|c| c.name == field.as_str())
                .ok_or_else(|| StoreError::UnknownField {
                    kind: schema.name,
                    field: field.clone(),
                })?;
            present[idx] = true;
        }
    }
    let columns: Vec<&'static str> = schema
        .columns
        .iter()
        .zip(&present)
        .filter(|(_, p)| **p)
        .map(|(c, _)| c.name)
        .collect();

    if !columns.contains(&schema.primary_key) {
        return Err(StoreError::MissingPrimaryKey {
            kind: schema.name,
            field: schema.primary_key,
        });
    }

    let mut keys = Vec::with_capacity(records.len());
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        let key = record.get(schema.primary_key);
        match key {
            Some(k) if !k.is_null() => keys.push(k.clone()),
            _ => {
                return Err(StoreError::MissingPrimaryKey {
                    kind: schema.name,
                    field: schema.primary_key,
                })
            }
        }
        let row: Vec<SqlValue> = columns
            .iter()
            .map(|col| match record.get(*col) {
                Some(value) => stored_field(schema, col, value),
                None => SqlValue::Null,
            })
            .collect();
        rows.push(row);
    }

    let rows_per_chunk = (max_params / columns.len().max(1)).max(1);
    let chunks = rows
        .chunks(rows_per_chunk)
        .map(|c| c.to_vec())
        .collect::<Vec<_>>();

    Ok(BulkPlan {
        columns,
        chunks,
        keys,
        total: records.len(),
    })
}

/// One multi-row parameterized statement for a chunk.
pub(crate) fn sql_chunk(
    conn: &Connection,
    table: &str,
    columns: &[&'static str],
    rows: &[Vec<SqlValue>],
    op: BulkWriteOp,
) -> Result<(), StoreError> {
    let row_placeholder = format!("({})", vec!["?"; columns.len()].join(", "));
    let placeholders = vec![row_placeholder; rows.len()].join(", ");
    let quoted: Vec<String> = columns.iter().map(|c| format!("\"{}\"", c)).collect();
    let sql = format!(
        "{} INTO \"{}\" ({}) VALUES {}",
        op.verb(),
        table,
        quoted.join(", "),
        placeholders
    );

    let params: Vec<&SqlValue> = rows.iter().flatten().collect();
    conn.execute(&sql, rusqlite::params_from_iter(params.iter()))
        .map_err(map_write_error(table))?;
    Ok(())
}

fn map_write_error(table: &str) -> impl Fn(rusqlite::Error) -> StoreError + '_ {
    move |e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Database(format!("constraint violation in {}: {}", table, e))
        }
        other => StoreError::from_sqlite(other),
    }
}

/// Execute a planned bulk write.
///
/// The caller is expected to hold the write serializer permit for the whole
/// call; the connection lock itself is taken per chunk so cooperative yields
/// between sub-batches do not pin the connection.
pub(crate) async fn execute_bulk(
    conn: &Mutex<Connection>,
    native: &dyn NativeBulkWriter,
    native_min_chunk: usize,
    schema: &'static KindSchema,
    plan: &BulkPlan,
    op: BulkWriteOp,
) -> Result<(), StoreError> {
    let mut written = 0usize;
    let mut last_yield = 0usize;

    for chunk in &plan.chunks {
        {
            let mut guard = conn.lock().unwrap();
            let use_native = chunk.len() >= native_min_chunk;
            let native_result = if use_native {
                native.write_chunk(&mut guard, schema.name, &plan.columns, chunk, op)
            } else {
                Err(anyhow::anyhow!("chunk below native threshold"))
            };

            if let Err(e) = native_result {
                if use_native {
                    warn!(
                        kind = schema.name,
                        rows = chunk.len(),
                        "native bulk write failed, retrying via SQL: {e}"
                    );
                }
                sql_chunk(&guard, schema.name, &plan.columns, chunk, op)?;
            }
        }

        written += chunk.len();
        if written - last_yield >= YIELD_EVERY_ROWS {
            last_yield = written;
            tokio::task::yield_now().await;
        }
    }

    debug!(kind = schema.name, rows = written, "bulk write applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::CHANNELS;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_plan_unions_fields_across_all_records() {
        let records = vec![
            record(&[("stream_id", json!("1")), ("name", json!("One"))]),
            record(&[("stream_id", json!("2")), ("stream_icon", json!("i.png"))]),
        ];
        let plan = plan_bulk(&CHANNELS, &records, 999).unwrap();

        assert_eq!(plan.columns, vec!["stream_id", "name", "stream_icon"]);
        // Missing fields bind null.
        assert_eq!(plan.chunks[0][0][2], SqlValue::Null);
        assert_eq!(plan.chunks[0][1][1], SqlValue::Null);
    }

    #[test]
    fn test_plan_respects_parameter_bound() {
        let records: Vec<Record> = (0..100)
            .map(|i| {
                record(&[
                    ("stream_id", json!(i.to_string())),
                    ("name", json!("ch")),
                    ("source_id", json!("s1")),
                ])
            })
            .collect();

        for max_params in [7, 10, 30, 999] {
            let plan = plan_bulk(&CHANNELS, &records, max_params).unwrap();
            let fields = plan.columns.len();
            for chunk in &plan.chunks {
                assert!(
                    chunk.len() * fields <= max_params || chunk.len() == 1,
                    "chunk of {} rows x {} fields exceeds {}",
                    chunk.len(),
                    fields,
                    max_params
                );
            }
            let total: usize = plan.chunks.iter().map(|c| c.len()).sum();
            assert_eq!(total, 100);
        }
    }

    #[test]
    fn test_plan_rejects_unknown_field() {
        let records = vec![record(&[("stream_id", json!("1")), ("bogus", json!(1))])];
        assert!(matches!(
            plan_bulk(&CHANNELS, &records, 999),
            Err(StoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_plan_rejects_missing_primary_key() {
        let records = vec![record(&[("name", json!("no key")), ("source_id", json!("s"))])];
        assert!(matches!(
            plan_bulk(&CHANNELS, &records, 999),
            Err(StoreError::MissingPrimaryKey { .. })
        ));
    }

    #[test]
    fn test_plan_coerces_stored_representation() {
        let records = vec![record(&[
            ("stream_id", json!("1")),
            ("is_favorite", json!(true)),
            ("category_ids", json!(["4", "7"])),
        ])];
        let plan = plan_bulk(&CHANNELS, &records, 999).unwrap();
        let row = &plan.chunks[0][0];

        let fav_idx = plan.columns.iter().position(|c| *c == "is_favorite").unwrap();
        let cat_idx = plan
            .columns
            .iter()
            .position(|c| *c == "category_ids")
            .unwrap();
        assert_eq!(row[fav_idx], SqlValue::Integer(1));
        assert_eq!(row[cat_idx], SqlValue::Text("[\"4\",\"7\"]".to_string()));
    }

    struct FailingWriter;

    impl NativeBulkWriter for FailingWriter {
        fn write_chunk(
            &self,
            _conn: &mut Connection,
            _table: &str,
            _columns: &[&'static str],
            _rows: &[Vec<SqlValue>],
            _op: BulkWriteOp,
        ) -> anyhow::Result<()> {
            anyhow::bail!("simulated native failure")
        }
    }

    fn test_conn() -> Mutex<Connection> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&crate::store::schema::ddl()).unwrap();
        Mutex::new(conn)
    }

    #[tokio::test]
    async fn test_native_failure_falls_back_to_sql() {
        let conn = test_conn();
        let records: Vec<Record> = (0..150)
            .map(|i| record(&[("stream_id", json!(i.to_string())), ("name", json!("ch"))]))
            .collect();
        let plan = plan_bulk(&CHANNELS, &records, 999).unwrap();

        execute_bulk(&conn, &FailingWriter, 100, &CHANNELS, &plan, BulkWriteOp::Upsert)
            .await
            .unwrap();

        let count: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM channels", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 150);
    }

    #[tokio::test]
    async fn test_small_chunks_skip_native_writer() {
        let conn = test_conn();
        let records: Vec<Record> = (0..5)
            .map(|i| record(&[("stream_id", json!(i.to_string())), ("name", json!("ch"))]))
            .collect();
        let plan = plan_bulk(&CHANNELS, &records, 999).unwrap();

        // FailingWriter would error if invoked; small chunks must go straight
        // to the SQL path.
        execute_bulk(&conn, &FailingWriter, 100, &CHANNELS, &plan, BulkWriteOp::Insert)
            .await
            .unwrap();

        let count: i64 = conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM channels", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 5);
    }
}
