//! Composable queries over one entity kind.
//!
//! A [`Query`] is built fluently and lowered to a single SQL statement at the
//! terminal call. Filters that SQL cannot express go through
//! [`Query::filter`], which returns a [`Collection`]: an escape hatch that
//! materializes the whole table per call (O(table size)). Prefer the
//! pushed-down query path for selective deletes on large tables.

use std::cmp::Ordering;
use std::sync::Arc;

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use super::handle::StoreInner;
use super::normalize::{expose_row, sql_to_value, stored_field, Record};
use super::notifier::{ChangeEvent, ChangeType};
use super::schema::KindSchema;
use super::StoreError;

enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    JsonContains(String, String),
    Raw { clause: String, params: Vec<Value> },
}

/// Lazily-built query over one kind.
pub struct Query {
    inner: Arc<StoreInner>,
    schema: &'static KindSchema,
    filters: Vec<Filter>,
    limit: Option<u64>,
    offset: u64,
    reverse: bool,
    sort_field: Option<String>,
}

impl Query {
    pub(crate) fn new(inner: Arc<StoreInner>, schema: &'static KindSchema) -> Self {
        Self {
            inner,
            schema,
            filters: Vec::new(),
            limit: None,
            offset: 0,
            reverse: false,
            sort_field: None,
        }
    }

    /// Equality filter on one field.
    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter::Eq(field.into(), value));
        self
    }

    /// "Value is one of" filter.
    pub fn where_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filters.push(Filter::In(field.into(), values));
        self
    }

    /// Free-form predicate with bound parameters, for conditions the typed
    /// filters cannot express. The clause is AND-ed with the other filters.
    pub fn where_raw(mut self, clause: impl Into<String>, params: Vec<Value>) -> Self {
        self.filters.push(Filter::Raw {
            clause: clause.into(),
            params,
        });
        self
    }

    /// Membership of `id` in a JSON-array field, matched against the raw
    /// stored text. The pattern is anchored with the JSON quote characters so
    /// `"1"` never matches inside `"10"`.
    pub fn where_json_array_contains(mut self, field: impl Into<String>, id: &str) -> Self {
        self.filters
            .push(Filter::JsonContains(field.into(), id.to_string()));
        self
    }

    /// Maximum number of rows.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Reverse result order.
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Sort results by `field`. Always fully materializes the result set
    /// before sorting; the store's native ordering is not requested.
    pub fn sort_by(mut self, field: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self
    }

    /// Client-side predicate escape hatch. The resulting [`Collection`]
    /// materializes the full filtered table on every terminal call.
    pub fn filter<F>(self, predicate: F) -> Collection
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Collection {
            query: self,
            predicate: Box::new(predicate),
        }
    }

    fn lower_filters(&self) -> Result<(String, Vec<SqlValue>), StoreError> {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        for filter in &self.filters {
            match filter {
                Filter::Eq(field, value) => {
                    self.schema.require_column(field)?;
                    if value.is_null() {
                        clauses.push(format!("\"{}\" IS NULL", field));
                    } else {
                        clauses.push(format!("\"{}\" = ?", field));
                        params.push(stored_field(self.schema, field, value));
                    }
                }
                Filter::In(field, values) => {
                    self.schema.require_column(field)?;
                    if values.is_empty() {
                        // Empty membership set matches nothing.
                        clauses.push("0 = 1".to_string());
                        continue;
                    }
                    let placeholders = vec!["?"; values.len()].join(", ");
                    clauses.push(format!("\"{}\" IN ({})", field, placeholders));
                    for value in values {
                        params.push(stored_field(self.schema, field, value));
                    }
                }
                Filter::JsonContains(field, id) => {
                    self.schema.require_column(field)?;
                    let escaped = id
                        .replace('\\', "\\\\")
                        .replace('%', "\\%")
                        .replace('_', "\\_");
                    clauses.push(format!("\"{}\" LIKE ? ESCAPE '\\'", field));
                    params.push(SqlValue::Text(format!("%\"{}\"%", escaped)));
                }
                Filter::Raw { clause, params: raw } => {
                    clauses.push(format!("({})", clause));
                    for value in raw {
                        params.push(match value {
                            Value::Null => SqlValue::Null,
                            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
                            Value::Number(n) => n
                                .as_i64()
                                .map(SqlValue::Integer)
                                .unwrap_or_else(|| SqlValue::Real(n.as_f64().unwrap_or(0.0))),
                            Value::String(s) => SqlValue::Text(s.clone()),
                            other => SqlValue::Text(other.to_string()),
                        });
                    }
                }
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        Ok((where_sql, params))
    }

    fn lower_select(&self, projection: &str) -> Result<(String, Vec<SqlValue>), StoreError> {
        if let Some(field) = &self.sort_field {
            self.schema.require_column(field)?;
        }
        let (where_sql, params) = self.lower_filters()?;
        let mut sql = format!("SELECT {} FROM \"{}\"{}", projection, self.schema.name, where_sql);
        if self.sort_field.is_none() && self.reverse {
            sql.push_str(" ORDER BY rowid DESC");
        }
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
            }
            (None, offset) if offset > 0 => {
                sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset));
            }
            _ => {}
        }
        Ok((sql, params))
    }

    fn fetch_rows(&self) -> Result<Vec<Record>, StoreError> {
        let (sql, params) = self.lower_select("*")?;
        let conn = self.inner.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from_sqlite)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();

        let mut out = Vec::new();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(StoreError::from_sqlite)?;
        while let Some(row) = rows.next().map_err(StoreError::from_sqlite)? {
            let mut values = Vec::with_capacity(names.len());
            for i in 0..names.len() {
                let raw = row.get_ref(i).map_err(StoreError::from_sqlite)?;
                values.push(sql_to_value(raw));
            }
            out.push(expose_row(self.schema, &names, values));
        }
        Ok(out)
    }

    /// Execute and return all matching records.
    pub fn to_vec(&self) -> Result<Vec<Record>, StoreError> {
        let mut rows = self.fetch_rows()?;
        if let Some(field) = &self.sort_field {
            rows.sort_by(|a, b| {
                cmp_values(
                    a.get(field.as_str()).unwrap_or(&Value::Null),
                    b.get(field.as_str()).unwrap_or(&Value::Null),
                )
            });
            if self.reverse {
                rows.reverse();
            }
        }
        Ok(rows)
    }

    /// Execute and return the first matching record.
    pub fn first(&self) -> Result<Option<Record>, StoreError> {
        if self.sort_field.is_some() {
            return Ok(self.to_vec()?.into_iter().next());
        }
        let (sql, params) = self.lower_select_limited()?;
        let conn = self.inner.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql).map_err(StoreError::from_sqlite)?;
        let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
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

    fn lower_select_limited(&self) -> Result<(String, Vec<SqlValue>), StoreError> {
        let (where_sql, params) = self.lower_filters()?;
        let mut sql = format!("SELECT * FROM \"{}\"{}", self.schema.name, where_sql);
        if self.reverse {
            sql.push_str(" ORDER BY rowid DESC");
        }
        sql.push_str(&format!(" LIMIT 1 OFFSET {}", self.offset));
        Ok((sql, params))
    }

    /// Count matching rows (limit/offset are ignored).
    pub fn count(&self) -> Result<u64, StoreError> {
        let (where_sql, params) = self.lower_filters()?;
        let sql = format!("SELECT COUNT(*) FROM \"{}\"{}", self.schema.name, where_sql);
        let conn = self.inner.conn.lock().unwrap();
        conn.query_row(
            &sql,
            rusqlite::params_from_iter(params.iter()),
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as u64)
        .map_err(StoreError::from_sqlite)
    }

    /// Delete matching rows. Serialized; notifies once with the affected
    /// keys. When limit/offset/sort are set the keys are materialized first;
    /// otherwise the predicate is pushed down into a single DELETE.
    pub async fn delete(self) -> Result<usize, StoreError> {
        let inner = Arc::clone(&self.inner);
        let schema = self.schema;

        if self.limit.is_some() || self.offset > 0 || self.sort_field.is_some() {
            let keys: Vec<Value> = self
                .to_vec()?
                .into_iter()
                .filter_map(|mut r| r.remove(schema.primary_key))
                .collect();
            return delete_by_keys(&inner, schema, &keys).await;
        }

        let (where_sql, params) = self.lower_filters()?;
        inner
            .serializer
            .run(|| async {
                let keys = {
                    let conn = inner.conn.lock().unwrap();
                    let sql = format!(
                        "DELETE FROM \"{}\"{} RETURNING \"{}\"",
                        schema.name, where_sql, schema.primary_key
                    );
                    let mut stmt = conn.prepare(&sql).map_err(StoreError::from_sqlite)?;
                    let mut rows = stmt
                        .query(rusqlite::params_from_iter(params.iter()))
                        .map_err(StoreError::from_sqlite)?;
                    let mut keys = Vec::new();
                    while let Some(row) = rows.next().map_err(StoreError::from_sqlite)? {
                        let raw = row.get_ref(0).map_err(StoreError::from_sqlite)?;
                        keys.push(sql_to_value(raw));
                    }
                    keys
                };
                if !keys.is_empty() {
                    inner.notifier.notify(ChangeEvent {
                        kind: schema.name,
                        change: ChangeType::Delete,
                        keys: Some(keys.clone()),
                    });
                }
                Ok(keys.len())
            })
            .await
    }
}

async fn delete_by_keys(
    inner: &Arc<StoreInner>,
    schema: &'static KindSchema,
    keys: &[Value],
) -> Result<usize, StoreError> {
    if keys.is_empty() {
        return Ok(0);
    }
    inner
        .serializer
        .run(|| async {
            let mut affected = 0usize;
            for chunk in keys.chunks(inner.max_bound_params.max(1)) {
                let conn = inner.conn.lock().unwrap();
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "DELETE FROM \"{}\" WHERE \"{}\" IN ({})",
                    schema.name, schema.primary_key, placeholders
                );
                let params: Vec<SqlValue> = chunk
                    .iter()
                    .map(|k| stored_field(schema, schema.primary_key, k))
                    .collect();
                affected += conn
                    .execute(&sql, rusqlite::params_from_iter(params.iter()))
                    .map_err(StoreError::from_sqlite)?;
            }
            if affected > 0 {
                inner.notifier.notify(ChangeEvent {
                    kind: schema.name,
                    change: ChangeType::Delete,
                    keys: Some(keys.to_vec()),
                });
            }
            Ok(affected)
        })
        .await
}

/// Query plus a client-side predicate.
///
/// Every terminal call materializes the full (SQL-filtered) row set before
/// applying the predicate: O(table size) when no SQL filters are present.
pub struct Collection {
    query: Query,
    predicate: Box<dyn Fn(&Record) -> bool + Send + Sync>,
}

impl Collection {
    /// All records matching the predicate.
    pub fn to_vec(&self) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .query
            .to_vec()?
            .into_iter()
            .filter(|r| (self.predicate)(r))
            .collect())
    }

    /// First record matching the predicate.
    pub fn first(&self) -> Result<Option<Record>, StoreError> {
        Ok(self.to_vec()?.into_iter().next())
    }

    /// Count of records matching the predicate.
    pub fn count(&self) -> Result<u64, StoreError> {
        Ok(self.to_vec()?.len() as u64)
    }

    /// Delete all records matching the predicate. Materializes keys first,
    /// then deletes by key in one serialized operation.
    pub async fn delete(self) -> Result<usize, StoreError> {
        let schema = self.query.schema;
        let inner = Arc::clone(&self.query.inner);
        let keys: Vec<Value> = self
            .to_vec()?
            .into_iter()
            .filter_map(|mut r| r.remove(schema.primary_key))
            .collect();
        delete_by_keys(&inner, schema, &keys).await
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < composite.
pub(crate) fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
