//! Error types for the catalog store.

use thiserror::Error;

/// Errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `add` on a primary key that already exists. Not retried.
    #[error("duplicate key {key} in {kind}")]
    DuplicateKey { kind: &'static str, key: String },

    /// The record is missing its primary key field.
    #[error("record for {kind} is missing primary key field {field}")]
    MissingPrimaryKey {
        kind: &'static str,
        field: &'static str,
    },

    /// Entity kind is not declared in the schema catalog.
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    /// Field name not declared for this kind. Raised before any SQL is built
    /// from it.
    #[error("unknown field {field} for {kind}")]
    UnknownField { kind: &'static str, field: String },

    /// Store connection could not be established or was lost. Fatal for the
    /// in-flight operation only.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    pub(crate) fn from_sqlite(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
