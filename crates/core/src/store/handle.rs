//! The shared store handle.
//!
//! One [`CatalogStore`] is constructed at process start and shared by every
//! table adapter, the sync reconciler and UI observers. It owns the single
//! connection, the write serializer and the change notifier, so their
//! lifetimes are explicit instead of living in module globals.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use super::bulk::{NativeBulkWriter, TransactionBulkWriter};
use super::notifier::ChangeNotifier;
use super::schema;
use super::serializer::WriteSerializer;
use super::table::TableAdapter;
use super::StoreError;

/// Store tuning knobs, normally sourced from [`crate::config::DatabaseConfig`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a writer waits on a busy store before failing.
    pub busy_timeout: Duration,
    /// Maximum bound parameters per generated statement.
    pub max_bound_params: usize,
    /// Minimum chunk size routed through the native bulk writer.
    pub native_min_chunk: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            max_bound_params: 999,
            native_min_chunk: 100,
        }
    }
}

pub(crate) struct StoreInner {
    pub(crate) conn: Mutex<Connection>,
    pub(crate) serializer: WriteSerializer,
    pub(crate) notifier: ChangeNotifier,
    pub(crate) max_bound_params: usize,
    pub(crate) native_min_chunk: usize,
    pub(crate) native: Box<dyn NativeBulkWriter>,
}

/// Handle to the local catalog store.
///
/// Cheap to clone; all clones share one connection, one write serializer and
/// one change notifier.
#[derive(Clone)]
pub struct CatalogStore {
    inner: Arc<StoreInner>,
}

impl CatalogStore {
    /// Open (or create) the store at `path` and bootstrap the schema.
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(StoreError::from_sqlite)?;
        Self::initialize(conn, options, Box::new(TransactionBulkWriter))
    }

    /// In-memory store with default options (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::initialize(conn, StoreOptions::default(), Box::new(TransactionBulkWriter))
    }

    /// In-memory store with explicit options and native bulk writer. The
    /// writer is the external batched-insert collaborator; tests inject
    /// failing implementations to exercise the SQL fallback.
    pub fn in_memory_with(
        options: StoreOptions,
        native: Box<dyn NativeBulkWriter>,
    ) -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Self::initialize(conn, options, native)
    }

    fn initialize(
        conn: Connection,
        options: StoreOptions,
        native: Box<dyn NativeBulkWriter>,
    ) -> Result<Self, StoreError> {
        conn.busy_timeout(options.busy_timeout)
            .map_err(StoreError::from_sqlite)?;
        conn.execute_batch(&schema::ddl())
            .map_err(StoreError::from_sqlite)?;

        Ok(Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(conn),
                serializer: WriteSerializer::new(),
                notifier: ChangeNotifier::new(),
                max_bound_params: options.max_bound_params,
                native_min_chunk: options.native_min_chunk,
                native,
            }),
        })
    }

    /// Adapter for one entity kind.
    pub fn table(&self, kind: &str) -> Result<TableAdapter, StoreError> {
        let schema = schema::kind(kind)?;
        Ok(TableAdapter::new(Arc::clone(&self.inner), schema))
    }

    /// The store-wide change notification bus.
    pub fn changes(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }
}

impl std::fmt::Debug for CatalogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogStore")
            .field("max_bound_params", &self.inner.max_bound_params)
            .finish()
    }
}
