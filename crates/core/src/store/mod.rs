//! The local embedded catalog store.
//!
//! A thin, schema-validated layer over SQLite shared by every entity kind:
//! per-kind table adapters, a single global write serializer, a change
//! notification bus for live queries, lazily-built queries, and chunked bulk
//! writes with a native-call/SQL-fallback strategy.

mod bulk;
mod error;
mod handle;
mod normalize;
mod notifier;
mod query;
pub mod schema;
mod serializer;
mod table;

pub use bulk::{BulkWriteOp, NativeBulkWriter, TransactionBulkWriter};
pub use error::StoreError;
pub use handle::{CatalogStore, StoreOptions};
pub use normalize::Record;
pub use notifier::{ChangeEvent, ChangeNotifier, ChangeType, Subscription};
pub use query::{Collection, Query};
pub use serializer::WriteSerializer;
pub use table::TableAdapter;
