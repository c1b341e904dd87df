//! Catalog synchronization against remote sources.
//!
//! The reconciler periodically re-fetches provider catalogs and merges them
//! into the local store without losing user-owned state: it diffs fresh
//! entities against existing rows, carries favorites/flags/enrichment ids
//! forward, and applies the computed add/update/delete sets through the bulk
//! write path.

mod entities;
mod guard;
mod meta;
mod reconciler;
mod source_client;
mod types;

pub use entities::{
    CategoryEntry, EpgProgram, LiveCatalog, LiveChannel, VodCatalog, VodMovie, VodSeries,
};
pub use guard::DeletionGuard;
pub use reconciler::SyncReconciler;
pub use source_client::{SourceClient, SourceClientError};
pub use types::{KindOutcome, SourceConfig, SyncReport};
