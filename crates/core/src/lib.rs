//! Core library for zaptv: the local catalog store and sync engine beneath
//! an IPTV/VOD application.
//!
//! The UI, playback and provider-protocol layers live elsewhere and consume
//! this crate through [`store::CatalogStore`], [`sync::SyncReconciler`] and
//! the change notification bus.

pub mod config;
pub mod metrics;
pub mod store;
pub mod sync;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    SyncConfig,
};
pub use store::{
    CatalogStore, ChangeEvent, ChangeNotifier, ChangeType, Record, StoreError, StoreOptions,
    Subscription, TableAdapter,
};
pub use sync::{
    DeletionGuard, KindOutcome, SourceClient, SourceClientError, SourceConfig, SyncReconciler,
    SyncReport,
};
