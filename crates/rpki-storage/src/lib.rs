//! Storage facade for the RPKI validator.
//!
//! [`Storage`] opens one database and wires the object store, the
//! validation run store and the settings flags over it. Maintenance
//! operations (garbage collection, run retention, index verification) read
//! their thresholds from [`StorageConfig`].

pub mod config;
pub mod error;
pub mod settings;
pub mod storage;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use settings::{Settings, INITIAL_VALIDATION_RUN_COMPLETED, PRECONFIGURED_TALS_LOADED};
pub use storage::{log_config, Storage, StorageStats};
