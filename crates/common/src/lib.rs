//! Bike Gear Common Library
//!
//! The click analytics recorder behind the storefront pages, together with
//! the local-storage backends it persists to.

pub mod banner;
pub mod config;
pub mod db;
pub mod error;
pub mod recorder;
pub mod storage;
pub mod surface;
pub mod types;

// Re-export commonly used types
pub use banner::Banner;
pub use config::{AnalyticsConfig, StorageConfig, DEFAULT_STORAGE_KEY};
pub use db::SqliteStorage;
pub use error::{Error, Result};
pub use recorder::{AnalyticsRecorder, PersistenceMode, RecordOutcome};
pub use storage::{DisabledStorage, FailureMode, LocalStorage, MemoryStorage};
pub use surface::{DomSurface, TracingSurface};
pub use types::*;

/// Bike Gear version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
