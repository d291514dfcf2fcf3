//! Recorder configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::banner::DEFAULT_HIDE_DELAY;
use crate::db::SqliteStorage;
use crate::storage::{DisabledStorage, FailureMode, LocalStorage, MemoryStorage};
use crate::Result;

/// Key the analytics state is persisted under
pub const DEFAULT_STORAGE_KEY: &str = "bikeGearAnalytics";

/// Analytics recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Local storage key holding the serialized state
    pub storage_key: String,

    /// Banner auto-hide delay in milliseconds
    pub banner_hide_ms: u64,

    /// Persistence backend
    pub storage: StorageConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            banner_hide_ms: DEFAULT_HIDE_DELAY.as_millis() as u64,
            storage: StorageConfig::default(),
        }
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Shared in-process map, lost when the process exits
    #[default]
    Memory,

    /// SQLite file scoped to an origin
    Sqlite { path: PathBuf, origin: String },

    /// Storage switched off
    Disabled {
        #[serde(default)]
        mode: FailureMode,
    },
}

impl StorageConfig {
    /// Open the configured backend
    pub fn open(&self) -> Result<Arc<dyn LocalStorage>> {
        Ok(match self {
            StorageConfig::Memory => Arc::new(MemoryStorage::new()),
            StorageConfig::Sqlite { path, origin } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(SqliteStorage::open(path, origin.clone())?)
            }
            StorageConfig::Disabled { mode } => Arc::new(DisabledStorage::new(*mode)),
        })
    }
}

impl AnalyticsConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "storage_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn banner_delay(&self) -> Duration {
        Duration::from_millis(self.banner_hide_ms)
    }
}
