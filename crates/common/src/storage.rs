//! Browser-local persistent storage backends
//!
//! The recorder only talks to the [`LocalStorage`] trait. A browsing session
//! owns one backend and hands a clone of the handle to every page it loads, so
//! persisted state outlives navigations while in-memory recorder state does not.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::{Error, Result};

/// Key/value store with `localStorage` semantics.
pub trait LocalStorage: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key (absent keys are not an error)
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every key
    fn clear(&self) -> Result<()>;

    /// Number of stored keys
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// In-memory storage shared by every clone of the handle.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.items.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.items.lock().clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.items.lock().len())
    }
}

/// Which operations a [`DisabledStorage`] rejects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Every operation throws
    #[default]
    ReadsAndWrites,
    /// Reads report "absent", mutations throw
    WritesOnly,
}

/// Storage that behaves like a browser with `localStorage` switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledStorage {
    mode: FailureMode,
}

impl DisabledStorage {
    pub fn new(mode: FailureMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> FailureMode {
        self.mode
    }

    fn unavailable(op: &str) -> Error {
        Error::StorageUnavailable(format!("localStorage disabled ({op})"))
    }
}

impl LocalStorage for DisabledStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>> {
        match self.mode {
            FailureMode::ReadsAndWrites => Err(Self::unavailable("getItem")),
            FailureMode::WritesOnly => Ok(None),
        }
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Err(Self::unavailable("setItem"))
    }

    fn remove_item(&self, _key: &str) -> Result<()> {
        Err(Self::unavailable("removeItem"))
    }

    fn clear(&self) -> Result<()> {
        Err(Self::unavailable("clear"))
    }

    fn len(&self) -> Result<usize> {
        match self.mode {
            FailureMode::ReadsAndWrites => Err(Self::unavailable("length")),
            FailureMode::WritesOnly => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_memory_storage_is_shared_between_clones() {
        let storage = MemoryStorage::new();
        let other = storage.clone();

        storage.set_item("bikeGearAnalytics", "{}").unwrap();
        assert_eq!(other.get_item("bikeGearAnalytics").unwrap().as_deref(), Some("{}"));

        other.clear().unwrap();
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn test_memory_storage_remove_missing_key() {
        let storage = MemoryStorage::new();
        storage.remove_item("nope").unwrap();
        assert_eq!(storage.get_item("nope").unwrap(), None);
    }

    #[test]
    fn test_memory_storage_bulk_operations_are_fast() {
        let storage = MemoryStorage::new();
        let payload = "test data".repeat(10);

        let start = Instant::now();
        for i in 0..100 {
            storage.set_item(&format!("test-{i}"), &payload).unwrap();
        }
        for i in 0..100 {
            storage.remove_item(&format!("test-{i}")).unwrap();
        }

        assert!(start.elapsed().as_millis() < 100);
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn test_disabled_storage_rejects_everything() {
        let storage = DisabledStorage::new(FailureMode::ReadsAndWrites);
        assert!(matches!(storage.get_item("k"), Err(Error::StorageUnavailable(_))));
        assert!(matches!(storage.set_item("k", "v"), Err(Error::StorageUnavailable(_))));
        assert!(storage.clear().is_err());
    }

    #[test]
    fn test_disabled_storage_write_only_failure() {
        let storage = DisabledStorage::new(FailureMode::WritesOnly);
        assert_eq!(storage.get_item("k").unwrap(), None);
        assert!(storage.set_item("k", "v").is_err());
        assert!(storage.remove_item("k").is_err());
    }
}
