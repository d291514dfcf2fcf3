//! Error types for the analytics core

use thiserror::Error;

/// Result type alias using the analytics Error
pub type Result<T> = std::result::Result<T, Error>;

/// Analytics error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Invalid tracking label: {0:?}")]
    InvalidLabel(String),

    #[error("Unknown page context: {0}")]
    UnknownPageContext(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error means the persistent store could not be used at all.
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Database(_) | Error::StorageUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_failures() {
        assert!(Error::StorageUnavailable("disabled".into()).is_persistence_failure());
        assert!(!Error::InvalidLabel(String::new()).is_persistence_failure());
        assert!(!Error::InvalidConfig("x".into()).is_persistence_failure());
    }
}
