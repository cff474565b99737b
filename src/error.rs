//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for memo and SWR caches.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Call arguments could not be canonically serialized into a key
    #[error("Key derivation failed: {0}")]
    KeyDerivation(#[source] serde_json::Error),

    /// The wrapped producer failed
    #[error("Producer failed: {0}")]
    Producer(#[source] anyhow::Error),

    /// A produced value could not be encoded for storage
    #[error("Value encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored value could not be decoded into the cache's value type
    #[error("Stored value in cache '{name}' could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing the backing file failed
    #[error("Persistence failed for {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache name or options rejected
    #[error("Invalid cache options: {0}")]
    InvalidOptions(String),

    /// A cache with the same name is already registered
    #[error("Cache name already registered: {0}")]
    DuplicateName(String),
}

impl CacheError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error came from the wrapped producer.
    pub fn is_producer(&self) -> bool {
        matches!(self, CacheError::Producer(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
