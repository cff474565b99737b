//! Cache Module
//!
//! Disk-backed key-value storage with LRU eviction and a TTL backstop.

mod entry;
mod lru;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, StoredEntry};
pub use lru::LruIndex;
pub use stats::StoreStats;
pub use store::{store_path, PersistentStore};

// == Public Constants ==
/// File extension of store files
pub const STORE_FILE_EXTENSION: &str = "json";

/// Version tag written into every store file
pub const STORE_FORMAT_VERSION: u32 = 1;
