//! Stored Entry Module
//!
//! Defines a single persisted entry with its absolute TTL backstop.

use chrono::Utc;
use serde::{Deserialize, Serialize};

// == Stored Entry ==
/// A value held by a [`PersistentStore`](super::PersistentStore).
///
/// Values are kept as JSON so one store type serves every cache, whatever
/// the wrapped producer returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// The stored value
    pub value: serde_json::Value,
    /// Write timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Physical removal timestamp (Unix milliseconds), None = kept until evicted
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates an entry stamped with the current time.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl_ms` - Optional lifetime in milliseconds
    pub fn new(value: serde_json::Value, ttl_ms: Option<u64>) -> Self {
        Self::with_timestamp(value, current_timestamp_ms(), ttl_ms)
    }

    /// Creates an entry with an explicit write time.
    pub fn with_timestamp(value: serde_json::Value, stored_at: u64, ttl_ms: Option<u64>) -> Self {
        Self {
            value,
            stored_at,
            expires_at: ttl_ms.map(|ttl| stored_at.saturating_add(ttl)),
        }
    }

    // == Is Expired ==
    /// Checks whether the entry has outlived its TTL at `now`.
    ///
    /// An entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    /// Age of the entry in milliseconds at `now`.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
