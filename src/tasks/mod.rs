//! Background Tasks Module
//!
//! # Tasks
//! - TTL backstop sweep: removes expired entries from registered caches

mod cleanup;

pub use cleanup::spawn_cleanup_task;
