//! SWR Disk Cache - disk-persisted memoization for async producers
//!
//! Two access policies over a named, disk-backed LRU store:
//! - [`SwrCache`]: stale-while-revalidate, refreshing aged values in the background
//! - [`MemoCache`]: TTL memoization, waiting for the producer on a miss
//!
//! Every cache is created through a [`CacheManager`], whose registry can
//! clear all of them at once.
//!
//! # Example
//! ```ignore
//! use swr_disk_cache::{CacheManager, Config, SwrOptions};
//!
//! let manager = CacheManager::new(Config::from_env());
//! let releases = manager
//!     .wrap_swr(
//!         |(repo,): (String,)| async move { fetch_latest_release(&repo).await },
//!         SwrOptions::new("releases").max_entries(500),
//!     )
//!     .await?;
//!
//! let latest = releases.call(("withastro/astro".to_string(),)).await?;
//! manager.clear_all_caches().await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod manager;
pub mod memo;
pub mod producer;
pub mod registry;
pub mod swr;
pub mod tasks;

pub use config::{Config, MemoOptions, SwrOptions};
pub use error::{CacheError, Result};
pub use key::{derive_key, KeyArgs, EMPTY_ARGS_KEY};
pub use manager::CacheManager;
pub use memo::MemoCache;
pub use registry::{CacheRegistry, ClearReport, ManagedCache};
pub use swr::{Freshness, SwrCache};
pub use tasks::spawn_cleanup_task;
