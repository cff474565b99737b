//! SWR Disk Cache - maintenance tool
//!
//! Inspects and cleans the store files under the configured cache directory.
//!
//! # Commands
//! - `list` - store files with their live entry counts (default)
//! - `sweep` - drop backstop-expired entries from every store file
//! - `purge [name...]` - delete the named store files, or all of them

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swr_disk_cache::cache::{store_path, PersistentStore, STORE_FILE_EXTENSION};
use swr_disk_cache::config::validate_name;
use swr_disk_cache::swr::{logical_entries, STORED_AT_SUFFIX};
use swr_disk_cache::Config;

const USAGE: &str = "usage: swr_disk_cache [list | sweep | purge [name...]]";

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swr_disk_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!("Cache directory: {}", config.cache_dir.display());

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("list") => list(&config.cache_dir).await,
        Some("sweep") => sweep(&config.cache_dir).await,
        Some("purge") => purge(&config.cache_dir, args.collect()).await,
        Some("-h") | Some("--help") => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => {
            eprintln!("{}", USAGE);
            bail!("unknown command '{}'", other)
        }
    }
}

/// Names of the store files in `dir`, sorted.
async fn store_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
        Err(e) => return Err(e).with_context(|| format!("reading {}", dir.display())),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("reading {}", dir.display()))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(STORE_FILE_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            names.push(stem.to_string());
        }
    }

    names.sort();
    Ok(names)
}

async fn list(dir: &Path) -> Result<()> {
    let names = store_names(dir).await?;
    if names.is_empty() {
        println!("no caches in {}", dir.display());
        return Ok(());
    }

    for name in names {
        let mut store = PersistentStore::open(dir, &name, 0, None);
        store.load().await;

        // SWR stores keep a timestamp entry beside every value
        let entries = if store.keys().any(|key| key.ends_with(STORED_AT_SUFFIX)) {
            logical_entries(&store)
        } else {
            store.len()
        };
        println!("{:<40} {:>8} entries", name, entries);
    }
    Ok(())
}

async fn sweep(dir: &Path) -> Result<()> {
    let mut total = 0;
    for name in store_names(dir).await? {
        let mut store = PersistentStore::open(dir, &name, 0, None);
        store.load().await;
        store.purge_expired();

        let removed = store.stats().expirations;
        if removed > 0 {
            store
                .save()
                .await
                .with_context(|| format!("saving cache '{}'", name))?;
            println!("{:<40} {:>8} expired removed", name, removed);
        }
        total += removed;
    }

    info!("Sweep removed {} expired entries", total);
    Ok(())
}

async fn purge(dir: &Path, names: Vec<String>) -> Result<()> {
    let targets = if names.is_empty() {
        store_names(dir).await?
    } else {
        for name in &names {
            validate_name(name)?;
        }
        names
    };

    for name in targets {
        let path = store_path(dir, &name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => println!("removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No cache named '{}' in {}", name, dir.display())
            }
            Err(e) => return Err(e).with_context(|| format!("removing {}", path.display())),
        }
    }
    Ok(())
}
