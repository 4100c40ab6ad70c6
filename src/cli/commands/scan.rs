//! Library scanning, watching and truncation commands.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::info;

use super::open_library;
use crate::config::LibraryConfig;
use crate::library::Library;
use crate::metadata::LoftyTagReader;

/// Scan every library path and wait until the index has settled.
pub fn cmd_scan(rt: &Runtime, mut config: LibraryConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    config.watch_for_changes = false;
    rt.block_on(scan(config, paths))
}

/// Scan, then apply filesystem changes until interrupted.
pub fn cmd_watch(rt: &Runtime, mut config: LibraryConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    config.watch_for_changes = true;
    rt.block_on(watch(config, paths))
}

/// Delete the index database.
pub fn cmd_truncate(rt: &Runtime, mut config: LibraryConfig) -> anyhow::Result<()> {
    config.watch_for_changes = false;
    rt.block_on(truncate(config))
}

async fn scan(config: LibraryConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut library = open_library(config).await?;
    let result = scan_and_settle(&mut library, paths).await;
    library.close().await;
    result
}

async fn watch(config: LibraryConfig, paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut library = open_library(config).await?;
    if let Err(e) = scan_and_settle(&mut library, paths).await {
        library.close().await;
        return Err(e);
    }

    println!("Watching for changes. Press Ctrl+C to stop.");
    let interrupted = tokio::signal::ctrl_c().await;
    info!(target: "cli::watch", "Stopping");

    let count = library.track_count().await;
    library.close().await;
    println!("Index holds {count} tracks.");

    interrupted?;
    Ok(())
}

async fn truncate(config: LibraryConfig) -> anyhow::Result<()> {
    let database = config.database.clone();
    let mut library = Library::open(config, Arc::new(LoftyTagReader)).await?;
    library.truncate().await?;
    println!("Removed {}", database.display());
    Ok(())
}

async fn scan_and_settle(library: &mut Library, extra: &[PathBuf]) -> anyhow::Result<()> {
    for path in extra {
        library.add_library_path(path);
    }
    if library.paths().is_empty() {
        anyhow::bail!(
            "No library paths to scan; pass a directory or set [library] paths in the config file"
        );
    }

    for path in library.paths() {
        println!("Scanning {}", path.display());
    }

    let started = Instant::now();
    library.scan();
    library.wait_scan().await;

    println!(
        "Scan complete in {:.1}s: {} tracks indexed.",
        started.elapsed().as_secs_f64(),
        library.track_count().await
    );
    Ok(())
}
