//! Directory walking and change watching.
//!
//! [`Scanner`] walks library roots on blocking threads, subscribing every
//! directory it finds with the [`DirWatcher`] and enqueueing every supported
//! media file for the writer. Walks are paced by [`ScanConfig`].

pub mod watcher;

pub use watcher::{DirWatcher, WatchError, WatchService};

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ScanConfig;
use crate::library::writer::Job;

/// Extensions eligible for indexing.
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["mp3", "ogg", "oga", "wav", "fla", "flac", "m4a"];

/// Check if a path has a supported media extension (case-insensitive).
pub fn is_supported_format(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| e.eq_ignore_ascii_case(supported))
        })
        .unwrap_or(false)
}

/// What one walk did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub directories: u64,
    pub files: u64,
}

/// Spawns directory walks and tracks them until they finish.
#[derive(Clone)]
pub struct Scanner {
    config: ScanConfig,
    queue: mpsc::Sender<Job>,
    watcher: Option<DirWatcher>,
    walks: Arc<Mutex<Vec<JoinHandle<WalkStats>>>>,
    started: Arc<AtomicU64>,
}

impl Scanner {
    pub fn new(config: ScanConfig, queue: mpsc::Sender<Job>, watcher: Option<DirWatcher>) -> Self {
        Self {
            config,
            queue,
            watcher,
            walks: Arc::new(Mutex::new(Vec::new())),
            started: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Walk `root` in the background.
    pub fn spawn_walk(&self, root: PathBuf) {
        let config = self.config.clone();
        let queue = self.queue.clone();
        let watcher = self.watcher.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let stats = walk(&root, &config, &queue, watcher.as_ref());
            info!(
                target: "scanner",
                root = %root.display(),
                directories = stats.directories,
                files = stats.files,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Walk finished"
            );
            stats
        });

        let mut walks = self.walks.lock();
        walks.retain(|walk| !walk.is_finished());
        walks.push(handle);
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of walks spawned so far, by any clone of this scanner.
    pub fn walks_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether any walk is still running.
    pub fn is_busy(&self) -> bool {
        self.walks.lock().iter().any(|walk| !walk.is_finished())
    }

    /// Wait until every walk, including ones spawned meanwhile, has finished.
    pub async fn wait(&self) {
        loop {
            let walks = std::mem::take(&mut *self.walks.lock());
            if walks.is_empty() {
                return;
            }
            for result in futures::future::join_all(walks).await {
                if let Err(e) = result {
                    warn!(target: "scanner", error = %e, "Walk task failed");
                }
            }
        }
    }
}

/// Walk `root` recursively, watching directories and enqueueing media files.
///
/// Blocking. Unreadable entries are logged and skipped. The walk ends early if
/// the writer queue has been closed.
pub fn walk(
    root: &Path,
    config: &ScanConfig,
    queue: &mpsc::Sender<Job>,
    watcher: Option<&DirWatcher>,
) -> WalkStats {
    let mut stats = WalkStats::default();
    let pause = config.pause();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(target: "scanner", error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();

        if entry.file_type().is_dir() {
            stats.directories += 1;
            if let Some(watcher) = watcher
                && let Err(e) = watcher.watch(path)
            {
                warn!(target: "scanner", path = %path.display(), error = %e, "Could not watch directory");
            }
            continue;
        }

        if !entry.file_type().is_file() || !is_supported_format(path) {
            continue;
        }

        if queue.blocking_send(Job::add(path)).is_err() {
            debug!(target: "scanner", root = %root.display(), "Queue closed, stopping walk");
            break;
        }
        stats.files += 1;

        if let Some((every, sleep)) = pause
            && stats.files % every == 0
        {
            std::thread::sleep(sleep);
        }
    }

    stats
}
