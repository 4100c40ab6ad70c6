//! The library facade: one indexed music collection.
//!
//! A [`Library`] owns the store connection pool, the serialized
//! [`Writer`](writer::Writer), the [`Scanner`] and, when enabled, the
//! directory [`WatchService`]. Reads go straight to the pool; every mutation
//! is queued for the writer.
//!
//! # Lifecycle
//!
//! ```rust,ignore
//! let mut library = Library::open(config, Arc::new(LoftyTagReader)).await?;
//! library.initialize().await?;
//! library.scan();
//! library.wait_scan().await;
//! let found = library.search("maiden").await;
//! library.close().await;
//! ```
//!
//! Calling anything except [`close`](Library::close),
//! [`truncate`](Library::truncate) or [`initialize`](Library::initialize) on a
//! closed library is a programming error and panics.

pub mod ingest;
pub mod writer;

use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::db;
use crate::error::{Error, Result, ResultExt};
use crate::metadata::TagReader;
use crate::model::{Album, Artist, SearchResult, Track};
use crate::scanner::{DirWatcher, Scanner, WatchService};
use writer::{IdleWaiter, Job, QUEUE_CAPACITY, Writer, idle_channel};

/// An open music library.
pub struct Library {
    config: LibraryConfig,
    paths: Vec<PathBuf>,
    pool: Option<SqlitePool>,
    queue: Option<mpsc::Sender<Job>>,
    scanner: Option<Scanner>,
    writer: Option<JoinHandle<()>>,
    idle: IdleWaiter,
    watch: Option<WatchService>,
}

impl Library {
    /// Open the store and start the writer, and the watcher if configured.
    ///
    /// Every path in `config.paths` is registered with
    /// [`add_library_path`](Self::add_library_path). Nothing is scanned yet
    /// and the schema is not bootstrapped; see [`initialize`](Self::initialize).
    pub async fn open(config: LibraryConfig, reader: Arc<dyn TagReader>) -> Result<Self> {
        if let Some(parent) = config.database.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(format!("creating {}", parent.display()))?;
        }

        let pool = db::open(&config.database)
            .await
            .with_context(format!("opening {}", config.database.display()))?;

        let (queue, jobs) = mpsc::channel(QUEUE_CAPACITY);
        let (signal, idle) = idle_channel();
        let writer = Writer::new(pool.clone(), reader, jobs, signal).spawn();

        let watcher = if config.watch_for_changes {
            match DirWatcher::new() {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!(target: "library", error = %e, "Could not start directory watcher, changes will not be tracked");
                    None
                }
            }
        } else {
            None
        };

        let scanner = Scanner::new(
            config.scan.clone(),
            queue.clone(),
            watcher.as_ref().map(|(watcher, _)| watcher.clone()),
        );
        let watch = watcher.map(|(watcher, events)| {
            WatchService::start(watcher, events, scanner.clone(), queue.clone())
        });

        info!(
            target: "library",
            database = %config.database.display(),
            watching = watch.is_some(),
            "Library opened"
        );

        let roots = config.paths.clone();
        let mut library = Self {
            config,
            paths: Vec::new(),
            pool: Some(pool),
            queue: Some(queue),
            scanner: Some(scanner),
            writer: Some(writer),
            idle,
            watch,
        };
        for root in &roots {
            library.add_library_path(root);
        }

        Ok(library)
    }

    /// Register a root directory for [`scan`](Self::scan).
    ///
    /// Paths that cannot be read are logged and ignored.
    pub fn add_library_path(&mut self, path: &Path) {
        let root = match std::fs::canonicalize(path) {
            Ok(root) => root,
            Err(e) => {
                warn!(target: "library", path = %path.display(), error = %e, "Ignoring invalid library path");
                return;
            }
        };
        if !root.is_dir() {
            warn!(target: "library", path = %path.display(), "Ignoring library path that is not a directory");
            return;
        }
        if !self.paths.contains(&root) {
            info!(target: "library", path = %root.display(), "Library path added");
            self.paths.push(root);
        }
    }

    /// Registered root directories.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_none()
    }

    /// Create the schema unless it already exists.
    ///
    /// Uses `schema_path` when configured, otherwise the embedded schema. A
    /// missing or empty script, or a closed library, is a configuration error.
    pub async fn initialize(&self) -> Result<()> {
        let Some(pool) = self.pool.as_ref() else {
            return Err(Error::config("library is closed"));
        };

        if db::schema_present(pool).await? {
            debug!(target: "library", "Schema already present");
            return Ok(());
        }

        let script = match &self.config.schema_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                Error::config(format!("cannot read schema {}: {e}", path.display()))
            })?,
            None => db::SCHEMA.to_string(),
        };

        db::bootstrap(pool, &script).await?;
        info!(target: "library", "Database initialized");
        Ok(())
    }

    /// Walk every registered root in the background.
    pub fn scan(&self) {
        let scanner = self.scanner();
        for root in &self.paths {
            info!(target: "library", path = %root.display(), "Scanning library path");
            scanner.spawn_walk(root.clone());
        }
    }

    /// Wait until running walks have finished and the writer has applied
    /// what they queued.
    ///
    /// Done once no walk was spawned between joining the walks and the writer
    /// going idle; a walk started in that window (say, by the watcher) may
    /// still have jobs queued. Returns immediately on a closed library.
    pub async fn wait_scan(&self) {
        let Some(scanner) = self.scanner.as_ref() else {
            return;
        };

        loop {
            let started = scanner.walks_started();
            scanner.wait().await;
            if !self.idle.wait().await || scanner.walks_started() == started {
                break;
            }
        }
    }

    /// Index a single file through the writer and report the outcome.
    pub async fn add_media(&self, path: &Path) -> Result<()> {
        let path = std::path::absolute(path)?;
        let (reply, outcome) = oneshot::channel();

        self.queue()
            .send(Job::Add {
                path,
                reply: Some(reply),
            })
            .await
            .map_err(|_| Error::config("writer has stopped"))?;

        outcome
            .await
            .map_err(|_| Error::config("writer dropped the request"))?
    }

    /// Substring search across titles, albums and artists.
    pub async fn search(&self, term: &str) -> Vec<SearchResult> {
        db::search(self.pool(), term).await.unwrap_or_else(|e| {
            warn!(target: "library", term, error = %e, "Search failed");
            Vec::new()
        })
    }

    /// Every track of an album, in track order.
    pub async fn album_files(&self, album_id: i64) -> Vec<SearchResult> {
        db::album_files(self.pool(), album_id)
            .await
            .unwrap_or_else(|e| {
                warn!(target: "library", album_id, error = %e, "Album listing failed");
                Vec::new()
            })
    }

    /// A zero-based page of artists and the total number of artists.
    pub async fn browse_artists(&self, page: u32, per_page: u32) -> (Vec<Artist>, i64) {
        db::browse_artists(self.pool(), page, per_page)
            .await
            .unwrap_or_else(|e| {
                warn!(target: "library", error = %e, "Browsing artists failed");
                (Vec::new(), 0)
            })
    }

    /// A zero-based page of albums and the total number of albums.
    pub async fn browse_albums(&self, page: u32, per_page: u32) -> (Vec<Album>, i64) {
        db::browse_albums(self.pool(), page, per_page)
            .await
            .unwrap_or_else(|e| {
                warn!(target: "library", error = %e, "Browsing albums failed");
                (Vec::new(), 0)
            })
    }

    /// Where a track's file lives, if the track exists.
    pub async fn file_path(&self, track_id: i64) -> Option<PathBuf> {
        match db::file_path(self.pool(), track_id).await {
            Ok(path) => Some(path),
            Err(e) if e.is_not_found() => {
                debug!(target: "library", track_id, "No such track");
                None
            }
            Err(e) => {
                warn!(target: "library", track_id, error = %e, "File lookup failed");
                None
            }
        }
    }

    /// The full track row, including its path and owning IDs.
    pub async fn track(&self, track_id: i64) -> Option<Track> {
        db::get_track_by_id(self.pool(), track_id)
            .await
            .unwrap_or_else(|e| {
                warn!(target: "library", track_id, error = %e, "Track lookup failed");
                None
            })
    }

    /// Number of indexed tracks.
    pub async fn track_count(&self) -> i64 {
        db::count_tracks(self.pool()).await.unwrap_or_else(|e| {
            warn!(target: "library", error = %e, "Counting tracks failed");
            0
        })
    }

    pub async fn artist_id(&self, name: &str) -> Result<i64> {
        db::get_artist_id(self.pool(), name).await
    }

    /// Album lookups are scoped to the owning artist.
    pub async fn album_id(&self, name: &str, artist_id: i64) -> Result<i64> {
        db::get_album_id(self.pool(), name, artist_id).await
    }

    pub async fn track_id(&self, title: &str, artist_id: i64, album_id: i64) -> Result<i64> {
        db::get_track_id(self.pool(), title, artist_id, album_id).await
    }

    /// Shut everything down: watcher, scans, writer, then the store. Idempotent.
    pub async fn close(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            watch.stop().await;
        }

        if let Some(scanner) = self.scanner.take() {
            scanner.wait().await;
        }

        // Last sender gone: the writer drains what is queued and stops.
        self.queue = None;
        if let Some(writer) = self.writer.take()
            && let Err(e) = writer.await
        {
            warn!(target: "library", error = %e, "Writer task failed");
        }

        if let Some(pool) = self.pool.take() {
            pool.close().await;
            info!(target: "library", "Library closed");
        }
    }

    /// Close the library and delete its database file.
    ///
    /// Failing to delete the main file is an error; SQLite side files are
    /// removed when present.
    pub async fn truncate(&mut self) -> Result<()> {
        self.close().await;

        let database = &self.config.database;
        std::fs::remove_file(database)
            .with_context(format!("removing {}", database.display()))?;

        for suffix in ["-wal", "-shm"] {
            let mut side = database.clone().into_os_string();
            side.push(suffix);
            if let Err(e) = std::fs::remove_file(&side)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(target: "library", path = ?side, error = %e, "Could not remove database side file");
            }
        }

        info!(target: "library", database = %database.display(), "Library truncated");
        Ok(())
    }

    fn pool(&self) -> &SqlitePool {
        self.pool.as_ref().expect("library used after close")
    }

    fn queue(&self) -> &mpsc::Sender<Job> {
        self.queue.as_ref().expect("library used after close")
    }

    fn scanner(&self) -> &Scanner {
        self.scanner.as_ref().expect("library used after close")
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        if self.pool.is_some() {
            warn!(target: "library", "Library dropped without close, pending work may be lost");
        }
    }
}
