//! File system watcher keeping the index in step with the library roots.
//!
//! Uses the `notify` crate directly. Every directory a walk visits is
//! subscribed on its own, so the set of watched directories always mirrors
//! what has been scanned, and subtrees can be dropped when they go away.
//!
//! # Design
//!
//! - **Raw events**: no debouncing. Re-adding an indexed path is a no-op, so
//!   duplicate create/close events cost a lookup and nothing more. Content
//!   writes are picked up on close, never per written chunk, and empty files
//!   wait for the close that follows their creation.
//! - **Off-runtime checks**: [`classify`] never touches the disk. Whether a
//!   path is a file or a directory is decided in `spawn_blocking`.
//! - **Writer owned mutations**: additions and removals are queued as
//!   [`Job`]s for the serialized writer, never applied here.
//! - **Renames**: the old path is removed (a whole prefix for directories),
//!   the new path is added or walked.
//!
//! # Usage
//!
//! ```rust,ignore
//! let (watcher, events) = DirWatcher::new()?;
//! let scanner = Scanner::new(scan_config, queue.clone(), Some(watcher.clone()));
//! let mut service = WatchService::start(watcher, events, scanner, queue);
//!
//! // ...
//! service.stop().await;
//! ```

use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode, ModifyKind, RemoveKind, RenameMode},
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Scanner, is_supported_format};
use crate::library::writer::Job;

/// Raw notify results, in the order the backend produced them.
pub type EventReceiver = mpsc::UnboundedReceiver<notify::Result<Event>>;

/// Errors that can occur during file watching.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {0}")]
    Init(#[source] notify::Error),

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

struct Inner {
    watcher: Option<RecommendedWatcher>,
    dirs: BTreeSet<PathBuf>,
}

/// Shared handle to the OS watcher and the set of directories it covers.
#[derive(Clone)]
pub struct DirWatcher {
    inner: Arc<Mutex<Inner>>,
}

impl DirWatcher {
    /// Create a watcher with nothing subscribed yet.
    ///
    /// Returns the handle and the receiver its events are delivered on.
    pub fn new() -> Result<(Self, EventReceiver), WatchError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            let _ = tx.send(result);
        })
        .map_err(WatchError::Init)?;

        let inner = Inner {
            watcher: Some(watcher),
            dirs: BTreeSet::new(),
        };
        Ok((
            Self {
                inner: Arc::new(Mutex::new(inner)),
            },
            rx,
        ))
    }

    /// Subscribe a single directory. Already watched directories are skipped,
    /// as is everything once the watcher has been stopped.
    pub fn watch(&self, path: &Path) -> Result<(), WatchError> {
        let mut inner = self.inner.lock();
        if inner.dirs.contains(path) {
            return Ok(());
        }
        let Some(watcher) = inner.watcher.as_mut() else {
            return Ok(());
        };

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        inner.dirs.insert(path.to_path_buf());

        debug!(target: "scanner::watcher", path = %path.display(), "Watching directory");
        Ok(())
    }

    /// Drop `path` and every watched directory below it.
    ///
    /// Returns whether `path` itself was being watched.
    pub fn unwatch_tree(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock();
        let doomed: Vec<PathBuf> = inner
            .dirs
            .range(path.to_path_buf()..)
            .take_while(|dir| dir.starts_with(path))
            .cloned()
            .collect();

        let Inner { watcher, dirs } = &mut *inner;
        for dir in &doomed {
            dirs.remove(dir);
            // The OS usually drops the watch first when a directory disappears.
            if let Some(watcher) = watcher.as_mut()
                && let Err(e) = watcher.unwatch(dir)
            {
                debug!(target: "scanner::watcher", path = %dir.display(), error = %e, "Unwatch failed");
            }
        }

        doomed.first().is_some_and(|first| first == path)
    }

    /// Whether `path` is currently subscribed.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.inner.lock().dirs.contains(path)
    }

    /// Number of subscribed directories.
    pub fn watched_count(&self) -> usize {
        self.inner.lock().dirs.len()
    }

    /// Release the OS watcher. Later [`watch`](Self::watch) calls do nothing.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.dirs.clear();
        if inner.watcher.take().is_some() {
            debug!(target: "scanner::watcher", "Directory watcher stopped");
        }
    }
}

/// What a filesystem event means for the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Something showed up at this path: a file to add or a directory to walk.
    Appeared(PathBuf),
    /// Something left this path and its kind is unknown.
    Vanished(PathBuf),
    /// One side of a rename; the disk tells whether it arrived or left.
    Renamed(PathBuf),
    /// A file was deleted.
    FileRemoved(PathBuf),
    /// A directory was deleted.
    DirRemoved(PathBuf),
}

/// Translate one notify event into index changes.
///
/// Content writes (`Modify(Data)`) are ignored: the add comes from the
/// `Close(Write)` that ends them.
pub fn classify(event: &Event) -> Vec<Change> {
    let paths = &event.paths;
    let each = |f: fn(PathBuf) -> Change| -> Vec<Change> { paths.iter().cloned().map(f).collect() };

    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        | EventKind::Access(AccessKind::Close(AccessMode::Write)) => each(Change::Appeared),

        EventKind::Modify(ModifyKind::Name(RenameMode::From))
        | EventKind::Remove(RemoveKind::Any)
        | EventKind::Remove(RemoveKind::Other) => each(Change::Vanished),

        EventKind::Remove(RemoveKind::File) => each(Change::FileRemoved),
        EventKind::Remove(RemoveKind::Folder) => each(Change::DirRemoved),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![Change::Vanished(from.clone()), Change::Appeared(to.clone())],
            _ => Vec::new(),
        },

        // The backend could not tell which side of a rename this is.
        EventKind::Modify(ModifyKind::Name(_)) => each(Change::Renamed),

        _ => Vec::new(),
    }
}

/// What is on disk at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Missing,
    Dir,
    File { empty: bool },
    Other,
}

/// Stat `path` on the blocking pool.
async fn path_kind(path: &Path) -> PathKind {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || match std::fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => PathKind::Dir,
        Ok(meta) if meta.is_file() => PathKind::File {
            empty: meta.len() == 0,
        },
        Ok(_) => PathKind::Other,
        Err(_) => PathKind::Missing,
    })
    .await
    .unwrap_or(PathKind::Missing)
}

/// Applies classified events: walks new directories, queues everything else.
struct EventLoop {
    watcher: DirWatcher,
    scanner: Scanner,
    queue: mpsc::Sender<Job>,
}

impl EventLoop {
    async fn run(self, mut events: EventReceiver, mut shutdown: oneshot::Receiver<()>) {
        debug!(target: "scanner::watcher", "Watch loop started");

        loop {
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                result = events.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    warn!(target: "scanner::watcher", error = %e, "Watch error");
                    continue;
                }
            };

            for change in classify(&event) {
                let Some(job) = self.job_for(change).await else {
                    continue;
                };
                if self.queue.send(job).await.is_err() {
                    debug!(target: "scanner::watcher", "Queue closed, stopping watch loop");
                    return;
                }
            }
        }

        debug!(target: "scanner::watcher", "Watch loop stopped");
    }

    async fn job_for(&self, change: Change) -> Option<Job> {
        match change {
            Change::Appeared(path) => {
                let kind = path_kind(&path).await;
                self.appeared(path, kind)
            }
            Change::Renamed(path) => match path_kind(&path).await {
                PathKind::Missing => self.vanished(path),
                kind => self.appeared(path, kind),
            },
            Change::Vanished(path) => self.vanished(path),
            Change::FileRemoved(path) => is_supported_format(&path).then(|| Job::RemoveFile(path)),
            Change::DirRemoved(path) => {
                self.watcher.unwatch_tree(&path);
                Some(Job::RemoveDir(path))
            }
        }
    }

    fn appeared(&self, path: PathBuf, kind: PathKind) -> Option<Job> {
        match kind {
            PathKind::Dir => {
                info!(target: "scanner::watcher", path = %path.display(), "Directory appeared, scanning");
                self.scanner.spawn_walk(path);
                None
            }
            PathKind::File { empty: false } if is_supported_format(&path) => {
                debug!(target: "scanner::watcher", path = %path.display(), "File appeared");
                Some(Job::add(path))
            }
            _ => None,
        }
    }

    fn vanished(&self, path: PathBuf) -> Option<Job> {
        if self.watcher.unwatch_tree(&path) {
            Some(Job::RemoveDir(path))
        } else if is_supported_format(&path) {
            Some(Job::RemoveFile(path))
        } else {
            None
        }
    }
}

/// The running watch loop.
pub struct WatchService {
    watcher: DirWatcher,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl WatchService {
    /// Start consuming `events` from `watcher`.
    pub fn start(
        watcher: DirWatcher,
        events: EventReceiver,
        scanner: Scanner,
        queue: mpsc::Sender<Job>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let event_loop = EventLoop {
            watcher: watcher.clone(),
            scanner,
            queue,
        };
        let task = tokio::spawn(event_loop.run(events, shutdown_rx));

        Self {
            watcher,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn watcher(&self) -> &DirWatcher {
        &self.watcher
    }

    /// Stop the OS watcher and wait for the loop to exit. Idempotent.
    pub async fn stop(&mut self) {
        self.watcher.stop();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(target: "scanner::watcher", error = %e, "Watch loop task failed");
        }
    }
}

impl Drop for WatchService {
    fn drop(&mut self) {
        self.watcher.stop();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use notify::event::{CreateKind, DataChange};
    use tempfile::tempdir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn test_classify_creations_and_writes() {
        for kind in [
            EventKind::Create(CreateKind::File),
            EventKind::Create(CreateKind::Folder),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)),
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
        ] {
            assert_eq!(
                classify(&event(kind, &["/music/a.mp3"])),
                vec![Change::Appeared("/music/a.mp3".into())],
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_classify_removals() {
        assert_eq!(
            classify(&event(EventKind::Remove(RemoveKind::File), &["/m/a.mp3"])),
            vec![Change::FileRemoved("/m/a.mp3".into())]
        );
        assert_eq!(
            classify(&event(EventKind::Remove(RemoveKind::Folder), &["/m/album"])),
            vec![Change::DirRemoved("/m/album".into())]
        );
        assert_eq!(
            classify(&event(EventKind::Remove(RemoveKind::Any), &["/m/x"])),
            vec![Change::Vanished("/m/x".into())]
        );
        assert_eq!(
            classify(&event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/m/x"])),
            vec![Change::Vanished("/m/x".into())]
        );
    }

    #[test]
    fn test_classify_rename_pair() {
        let both = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/m/old", "/m/new"],
        );
        assert_eq!(
            classify(&both),
            vec![Change::Vanished("/m/old".into()), Change::Appeared("/m/new".into())]
        );
    }

    #[test]
    fn test_classify_ambiguous_rename_is_left_to_the_loop() {
        let ambiguous = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            &["/m/here.mp3", "/m/gone.mp3"],
        );
        assert_eq!(
            classify(&ambiguous),
            vec![Change::Renamed("/m/here.mp3".into()), Change::Renamed("/m/gone.mp3".into())]
        );
    }

    #[test]
    fn test_classify_ignores_metadata_changes() {
        let kind = EventKind::Modify(ModifyKind::Metadata(notify::event::MetadataKind::Any));
        assert!(classify(&event(kind, &["/m/a.mp3"])).is_empty());
        let kind = EventKind::Access(AccessKind::Open(notify::event::AccessMode::Any));
        assert!(classify(&event(kind, &["/m/a.mp3"])).is_empty());
    }

    #[test]
    fn test_classify_ignores_content_writes() {
        for data in [DataChange::Any, DataChange::Content, DataChange::Size] {
            let kind = EventKind::Modify(ModifyKind::Data(data));
            assert!(classify(&event(kind, &["/m/a.mp3"])).is_empty(), "{kind:?}");
        }
    }

    #[tokio::test]
    async fn test_path_kind_stats_off_the_runtime() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.mp3");
        let empty = dir.path().join("b.mp3");
        std::fs::write(&file, "x").unwrap();
        std::fs::write(&empty, "").unwrap();

        assert_eq!(path_kind(dir.path()).await, PathKind::Dir);
        assert_eq!(path_kind(&file).await, PathKind::File { empty: false });
        assert_eq!(path_kind(&empty).await, PathKind::File { empty: true });
        assert_eq!(path_kind(&dir.path().join("gone")).await, PathKind::Missing);
    }

    #[tokio::test]
    async fn test_jobs_for_changes() {
        let dir = tempdir().unwrap();
        let album = dir.path().join("album");
        std::fs::create_dir(&album).unwrap();
        let song = dir.path().join("song.mp3");
        let empty = dir.path().join("empty.mp3");
        let cover = dir.path().join("cover.jpg");
        std::fs::write(&song, "x").unwrap();
        std::fs::write(&empty, "").unwrap();
        std::fs::write(&cover, "x").unwrap();

        let (watcher, _events) = DirWatcher::new().unwrap();
        watcher.watch(&album).unwrap();
        let (queue, _jobs) = mpsc::channel(8);
        let scanner = Scanner::new(ScanConfig::default(), queue.clone(), None);
        let event_loop = EventLoop {
            watcher: watcher.clone(),
            scanner,
            queue,
        };

        let job = event_loop.job_for(Change::Appeared(song.clone())).await;
        assert!(matches!(job, Some(Job::Add { path, .. }) if path == song));
        assert!(event_loop.job_for(Change::Appeared(empty)).await.is_none());
        assert!(event_loop.job_for(Change::Appeared(cover)).await.is_none());

        let job = event_loop.job_for(Change::Renamed(song.clone())).await;
        assert!(matches!(job, Some(Job::Add { path, .. }) if path == song));
        let gone = dir.path().join("gone.mp3");
        let job = event_loop.job_for(Change::Renamed(gone.clone())).await;
        assert!(matches!(job, Some(Job::RemoveFile(path)) if path == gone));

        let job = event_loop.job_for(Change::Vanished(album.clone())).await;
        assert!(matches!(job, Some(Job::RemoveDir(path)) if path == album));
        assert!(!watcher.is_watching(&album));
        watcher.stop();
    }

    #[test]
    fn test_unwatch_tree_drops_subtree_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let album = root.join("album");
        let disc = album.join("disc1");
        let sibling = root.join("album2");
        for path in [&album, &disc, &sibling] {
            std::fs::create_dir_all(path).unwrap();
        }

        let (watcher, _events) = DirWatcher::new().unwrap();
        for path in [root, album.as_path(), disc.as_path(), sibling.as_path()] {
            watcher.watch(path).unwrap();
        }
        watcher.watch(&album).unwrap();
        assert_eq!(watcher.watched_count(), 4);

        assert!(watcher.unwatch_tree(&album));
        assert!(!watcher.is_watching(&album));
        assert!(!watcher.is_watching(&disc));
        assert!(watcher.is_watching(&sibling));
        assert!(watcher.is_watching(root));

        assert!(!watcher.unwatch_tree(&root.join("never-watched")));
        watcher.stop();
    }

    #[test]
    fn test_stopped_watcher_ignores_new_directories() {
        let dir = tempdir().unwrap();
        let (watcher, _events) = DirWatcher::new().unwrap();

        watcher.stop();
        watcher.watch(dir.path()).unwrap();
        assert!(!watcher.is_watching(dir.path()));
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let (watcher, _events) = DirWatcher::new().unwrap();

        let err = watcher.watch(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, WatchError::Watch { .. }));
        assert_eq!(watcher.watched_count(), 0);
    }
}
