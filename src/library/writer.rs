//! The serialized writer: the only task that mutates the index store.
//!
//! Scanner walks, the watcher and [`Library::add_media`](super::Library::add_media)
//! all push [`Job`]s onto one bounded queue. The writer applies them in FIFO
//! order, logging per-file failures instead of propagating them, so one bad
//! file never stalls the queue.
//!
//! # Idle detection
//!
//! Whenever the queue has been empty for [`IDLE_AFTER`], the writer offers an
//! idle signal to callers currently parked in [`IdleWaiter::wait`]. The signal
//! is advisory: it only says the writer was idle at that instant. Callers that
//! need "everything settled" re-check their condition after each signal.

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::ingest;
use crate::db;
use crate::error::Result;
use crate::metadata::TagReader;

/// Capacity of the work queue.
pub const QUEUE_CAPACITY: usize = 100;

/// How long the queue must stay empty before the writer reports idle.
pub const IDLE_AFTER: Duration = Duration::from_millis(10);

/// How long an idle offer waits for a caller to show up.
const IDLE_OFFER: Duration = Duration::from_millis(1);

/// One unit of work for the writer.
#[derive(Debug)]
pub enum Job {
    /// Ingest a media file. `reply` receives the outcome when present.
    Add {
        path: PathBuf,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Forget the track stored under exactly this path
    RemoveFile(PathBuf),
    /// Forget every track below this directory
    RemoveDir(PathBuf),
}

impl Job {
    /// Fire-and-forget ingestion of `path`.
    pub fn add(path: impl Into<PathBuf>) -> Self {
        Self::Add {
            path: path.into(),
            reply: None,
        }
    }
}

/// Create the writer's idle signal and the caller-side handle.
pub fn idle_channel() -> (IdleSignal, IdleWaiter) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        IdleSignal {
            waiters: rx,
            pending: Vec::new(),
        },
        IdleWaiter { tx },
    )
}

/// Writer side of the idle protocol.
#[derive(Debug)]
pub struct IdleSignal {
    waiters: mpsc::UnboundedReceiver<oneshot::Sender<()>>,
    pending: Vec<oneshot::Sender<()>>,
}

impl IdleSignal {
    /// Tell every parked caller the writer is idle.
    ///
    /// Waits at most a millisecond for a caller to appear. Callers are only
    /// released if `still_idle` holds once they have been collected, otherwise
    /// they stay parked until a later offer. Returns whether the signal
    /// reached anyone.
    pub async fn notify_idle(&mut self, still_idle: impl Fn() -> bool) -> bool {
        if let Ok(Some(waiter)) = tokio::time::timeout(IDLE_OFFER, self.waiters.recv()).await {
            self.pending.push(waiter);
        }
        while let Ok(waiter) = self.waiters.try_recv() {
            self.pending.push(waiter);
        }

        if self.pending.is_empty() || !still_idle() {
            return false;
        }

        let mut delivered = false;
        for waiter in self.pending.drain(..) {
            delivered |= waiter.send(()).is_ok();
        }
        delivered
    }
}

/// Caller side of the idle protocol.
#[derive(Debug, Clone)]
pub struct IdleWaiter {
    tx: mpsc::UnboundedSender<oneshot::Sender<()>>,
}

impl IdleWaiter {
    /// Park until the writer next reports idle.
    ///
    /// Returns `false` if the writer has stopped, in which case there is
    /// nothing left to wait for.
    pub async fn wait(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(tx).is_err() {
            return false;
        }
        rx.await.is_ok()
    }
}

/// The writer task's state.
pub struct Writer {
    pool: SqlitePool,
    reader: Arc<dyn TagReader>,
    queue: mpsc::Receiver<Job>,
    idle: IdleSignal,
}

impl Writer {
    pub fn new(
        pool: SqlitePool,
        reader: Arc<dyn TagReader>,
        queue: mpsc::Receiver<Job>,
        idle: IdleSignal,
    ) -> Self {
        Self {
            pool,
            reader,
            queue,
            idle,
        }
    }

    /// Start the writer. The handle resolves once the queue is closed and
    /// drained.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!(target: "library::writer", "Writer started");

        loop {
            tokio::select! {
                biased;
                job = self.queue.recv() => match job {
                    Some(job) => self.apply(job).await,
                    None => break,
                },
                _ = tokio::time::sleep(IDLE_AFTER) => {
                    let queue = &self.queue;
                    self.idle.notify_idle(|| queue.is_empty()).await;
                }
            }
        }

        info!(target: "library::writer", "Writer stopped");
    }

    async fn apply(&self, job: Job) {
        match job {
            Job::Add { path, reply } => {
                let result = ingest::add_media(&self.pool, &self.reader, &path).await;
                if let Err(e) = &result {
                    warn!(target: "library::writer", path = %path.display(), error = %e, "Error adding media to library");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Job::RemoveFile(path) => {
                match db::remove_by_path(&self.pool, &path.to_string_lossy()).await {
                    Ok(0) => {
                        debug!(target: "library::writer", path = %path.display(), "Removed file was not indexed")
                    }
                    Ok(_) => {
                        info!(target: "library::writer", path = %path.display(), "Track removed from library")
                    }
                    Err(e) => {
                        warn!(target: "library::writer", path = %path.display(), error = %e, "Error removing file")
                    }
                }
            }
            Job::RemoveDir(path) => {
                match db::remove_by_path_prefix(&self.pool, &path.to_string_lossy()).await {
                    Ok(removed) => {
                        debug!(target: "library::writer", path = %path.display(), removed, "Directory removed from library")
                    }
                    Err(e) => {
                        warn!(target: "library::writer", path = %path.display(), error = %e, "Error removing directory")
                    }
                }
            }
        }
    }
}
