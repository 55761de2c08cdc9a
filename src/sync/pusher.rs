//! Outbound propagation of local changes.
//!
//! Progress pushes are debounced per book: each write restarts that book's
//! timer and only the latest record is sent when it expires. Every other
//! change is pushed right away as a detached task. All tasks live in one
//! `JoinSet` so callers can wait for them with [`Pusher::drain`]; finished
//! and aborted ones are reaped on every spawn so the set only holds work
//! still in flight.
//!
//! Pushes are best effort. A failed or abandoned push is repaired by the
//! next full sync.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinSet};

use crate::change_feed::{Change, ChangeListener};
use crate::config::SyncConfig;
use crate::local_db_model::ReadingProgress;
use crate::now_ms;
use crate::remote::RemoteClient;
use crate::sync::Connectivity;

struct PendingPush {
    progress: ReadingProgress,
    generation: u64,
    timer: AbortHandle,
}

struct PusherInner {
    remote: RemoteClient,
    connectivity: Connectivity,
    runtime: Handle,
    debounce: Duration,
    synced_keys: HashSet<String>,
    pending: Mutex<HashMap<String, PendingPush>>,
    tasks: Mutex<JoinSet<()>>,
    generation: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops every task that already completed or was cancelled.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            if e.is_panic() {
                warn!("[sync] push task panicked: {e}");
            }
        }
    }
}

#[derive(Clone)]
pub struct Pusher {
    inner: Arc<PusherInner>,
}

impl std::fmt::Debug for Pusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pusher")
            .field("debounce", &self.inner.debounce)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Pusher {
    /// Tasks are spawned on `runtime`, so changes may arrive from any thread.
    pub fn new(
        remote: RemoteClient,
        connectivity: Connectivity,
        config: &SyncConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(PusherInner {
                remote,
                connectivity,
                runtime,
                debounce: Duration::from_millis(config.debounce_ms),
                synced_keys: config.synced_setting_keys.iter().cloned().collect(),
                pending: Mutex::new(HashMap::new()),
                tasks: Mutex::new(JoinSet::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Books with a debounced push still waiting.
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Detached tasks not yet finished, timers included.
    pub fn tasks_in_flight(&self) -> usize {
        let mut tasks = lock(&self.inner.tasks);
        reap(&mut tasks);
        tasks.len()
    }

    pub fn is_synced_setting(&self, key: &str) -> bool {
        self.inner.synced_keys.contains(key)
    }

    /// Cancels every debounce timer and pushes the latest records now.
    pub fn flush(&self) {
        let due: Vec<PendingPush> = lock(&self.inner.pending).drain().map(|(_, p)| p).collect();
        for pending in due {
            pending.timer.abort();
            self.inner.push_progress(pending.progress);
        }
    }

    /// Waits until every detached task, including running debounce timers,
    /// has finished.
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.inner.tasks));
            if tasks.is_empty() {
                break;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    if e.is_panic() {
                        warn!("[sync] push task panicked: {e}");
                    }
                }
            }
        }
    }

    fn schedule_progress(&self, progress: ReadingProgress) {
        let inner = &self.inner;
        let generation = inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let key = progress.book_path.clone();

        let mut pending = lock(&inner.pending);
        if let Some(previous) = pending.remove(&key) {
            previous.timer.abort();
        }

        let fire = {
            let inner = Arc::clone(inner);
            let key = key.clone();
            async move {
                tokio::time::sleep(inner.debounce).await;
                inner.fire(&key, generation);
            }
        };
        let timer = inner.spawn(fire);
        debug!("[sync] progress push for {key} scheduled");
        pending.insert(
            key,
            PendingPush {
                progress,
                generation,
                timer,
            },
        );
    }
}

impl PusherInner {
    fn detach<F>(self: &Arc<Self>, label: &'static str, push: F)
    where
        F: Future<Output = bool> + Send + 'static,
    {
        if !self.connectivity.is_online() {
            debug!("[sync] offline, {label} left for the next full sync");
            return;
        }
        let task = async move {
            if !push.await {
                debug!("[sync] {label} not delivered");
            }
        };
        self.spawn(task);
    }

    fn spawn<F>(&self, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = lock(&self.tasks);
        reap(&mut tasks);
        tasks.spawn_on(task, &self.runtime)
    }

    /// Timer expiry. Stale generations were superseded or flushed.
    fn fire(self: &Arc<Self>, key: &str, generation: u64) {
        let due = {
            let mut pending = lock(&self.pending);
            match pending.get(key) {
                Some(p) if p.generation == generation => pending.remove(key),
                _ => None,
            }
        };
        if let Some(due) = due {
            self.push_progress(due.progress);
        }
    }

    fn push_progress(self: &Arc<Self>, progress: ReadingProgress) {
        let remote = self.remote.clone();
        self.detach("progress push", async move {
            remote.push_progress(&progress, now_ms()).await
        });
    }

    fn propagate(self: &Arc<Self>, change: Change) {
        let remote = self.remote.clone();
        match change {
            Change::Progress(_) => {}
            Change::HighlightAdded(h) => {
                self.detach("highlight push", async move { remote.push_highlight(&h).await })
            }
            Change::HighlightDeleted(key) => self.detach("highlight delete", async move {
                remote.delete_highlight(&key).await
            }),
            Change::CommentAdded(c) => {
                self.detach("comment push", async move { remote.push_comment(&c).await })
            }
            Change::CommentDeleted(key) => self.detach("comment delete", async move {
                remote.delete_comment(&key).await
            }),
            Change::BookmarkAdded(b) => {
                self.detach("bookmark push", async move { remote.push_bookmark(&b).await })
            }
            Change::BookmarkDeleted(key) => self.detach("bookmark delete", async move {
                remote.delete_bookmark(&key).await
            }),
            Change::SettingChanged { key, value } => {
                if !self.synced_keys.contains(&key) {
                    return;
                }
                self.detach("setting push", async move {
                    remote.push_setting(&key, &value, now_ms()).await
                })
            }
        }
    }
}

impl ChangeListener for Pusher {
    fn on_change(&self, change: Change) {
        match change {
            Change::Progress(progress) => self.schedule_progress(progress),
            other => self.inner.propagate(other),
        }
    }
}
