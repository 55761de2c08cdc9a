//! Host-facing facade tying the Local Store, the Sync Engine, the offline
//! cache and the document channel together behind one owned handle.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;

use crate::change_feed::ChangeListener;
use crate::channel::{directives_for_open, EventOutcome, ReaderDirective, ReaderEvent, ReaderSession};
use crate::config::Config;
use crate::error::Result;
use crate::local_db_state::LocalStore;
use crate::offline_cache::{AssetRequest, FetchOutcome, HttpFetcher, InstallReport, OfflineCache};
use crate::remote::{HttpTransport, PipelineTransport, RemoteClient};
use crate::sync::{Connectivity, Pusher, SyncEngine, SyncReport};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct RemoteSync {
    engine: SyncEngine,
    pusher: Pusher,
    periodic: Option<JoinHandle<()>>,
    startup: Mutex<Option<JoinHandle<()>>>,
}

/// One open library: store, runtime and (when configured) remote sync.
pub struct ReaderLibrary {
    runtime: Runtime,
    store: Arc<LocalStore>,
    connectivity: Connectivity,
    sync: Option<RemoteSync>,
    cache: Option<OfflineCache>,
}

impl std::fmt::Debug for ReaderLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderLibrary")
            .field("store", &self.store)
            .field("online", &self.connectivity.is_online())
            .field("sync", &self.sync.is_some())
            .finish()
    }
}

impl ReaderLibrary {
    /// Opens the store and, if an endpoint is configured, starts sync over HTTP.
    ///
    /// A remote that cannot be set up is logged and the library runs local-only.
    pub fn open(config: Config) -> Result<Self> {
        let transport: Option<Arc<dyn PipelineTransport>> = if config.sync.is_enabled() {
            match HttpTransport::new(&config.sync) {
                Ok(t) => Some(Arc::new(t)),
                Err(e) => {
                    warn!("[sync] Remote disabled: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self::build(config, transport)
    }

    /// Opens the library over an arbitrary pipeline transport.
    pub fn with_transport(config: Config, transport: Arc<dyn PipelineTransport>) -> Result<Self> {
        Self::build(config, Some(transport))
    }

    fn build(config: Config, transport: Option<Arc<dyn PipelineTransport>>) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("reader-sync")
            .enable_all()
            .build()?;
        let store = Arc::new(LocalStore::open(&config.store)?);
        let connectivity = Connectivity::default();

        let sync = transport.map(|transport| {
            let remote = RemoteClient::new(transport);
            let pusher = Pusher::new(
                remote.clone(),
                connectivity.clone(),
                &config.sync,
                runtime.handle().clone(),
            );
            store.set_listener(Arc::new(pusher.clone()) as Arc<dyn ChangeListener>);
            let engine = SyncEngine::new(Arc::clone(&store), remote, connectivity.clone());

            let startup = {
                let engine = engine.clone();
                runtime.spawn(async move {
                    if engine.remote().ensure_schema().await {
                        engine.full_sync().await;
                    } else {
                        warn!("[sync] Remote schema unavailable, waiting for the next sync");
                    }
                })
            };
            let periodic = (config.sync.periodic_interval_secs > 0).then(|| {
                let _guard = runtime.enter();
                engine.spawn_periodic(Duration::from_secs(config.sync.periodic_interval_secs))
            });

            RemoteSync {
                engine,
                pusher,
                periodic,
                startup: Mutex::new(Some(startup)),
            }
        });

        let cache = match HttpFetcher::new(Duration::from_secs(config.sync.request_timeout_secs)) {
            Ok(fetcher) => Some(OfflineCache::new(
                config.cache.clone(),
                Arc::new(fetcher),
                runtime.handle().clone(),
            )),
            Err(e) => {
                warn!("[cache] Offline cache disabled: {e}");
                None
            }
        };

        info!(
            "Library opened at {} (remote sync {})",
            store.path().display(),
            if sync.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            runtime,
            store,
            connectivity,
            sync,
            cache,
        })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn has_remote(&self) -> bool {
        self.sync.is_some()
    }

    /// Starts a reading session and returns what the document should restore.
    pub fn open_book(&self, book_path: &str, book_title: &str) -> (ReaderSession, Vec<ReaderDirective>) {
        let session = ReaderSession::open(&self.store, book_path, book_title, crate::now_ms());
        let directives = directives_for_open(&self.store, book_path);
        (session, directives)
    }

    pub fn dispatch(&self, session: &mut ReaderSession, event: ReaderEvent) -> EventOutcome {
        session.apply(&self.store, event, crate::now_ms())
    }

    pub fn tick(&self, session: &ReaderSession) {
        session.tick(&self.store, crate::now_ms());
    }

    pub fn close_book(&self, session: ReaderSession) {
        session.close(&self.store, crate::now_ms());
    }

    pub fn export_json(&self) -> Option<String> {
        self.store.export_json()
    }

    pub fn import_json(&self, json: &str) -> Result<()> {
        self.store.import_json(json)
    }

    /// Runs a full sync now. `None` when no remote is configured.
    pub fn full_sync(&self) -> Option<SyncReport> {
        let sync = self.sync.as_ref()?;
        let startup = sync
            .startup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Some(self.runtime.block_on(async {
            if let Some(startup) = startup {
                let _ = startup.await;
            }
            if self.connectivity.is_online() {
                sync.engine.remote().ensure_schema().await;
            }
            sync.engine.full_sync_report().await
        }))
    }

    /// Records a connectivity change. Coming back online starts a full sync
    /// in the background; returns whether one was started.
    pub fn set_online(&self, online: bool) -> bool {
        let came_online = self.connectivity.set_online(online);
        if !came_online {
            return false;
        }
        match &self.sync {
            Some(sync) => {
                info!("[sync] Back online, syncing");
                let engine = sync.engine.clone();
                self.runtime.spawn(async move {
                    engine.full_sync().await;
                });
                true
            }
            None => false,
        }
    }

    pub fn offline_cache(&self) -> Option<&OfflineCache> {
        self.cache.as_ref()
    }

    /// Pre-caches the configured assets, then activates the current
    /// generation and drops older ones.
    pub fn prepare_cache(&self) -> Option<InstallReport> {
        let cache = self.cache.as_ref()?;
        let report = self.runtime.block_on(cache.install());
        cache.activate();
        Some(report)
    }

    /// Answers an asset request through the offline cache.
    pub fn fetch_asset(&self, request: &AssetRequest) -> FetchOutcome {
        match &self.cache {
            Some(cache) => self.runtime.block_on(cache.handle_fetch(request)),
            None => FetchOutcome::Passthrough,
        }
    }

    /// Sends every debounced push now and waits for all pushes in flight.
    pub fn flush(&self) {
        if let Some(sync) = &self.sync {
            sync.pusher.flush();
            self.runtime.block_on(sync.pusher.drain());
        }
    }

    /// Stops background sync, delivers pending pushes and releases the store.
    pub fn close(self) {
        self.store.clear_listener();
        if let Some(sync) = &self.sync {
            if let Some(periodic) = &sync.periodic {
                periodic.abort();
            }
        }
        self.flush();
        self.runtime.shutdown_timeout(SHUTDOWN_GRACE);
        info!("Library at {} closed", self.store.path().display());
    }
}
