//! Cache lifecycle and the cache-first fetch policy.
//!
//! Lifecycle: `install` pre-caches the configured URLs into the current
//! generation, `activate` removes every other generation and starts
//! intercepting. A cache hit is served at once while a background fetch
//! refreshes the entry; a miss goes to the network and caches a 200.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use log::{debug, info, warn};
use serde::Deserialize;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

use crate::config::{url_host, CacheConfig};
use crate::offline_cache::{AssetFetcher, AssetRequest, AssetResponse, CacheStorage};

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Offline</title>
<style>
body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; background: #0f0f1a; color: #e8e8f0;
       display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; text-align: center; }
p { color: #a8a8b8; line-height: 1.6; }
</style>
</head>
<body>
<div>
<h2>You are offline</h2>
<p>This page is not available without an internet connection.</p>
<p>Check your connection and try again.</p>
</div>
</body>
</html>"#;

const NETWORK_ERROR_TEXT: &str = "Network error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    New,
    Installed,
    Active,
}

/// Control messages posted by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheMessage {
    /// Activate immediately instead of waiting.
    SkipWaiting,
    /// Drop the current generation.
    ClearCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// Synthesized after a network failure.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the caller performs the request itself.
    Passthrough,
    Respond {
        response: AssetResponse,
        source: ResponseSource,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub cached: usize,
    pub failed: Vec<String>,
}

struct CacheInner {
    config: CacheConfig,
    storage: CacheStorage,
    fetcher: Arc<dyn AssetFetcher>,
    runtime: Handle,
    state: RwLock<WorkerState>,
    tasks: Mutex<JoinSet<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct OfflineCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for OfflineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCache")
            .field("generation", &self.inner.config.generation)
            .field("state", &self.state())
            .finish()
    }
}

impl OfflineCache {
    pub fn new(config: CacheConfig, fetcher: Arc<dyn AssetFetcher>, runtime: Handle) -> Self {
        Self::with_storage(config, fetcher, runtime, CacheStorage::new())
    }

    /// Starts from existing storage, e.g. one holding older generations.
    pub fn with_storage(
        config: CacheConfig,
        fetcher: Arc<dyn AssetFetcher>,
        runtime: Handle,
        storage: CacheStorage,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                config,
                storage,
                fetcher,
                runtime,
                state: RwLock::new(WorkerState::New),
                tasks: Mutex::new(JoinSet::new()),
            }),
        }
    }

    pub fn generation(&self) -> &str {
        &self.inner.config.generation
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.inner.storage
    }

    pub fn state(&self) -> WorkerState {
        self.inner
            .state
            .read()
            .map(|s| *s)
            .unwrap_or(WorkerState::New)
    }

    fn set_state(&self, state: WorkerState) {
        match self.inner.state.write() {
            Ok(mut slot) => *slot = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.inner.config.origin.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }

    /// Pre-caches every configured URL. One failure never stops the rest.
    pub async fn install(&self) -> InstallReport {
        info!("[cache] installing {}", self.generation());
        let generation = self.generation().to_string();
        self.inner.storage.open(&generation);

        let mut report = InstallReport::default();
        for url in &self.inner.config.precache_urls {
            let url = self.resolve(url);
            let request = AssetRequest::get(url.clone());
            match self.inner.fetcher.fetch(&request).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    self.inner.storage.put(&generation, &url, &response);
                    report.cached += 1;
                }
                Ok(response) => {
                    warn!("[cache] failed to cache {url}: status {}", response.status);
                    report.failed.push(url);
                }
                Err(e) => {
                    warn!("[cache] failed to cache {url}: {e}");
                    report.failed.push(url);
                }
            }
        }

        info!(
            "[cache] pre-caching complete: {} cached, {} failed",
            report.cached,
            report.failed.len()
        );
        self.set_state(WorkerState::Installed);
        report
    }

    /// Deletes every other generation and starts intercepting requests.
    pub fn activate(&self) {
        for name in self.inner.storage.generations() {
            if name != self.generation() {
                info!("[cache] deleting old cache: {name}");
                self.inner.storage.delete(&name);
            }
        }
        self.inner.storage.open(self.generation());
        self.set_state(WorkerState::Active);
    }

    pub fn handle_message(&self, message: CacheMessage) {
        match message {
            CacheMessage::SkipWaiting => {
                if self.state() != WorkerState::Active {
                    self.activate();
                }
            }
            CacheMessage::ClearCache => {
                self.inner.storage.delete(self.generation());
                info!("[cache] cache cleared");
            }
        }
    }

    fn intercepts(&self, request: &AssetRequest) -> bool {
        if self.state() != WorkerState::Active || !request.is_get() {
            return false;
        }
        let Some(host) = url_host(&request.url) else {
            return false;
        };
        !self
            .inner
            .config
            .bypass_hosts
            .iter()
            .any(|bypass| bypass.eq_ignore_ascii_case(&host))
    }

    pub async fn handle_fetch(&self, request: &AssetRequest) -> FetchOutcome {
        if !self.intercepts(request) {
            return FetchOutcome::Passthrough;
        }

        if let Some(cached) = self.inner.storage.lookup(self.generation(), &request.url) {
            debug!("[cache] serving from cache: {}", request.url);
            self.revalidate(request.clone());
            return FetchOutcome::Respond {
                response: cached,
                source: ResponseSource::Cache,
            };
        }

        debug!("[cache] fetching from network: {}", request.url);
        match self.inner.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_ok() {
                    self.inner
                        .storage
                        .put(self.generation(), &request.url, &response);
                }
                FetchOutcome::Respond {
                    response,
                    source: ResponseSource::Network,
                }
            }
            Err(e) => {
                warn!("[cache] fetch failed for {}: {e}", request.url);
                FetchOutcome::Respond {
                    response: offline_response(request),
                    source: ResponseSource::Fallback,
                }
            }
        }
    }

    /// Refreshes a cached entry in the background.
    fn revalidate(&self, request: AssetRequest) {
        let inner = Arc::clone(&self.inner);
        let task = async move {
            match inner.fetcher.fetch(&request).await {
                Ok(response) if response.is_ok() => {
                    inner
                        .storage
                        .put(&inner.config.generation, &request.url, &response);
                }
                Ok(_) => {}
                Err(e) => debug!("[cache] background fetch failed for {}: {e}", request.url),
            }
        };
        let mut tasks = lock(&self.inner.tasks);
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(task, &self.inner.runtime);
    }

    /// Background revalidations that have not finished yet.
    pub fn revalidations_in_flight(&self) -> usize {
        let mut tasks = lock(&self.inner.tasks);
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Waits for all background revalidations.
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *lock(&self.inner.tasks));
            if tasks.is_empty() {
                break;
            }
            while tasks.join_next().await.is_some() {}
        }
    }
}

fn offline_response(request: &AssetRequest) -> AssetResponse {
    if request.accepts_html() {
        AssetResponse::new(200, Some("text/html; charset=utf-8"), OFFLINE_PAGE)
    } else {
        AssetResponse::new(408, Some("text/plain"), NETWORK_ERROR_TEXT)
    }
}
