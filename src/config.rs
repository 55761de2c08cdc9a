//! Runtime configuration for the store, the sync engine and the asset cache.

use log::warn;
use serde::Deserialize;

/// Default LMDB map size (64 MiB).
pub const DEFAULT_MAP_SIZE: usize = 64 * 1024 * 1024;

/// Default debounce window for progress pushes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 5_000;

/// Default cadence of the opportunistic full sync.
pub const DEFAULT_PERIODIC_SYNC_SECS: u64 = 45;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_CACHE_GENERATION: &str = "books-library-v10";

/// Settings mirrored to the remote store; everything else stays local.
pub const DEFAULT_SYNCED_SETTING_KEYS: [&str; 4] = ["theme", "fontSize", "fontFamily", "zoom"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Database name; the environment lives in `<path>.lmdb`.
    pub path: String,
    pub map_size_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "reader_library".to_string(),
            map_size_bytes: DEFAULT_MAP_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    /// Base URL of the remote database. `None` disables remote sync.
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    pub debounce_ms: u64,
    pub periodic_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub synced_setting_keys: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            periodic_interval_secs: DEFAULT_PERIODIC_SYNC_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            synced_setting_keys: DEFAULT_SYNCED_SETTING_KEYS
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

impl SyncConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint
            .as_deref()
            .map(|e| !e.trim().is_empty())
            .unwrap_or(false)
    }

    /// Host part of the endpoint, used to exempt sync traffic from the cache.
    pub fn endpoint_host(&self) -> Option<String> {
        self.endpoint.as_deref().and_then(url_host)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub generation: String,
    /// Scheme and host the app is served from, prepended to relative precache paths.
    pub origin: String,
    pub precache_urls: Vec<String>,
    /// Hosts whose requests always go to the network.
    pub bypass_hosts: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            generation: DEFAULT_CACHE_GENERATION.to_string(),
            origin: "http://localhost:8000".to_string(),
            precache_urls: Vec::new(),
            bypass_hosts: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut config: Config = serde_json::from_str(json)?;
        config.link_sections();
        Ok(config)
    }

    /// Builds a configuration from defaults overridden by `READER_*` variables.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Ok(path) = std::env::var("READER_DB_PATH") {
            config.store.path = path;
        }
        if let Ok(url) = std::env::var("READER_SYNC_URL") {
            if !url.trim().is_empty() {
                config.sync.endpoint = Some(url);
            }
        }
        if let Ok(token) = std::env::var("READER_SYNC_TOKEN") {
            config.sync.auth_token = Some(token);
        }
        if let Ok(raw) = std::env::var("READER_SYNC_DEBOUNCE_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.sync.debounce_ms = ms,
                Err(e) => warn!("Ignoring READER_SYNC_DEBOUNCE_MS={raw}: {e}"),
            }
        }
        if let Ok(generation) = std::env::var("READER_CACHE_GENERATION") {
            config.cache.generation = generation;
        }
        config.link_sections();
        config
    }

    /// The sync endpoint must never be served from cache.
    fn link_sections(&mut self) {
        if let Some(host) = self.sync.endpoint_host() {
            if !self.cache.bypass_hosts.contains(&host) {
                self.cache.bypass_hosts.push(host);
            }
        }
    }
}

/// Extracts the host of an absolute http(s) URL.
pub(crate) fn url_host(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}
