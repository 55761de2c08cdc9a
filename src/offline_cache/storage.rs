//! Named cache generations over a content-addressed blob store.
//!
//! An entry maps a URL to a response head plus the SHA-256 digest of its
//! body. Identical bodies cached under several URLs or generations are
//! stored once. Deleting a generation prunes blobs nothing references.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use sha2::{Digest, Sha256};

use crate::offline_cache::AssetResponse;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheEntry {
    status: u16,
    content_type: Option<String>,
    digest: String,
}

#[derive(Debug, Default)]
struct StorageState {
    generations: HashMap<String, HashMap<String, CacheEntry>>,
    blobs: HashMap<String, Arc<[u8]>>,
}

impl StorageState {
    fn prune(&mut self) -> usize {
        let live: HashSet<&String> = self
            .generations
            .values()
            .flat_map(|entries| entries.values().map(|e| &e.digest))
            .collect();
        let dead: Vec<String> = self
            .blobs
            .keys()
            .filter(|digest| !live.contains(digest))
            .cloned()
            .collect();
        for digest in &dead {
            self.blobs.remove(digest);
        }
        dead.len()
    }
}

pub fn content_digest(body: &[u8]) -> String {
    format!("{:x}", Sha256::digest(body))
}

#[derive(Debug, Default)]
pub struct CacheStorage {
    state: Mutex<StorageState>,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StorageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the generation if it does not exist yet.
    pub fn open(&self, generation: &str) {
        self.state()
            .generations
            .entry(generation.to_string())
            .or_default();
    }

    pub fn put(&self, generation: &str, url: &str, response: &AssetResponse) {
        let digest = content_digest(&response.body);
        let mut state = self.state();
        state
            .blobs
            .entry(digest.clone())
            .or_insert_with(|| Arc::clone(&response.body));
        let previous = state
            .generations
            .entry(generation.to_string())
            .or_default()
            .insert(
                url.to_string(),
                CacheEntry {
                    status: response.status,
                    content_type: response.content_type.clone(),
                    digest,
                },
            );
        if previous.is_some() {
            state.prune();
        }
    }

    pub fn lookup(&self, generation: &str, url: &str) -> Option<AssetResponse> {
        let state = self.state();
        let entry = state.generations.get(generation)?.get(url)?;
        let body = state.blobs.get(&entry.digest)?;
        Some(AssetResponse {
            status: entry.status,
            content_type: entry.content_type.clone(),
            body: Arc::clone(body),
        })
    }

    /// Returns whether the generation existed.
    pub fn delete(&self, generation: &str) -> bool {
        let mut state = self.state();
        let existed = state.generations.remove(generation).is_some();
        if existed {
            let pruned = state.prune();
            debug!("[cache] deleted {generation}, pruned {pruned} blob(s)");
        }
        existed
    }

    pub fn generations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state().generations.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entry_count(&self, generation: &str) -> usize {
        self.state()
            .generations
            .get(generation)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn blob_count(&self) -> usize {
        self.state().blobs.len()
    }
}
