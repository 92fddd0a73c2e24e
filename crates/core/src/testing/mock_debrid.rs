//! Mock debrid service and torrent searcher for testing.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::debrid::selection::hash_from_magnet;
use crate::debrid::{
    DebridError, DebridService, DebridTorrent, SearchError, TorrentCandidate, TorrentSearcher,
};

use super::fixtures;

#[derive(Debug, Default)]
struct DebridState {
    cached: HashSet<String>,
    cache_checks: Vec<Vec<String>>,
    added: Vec<String>,
    torrents: BTreeMap<u64, DebridTorrent>,
    next_id: u64,
    ready_after_polls: u32,
    polls: u32,
}

/// Mock implementation of the DebridService trait.
///
/// Provides controllable behavior for testing:
/// - Mark hashes as cached on the service
/// - Make added torrents playable only after a number of polls
/// - Fail the next operation with a configured error
/// - Record cache checks and added magnets for assertions
///
/// Cached torrents are playable as soon as they are added.
#[derive(Debug, Default)]
pub struct MockDebridService {
    state: Arc<RwLock<DebridState>>,
    next_error: Arc<RwLock<Option<DebridError>>>,
}

impl MockDebridService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark these hashes as already cached on the service.
    pub async fn set_cached(&self, hashes: &[&str]) {
        let mut state = self.state.write().await;
        state.cached = hashes.iter().map(|h| h.to_lowercase()).collect();
    }

    /// Uncached torrents become playable once `get_torrent` has been called
    /// this many times. Zero means playable immediately.
    pub async fn set_ready_after_polls(&self, polls: u32) {
        self.state.write().await.ready_after_polls = polls;
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: DebridError) {
        *self.next_error.write().await = Some(error);
    }

    /// Hash batches passed to `check_cached`.
    pub async fn cache_checks(&self) -> Vec<Vec<String>> {
        self.state.read().await.cache_checks.clone()
    }

    pub async fn added_magnets(&self) -> Vec<String> {
        self.state.read().await.added.clone()
    }

    /// Number of `get_torrent` calls so far.
    pub async fn poll_count(&self) -> u32 {
        self.state.read().await.polls
    }

    async fn take_error(&self) -> Result<(), DebridError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DebridService for MockDebridService {
    fn name(&self) -> &str {
        "mock-debrid"
    }

    async fn check_cached(&self, hashes: &[String]) -> Result<HashMap<String, bool>, DebridError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        state.cache_checks.push(hashes.to_vec());
        Ok(hashes
            .iter()
            .map(|h| {
                let hash = h.to_lowercase();
                let cached = state.cached.contains(&hash);
                (hash, cached)
            })
            .collect())
    }

    async fn add_magnet(&self, magnet: &str) -> Result<DebridTorrent, DebridError> {
        self.take_error().await?;
        let hash = hash_from_magnet(magnet)
            .ok_or_else(|| DebridError::InvalidResponse(format!("bad magnet: {}", magnet)))?;

        let mut state = self.state.write().await;
        state.added.push(magnet.to_string());
        state.next_id += 1;
        let id = state.next_id;
        let ready = state.cached.contains(&hash) || state.ready_after_polls == 0;
        let torrent = fixtures::debrid_torrent(id, &hash, ready);
        state.torrents.insert(id, torrent.clone());
        Ok(torrent)
    }

    async fn get_torrent(&self, id: u64) -> Result<DebridTorrent, DebridError> {
        self.take_error().await?;
        let mut state = self.state.write().await;
        state.polls += 1;
        let ready = state.polls >= state.ready_after_polls;

        let torrent = state
            .torrents
            .get_mut(&id)
            .ok_or_else(|| DebridError::TorrentNotFound(id.to_string()))?;
        if ready && !torrent.is_ready() {
            *torrent = fixtures::debrid_torrent(id, &torrent.hash, true);
        }
        Ok(torrent.clone())
    }

    async fn list_torrents(&self) -> Result<Vec<DebridTorrent>, DebridError> {
        self.take_error().await?;
        Ok(self.state.read().await.torrents.values().cloned().collect())
    }

    async fn delete_torrent(&self, id: u64) -> Result<bool, DebridError> {
        self.take_error().await?;
        Ok(self.state.write().await.torrents.remove(&id).is_some())
    }

    async fn download_link(&self, torrent_id: u64, file_id: u64) -> Result<String, DebridError> {
        self.take_error().await?;
        Ok(format!(
            "https://mock-debrid.example/dl/{}/{}",
            torrent_id, file_id
        ))
    }
}

/// Mock implementation of the TorrentSearcher trait.
#[derive(Debug)]
pub struct MockTorrentSearcher {
    name: String,
    results: Arc<RwLock<Vec<TorrentCandidate>>>,
    queries: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<SearchError>>>,
}

impl Default for MockTorrentSearcher {
    fn default() -> Self {
        Self::named("mock")
    }
}

impl MockTorrentSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            results: Arc::default(),
            queries: Arc::default(),
            next_error: Arc::default(),
        }
    }

    /// Set the results returned for every query.
    pub async fn set_results(&self, results: Vec<TorrentCandidate>) {
        *self.results.write().await = results;
    }

    /// Configure the next search to fail with the given error.
    pub async fn set_next_error(&self, error: SearchError) {
        *self.next_error.write().await = Some(error);
    }

    /// Queries searched so far.
    pub async fn queries(&self) -> Vec<String> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl TorrentSearcher for MockTorrentSearcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str) -> Result<Vec<TorrentCandidate>, SearchError> {
        self.queries.write().await.push(query.to_string());
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        Ok(self.results.read().await.clone())
    }
}
