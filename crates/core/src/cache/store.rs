use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::resolver::StreamResolution;
use crate::source::EpisodeList;

use super::{CacheError, EpisodesKey, Fingerprint, StreamKey};

/// Which of the two caches an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Episodes,
    Stream,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodes => "episodes",
            Self::Stream => "stream",
        }
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached value with its provenance.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: Arc<T>,
    pub created_at: DateTime<Utc>,
    /// Fingerprint the entry was written under.
    pub key: Fingerprint,
    /// Normalized anime identifier, used for per-anime invalidation.
    pub anime_id: String,
}

impl<T> CacheEntry<T> {
    fn new(value: T, key: Fingerprint, anime_id: &str) -> Self {
        Self {
            value: Arc::new(value),
            created_at: Utc::now(),
            key,
            anime_id: anime_id.to_string(),
        }
    }
}

/// Episode list and stream URL cache.
///
/// Both maps are sharded: reads of different keys never contend, and a
/// write only locks the shard holding its key. Values are replaced whole,
/// so a reader observes either the previous or the new entry.
#[derive(Debug, Default)]
pub struct ResolutionCache {
    episodes: DashMap<Fingerprint, CacheEntry<EpisodeList>>,
    streams: DashMap<Fingerprint, CacheEntry<StreamResolution>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Episode lists
    // =========================================================================

    pub fn get_episodes(&self, key: &EpisodesKey) -> Result<Option<Arc<EpisodeList>>, CacheError> {
        let problem = match self.episodes.get(key.fingerprint()) {
            None => return Ok(None),
            Some(entry) => match verify_episodes(&entry, key) {
                Ok(()) => return Ok(Some(Arc::clone(&entry.value))),
                Err(reason) => reason,
            },
        };
        // read guard is released above; removing while holding it would deadlock
        self.evict_corrupt_episodes(key);
        Err(corrupt(CacheKind::Episodes, key.fingerprint(), problem))
    }

    /// Remove the entry for `key` only if it still fails verification, so a
    /// valid list written since the failed read survives.
    fn evict_corrupt_episodes(&self, key: &EpisodesKey) -> bool {
        self.episodes
            .remove_if(key.fingerprint(), |_, entry| verify_episodes(entry, key).is_err())
            .is_some()
    }

    pub fn put_episodes(&self, key: &EpisodesKey, value: EpisodeList) -> Arc<EpisodeList> {
        let entry = CacheEntry::new(value, key.fingerprint().clone(), key.anime_id());
        let value = Arc::clone(&entry.value);
        debug!(anime_id = %key.anime_id(), key = %key.fingerprint().short(), episodes = value.len(), "Caching episode list");
        self.episodes.insert(key.fingerprint().clone(), entry);
        value
    }

    pub fn invalidate_episodes(&self, key: &EpisodesKey) -> bool {
        self.episodes.remove(key.fingerprint()).is_some()
    }

    pub fn clear_episodes(&self) -> usize {
        let count = self.episodes.len();
        self.episodes.clear();
        info!(entries = count, "Cleared episode cache");
        count
    }

    pub fn episode_count(&self) -> usize {
        self.episodes.len()
    }

    // =========================================================================
    // Stream URLs
    // =========================================================================

    pub fn get_stream_url(
        &self,
        key: &StreamKey,
    ) -> Result<Option<Arc<StreamResolution>>, CacheError> {
        let problem = match self.streams.get(key.fingerprint()) {
            None => return Ok(None),
            Some(entry) => match verify_stream(&entry, key) {
                Ok(()) => return Ok(Some(Arc::clone(&entry.value))),
                Err(reason) => reason,
            },
        };
        self.evict_corrupt_stream(key);
        Err(corrupt(CacheKind::Stream, key.fingerprint(), problem))
    }

    fn evict_corrupt_stream(&self, key: &StreamKey) -> bool {
        self.streams
            .remove_if(key.fingerprint(), |_, entry| verify_stream(entry, key).is_err())
            .is_some()
    }

    pub fn put_stream_url(&self, key: &StreamKey, value: StreamResolution) -> Arc<StreamResolution> {
        let entry = CacheEntry::new(value, key.fingerprint().clone(), key.anime_id());
        let value = Arc::clone(&entry.value);
        debug!(
            anime_id = %key.anime_id(),
            episode_id = %key.episode_id(),
            origin = %value.origin_source,
            "Caching stream url"
        );
        self.streams.insert(key.fingerprint().clone(), entry);
        value
    }

    pub fn invalidate_stream(&self, key: &StreamKey) -> bool {
        self.streams.remove(key.fingerprint()).is_some()
    }

    pub fn clear_streams(&self) -> usize {
        let count = self.streams.len();
        self.streams.clear();
        info!(entries = count, "Cleared stream cache");
        count
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Cached stream URLs per origin source.
    pub fn stream_counts_by_source(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for entry in self.streams.iter() {
            *counts.entry(entry.value.origin_source.clone()).or_insert(0) += 1;
        }
        counts
    }

    // =========================================================================
    // Bulk invalidation
    // =========================================================================

    /// Drop the episode list and every stream URL of one anime.
    pub fn invalidate_anime(&self, anime_id: &str) -> usize {
        let anime_id = super::normalize_identifier(anime_id);
        let before = self.episodes.len() + self.streams.len();
        self.episodes.retain(|_, e| e.anime_id != anime_id);
        self.streams.retain(|_, e| e.anime_id != anime_id);
        let removed = before.saturating_sub(self.episodes.len() + self.streams.len());
        info!(anime_id = %anime_id, removed, "Invalidated anime");
        removed
    }

    pub fn invalidate_all(&self) {
        let episodes = self.episodes.len();
        let streams = self.streams.len();
        self.episodes.clear();
        self.streams.clear();
        info!(episodes, streams, "Cleared resolution cache");
    }
}

fn corrupt(kind: CacheKind, key: &Fingerprint, reason: String) -> CacheError {
    error!(kind = %kind, key = %key, reason = %reason, "Evicted corrupt cache entry");
    CacheError::Corrupt {
        kind,
        key: key.to_string(),
        reason,
    }
}

fn verify_episodes(entry: &CacheEntry<EpisodeList>, key: &EpisodesKey) -> Result<(), String> {
    if &entry.key != key.fingerprint() || entry.anime_id != key.anime_id() {
        return Err("entry belongs to a different key".to_string());
    }
    if entry.value.is_empty() {
        return Err("empty episode list".to_string());
    }
    Ok(())
}

fn verify_stream(entry: &CacheEntry<StreamResolution>, key: &StreamKey) -> Result<(), String> {
    if &entry.key != key.fingerprint() || entry.anime_id != key.anime_id() {
        return Err("entry belongs to a different key".to_string());
    }
    if entry.value.stream_url.trim().is_empty() {
        return Err("empty stream url".to_string());
    }
    Ok(())
}
