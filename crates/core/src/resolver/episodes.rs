//! Episode list resolution across sources.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{EpisodesKey, ResolutionCache};
use crate::error::ResolveError;
use crate::health::SourceHealthTracker;
use crate::metrics;
use crate::source::{EpisodeList, EpisodeSource, SourceError, SourceRegistry};

use super::InFlight;

/// Queries sources in priority order, first success wins.
#[derive(Clone)]
pub struct EpisodeResolver {
    registry: Arc<SourceRegistry>,
    health: Arc<SourceHealthTracker>,
    cache: Arc<ResolutionCache>,
    timeout: Duration,
    in_flight: Option<InFlight<Arc<EpisodeList>>>,
}

impl EpisodeResolver {
    pub fn new(
        registry: Arc<SourceRegistry>,
        health: Arc<SourceHealthTracker>,
        cache: Arc<ResolutionCache>,
        timeout: Duration,
        dedup_in_flight: bool,
    ) -> Self {
        Self {
            registry,
            health,
            cache,
            timeout,
            in_flight: dedup_in_flight.then(InFlight::new),
        }
    }

    /// Resolutions currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.as_ref().map(|f| f.len()).unwrap_or(0)
    }

    /// Return the episode list of an anime, from cache or from the first
    /// eligible source that produces a non-empty list.
    pub async fn resolve(&self, anime_id: &str) -> Result<Arc<EpisodeList>, ResolveError> {
        let anime_id = anime_id.trim();
        if anime_id.is_empty() {
            return Err(ResolveError::InvalidRequest("anime id is empty".to_string()));
        }

        let key = EpisodesKey::new(anime_id);
        if let Some(hit) = self.cached(&key)? {
            return Ok(hit);
        }

        match &self.in_flight {
            Some(in_flight) => {
                let this = self.clone();
                let id = anime_id.to_string();
                let task_key = key.clone();
                in_flight
                    .run(key.fingerprint(), move || {
                        async move { this.resolve_uncached(&id, &task_key).await }.boxed()
                    })
                    .await
            }
            None => self.resolve_uncached(anime_id, &key).await,
        }
    }

    fn cached(&self, key: &EpisodesKey) -> Result<Option<Arc<EpisodeList>>, ResolveError> {
        match self.cache.get_episodes(key) {
            Ok(Some(hit)) => {
                debug!(anime_id = %key.anime_id(), "Episode cache hit");
                metrics::CACHE_LOOKUPS
                    .with_label_values(&["episodes", "hit"])
                    .inc();
                Ok(Some(hit))
            }
            Ok(None) => {
                metrics::CACHE_LOOKUPS
                    .with_label_values(&["episodes", "miss"])
                    .inc();
                Ok(None)
            }
            Err(e) => {
                metrics::CACHE_LOOKUPS
                    .with_label_values(&["episodes", "corrupt"])
                    .inc();
                Err(e.into())
            }
        }
    }

    async fn resolve_uncached(
        &self,
        anime_id: &str,
        key: &EpisodesKey,
    ) -> Result<Arc<EpisodeList>, ResolveError> {
        // a resolution that finished between our lookup and now
        if let Some(hit) = self.cache.get_episodes(key)? {
            return Ok(hit);
        }

        let mut attempted = 0;
        let mut last_error: Option<ResolveError> = None;

        for source in self.registry.ordered() {
            let name = source.name().to_string();

            if !self.health.is_eligible(&name, Utc::now()) {
                debug!(source = %name, anime_id = %anime_id, "Skipping source, circuit open");
                metrics::SOURCE_ATTEMPTS
                    .with_label_values(&[name.as_str(), "skipped"])
                    .inc();
                if last_error.is_none() {
                    last_error = Some(ResolveError::SourceUnavailable { source_name: name });
                }
                continue;
            }

            attempted += 1;
            let started = Instant::now();
            let outcome = self.attempt(source.as_ref(), anime_id).await;
            let elapsed = started.elapsed();
            match outcome {
                Ok(list) => {
                    self.health.record_success(&name, elapsed);
                    info!(
                        source = %name,
                        anime_id = %anime_id,
                        episodes = list.len(),
                        "Resolved episode list"
                    );
                    let list = self.cache.put_episodes(key, list);
                    metrics::RESOLUTIONS
                        .with_label_values(&["episodes", "success"])
                        .inc();
                    return Ok(list);
                }
                Err(e) => {
                    warn!(source = %name, anime_id = %anime_id, error = %e, "Source failed");
                    self.health.record_failure(&name, &e.to_string(), elapsed);
                    last_error = Some(e);
                }
            }
        }

        metrics::RESOLUTIONS
            .with_label_values(&["episodes", "exhausted"])
            .inc();
        info!(anime_id = %anime_id, attempted, "No source produced episodes");

        Err(ResolveError::AllSourcesExhausted {
            anime_id: anime_id.to_string(),
            attempted,
            last_error: last_error.map(Box::new),
        })
    }

    /// One bounded attempt against one source. The request is dropped when
    /// the timeout fires.
    async fn attempt(
        &self,
        source: &dyn EpisodeSource,
        anime_id: &str,
    ) -> Result<EpisodeList, ResolveError> {
        let name = source.name();
        let timer = metrics::SOURCE_ATTEMPT_DURATION
            .with_label_values(&[name])
            .start_timer();
        let outcome = tokio::time::timeout(self.timeout, source.fetch_episodes(anime_id)).await;
        timer.observe_duration();

        let (result, label) = match outcome {
            Err(_) | Ok(Err(SourceError::Timeout)) => (
                Err(ResolveError::SourceTimeout {
                    source_name: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
                "timeout",
            ),
            Ok(Err(e)) => (
                Err(ResolveError::SourceFailed {
                    source_name: name.to_string(),
                    message: e.to_string(),
                }),
                "error",
            ),
            Ok(Ok(episodes)) if episodes.is_empty() => (
                Err(ResolveError::SourceEmptyResult {
                    source_name: name.to_string(),
                }),
                "empty",
            ),
            Ok(Ok(mut episodes)) => {
                for episode in &mut episodes {
                    episode.source = name.to_string();
                }
                (Ok(EpisodeList::new(episodes)), "success")
            }
        };

        metrics::SOURCE_ATTEMPTS
            .with_label_values(&[name, label])
            .inc();
        result
    }
}
