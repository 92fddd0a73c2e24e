//! Stream URL resolution: direct path through the episode's origin source,
//! debrid fallback when that fails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{EpisodesKey, ResolutionCache, StreamKey};
use crate::debrid::{build_query, GatewayError, Quality, TorrentCacheGateway};
use crate::error::ResolveError;
use crate::health::SourceHealthTracker;
use crate::metrics;
use crate::source::{EpisodeRef, SourceError, SourceRegistry};

use super::{EpisodeResolver, InFlight, ResolutionPath, StreamRequest, StreamResolution};

#[derive(Clone)]
pub struct StreamResolver {
    episodes: EpisodeResolver,
    registry: Arc<SourceRegistry>,
    health: Arc<SourceHealthTracker>,
    cache: Arc<ResolutionCache>,
    gateway: Option<Arc<TorrentCacheGateway>>,
    timeout: Duration,
    in_flight: Option<InFlight<StreamResolution>>,
}

/// Validated request fields.
struct Target {
    anime_id: String,
    episode_id: String,
    reference: EpisodeRef,
    quality: Option<Quality>,
    title: String,
    key: StreamKey,
}

impl StreamResolver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        episodes: EpisodeResolver,
        registry: Arc<SourceRegistry>,
        health: Arc<SourceHealthTracker>,
        cache: Arc<ResolutionCache>,
        gateway: Option<Arc<TorrentCacheGateway>>,
        timeout: Duration,
        dedup_in_flight: bool,
    ) -> Self {
        Self {
            episodes,
            registry,
            health,
            cache,
            gateway,
            timeout,
            in_flight: dedup_in_flight.then(InFlight::new),
        }
    }

    pub fn gateway(&self) -> Option<&Arc<TorrentCacheGateway>> {
        self.gateway.as_ref()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.as_ref().map(|f| f.len()).unwrap_or(0)
    }

    /// Resolve a playable URL for one episode.
    pub async fn resolve(&self, request: &StreamRequest) -> Result<StreamResolution, ResolveError> {
        let target = Self::validate(request)?;

        match self.cache.get_stream_url(&target.key) {
            Ok(Some(hit)) => {
                debug!(anime_id = %target.anime_id, episode_id = %target.episode_id, "Stream cache hit");
                metrics::CACHE_LOOKUPS.with_label_values(&["stream", "hit"]).inc();
                return Ok(served_from_cache(&hit));
            }
            Ok(None) => {
                metrics::CACHE_LOOKUPS.with_label_values(&["stream", "miss"]).inc();
            }
            Err(e) => {
                metrics::CACHE_LOOKUPS
                    .with_label_values(&["stream", "corrupt"])
                    .inc();
                return Err(e.into());
            }
        }

        match &self.in_flight {
            Some(in_flight) => {
                let this = self.clone();
                let fingerprint = target.key.fingerprint().clone();
                in_flight
                    .run(&fingerprint, move || {
                        async move { this.resolve_uncached(target).await }.boxed()
                    })
                    .await
            }
            None => self.resolve_uncached(target).await,
        }
    }

    fn validate(request: &StreamRequest) -> Result<Target, ResolveError> {
        let anime_id = request.anime_id.trim();
        if anime_id.is_empty() {
            return Err(ResolveError::InvalidRequest("anime id is empty".to_string()));
        }
        let episode_id = request.episode_id.trim();
        let reference = EpisodeRef::parse(episode_id)
            .ok_or_else(|| ResolveError::InvalidRequest("episode id is empty".to_string()))?;

        let quality = match request.quality.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(label) => Some(Quality::parse(label).ok_or_else(|| {
                ResolveError::InvalidRequest(format!("unknown quality: {}", label))
            })?),
        };

        Ok(Target {
            anime_id: anime_id.to_string(),
            episode_id: episode_id.to_string(),
            reference,
            quality,
            title: request.search_title(),
            key: StreamKey::new(anime_id, episode_id),
        })
    }

    async fn resolve_uncached(&self, target: Target) -> Result<StreamResolution, ResolveError> {
        if let Some(hit) = self.cache.get_stream_url(&target.key)? {
            return Ok(served_from_cache(&hit));
        }

        let direct_error = match self.resolve_direct(&target).await {
            Ok(resolution) => {
                self.cache.put_stream_url(&target.key, resolution.clone());
                metrics::RESOLUTIONS
                    .with_label_values(&["stream", "direct"])
                    .inc();
                return Ok(resolution);
            }
            Err(e) => e,
        };

        debug!(
            anime_id = %target.anime_id,
            episode_id = %target.episode_id,
            error = %direct_error,
            "Direct path failed, trying debrid fallback"
        );

        match self.resolve_fallback(&target, &direct_error).await {
            Ok(resolution) => {
                self.cache.put_stream_url(&target.key, resolution.clone());
                metrics::RESOLUTIONS
                    .with_label_values(&["stream", "fallback"])
                    .inc();
                Ok(resolution)
            }
            Err(fallback_error) => {
                metrics::RESOLUTIONS
                    .with_label_values(&["stream", "exhausted"])
                    .inc();
                let cause = ResolveError::most_specific(direct_error, fallback_error);
                info!(
                    anime_id = %target.anime_id,
                    episode_id = %target.episode_id,
                    cause = %cause,
                    "No stream available"
                );
                Err(ResolveError::NoStreamAvailable {
                    anime_id: target.anime_id,
                    episode_id: target.episode_id,
                    cause: Box::new(cause),
                })
            }
        }
    }

    /// Ask the source that listed the episode for its stream URL.
    async fn resolve_direct(&self, target: &Target) -> Result<StreamResolution, ResolveError> {
        let list = self.episodes.resolve(&target.anime_id).await?;
        let episode = list
            .find(&target.reference)
            .ok_or_else(|| ResolveError::EpisodeNotFound {
                anime_id: target.anime_id.clone(),
                episode_id: target.episode_id.clone(),
            })?;

        let origin = episode.source.clone();
        let unavailable = || ResolveError::SourceUnavailable {
            source_name: origin.clone(),
        };
        let source = self.registry.get(&origin).ok_or_else(unavailable)?;
        if !self.health.is_eligible(&origin, Utc::now()) {
            debug!(source = %origin, "Origin source circuit open");
            metrics::SOURCE_ATTEMPTS
                .with_label_values(&[origin.as_str(), "skipped"])
                .inc();
            return Err(unavailable());
        }

        let timer = metrics::SOURCE_ATTEMPT_DURATION
            .with_label_values(&[origin.as_str()])
            .start_timer();
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.timeout,
            source.fetch_stream_url(&target.anime_id, episode),
        )
        .await;
        let elapsed = started.elapsed();
        timer.observe_duration();

        let result = match outcome {
            Err(_) | Ok(Err(SourceError::Timeout)) => Err(ResolveError::SourceTimeout {
                source_name: origin.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(ResolveError::SourceFailed {
                source_name: origin.clone(),
                message: e.to_string(),
            }),
            Ok(Ok(url)) if url.trim().is_empty() => Err(ResolveError::SourceEmptyResult {
                source_name: origin.clone(),
            }),
            Ok(Ok(url)) => Ok(StreamResolution::direct(url.trim(), origin.as_str())),
        };

        match &result {
            Ok(_) => {
                self.health.record_success(&origin, elapsed);
                metrics::SOURCE_ATTEMPTS
                    .with_label_values(&[origin.as_str(), "success"])
                    .inc();
            }
            Err(e) => {
                warn!(source = %origin, anime_id = %target.anime_id, error = %e, "Stream fetch failed");
                self.health.record_failure(&origin, &e.to_string(), elapsed);
                metrics::SOURCE_ATTEMPTS
                    .with_label_values(&[origin.as_str(), "error"])
                    .inc();
            }
        }
        result
    }

    async fn resolve_fallback(
        &self,
        target: &Target,
        direct_error: &ResolveError,
    ) -> Result<StreamResolution, ResolveError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(ResolveError::FallbackNotConfigured)?;
        let name = gateway.name().to_string();

        if !self.health.is_eligible(&name, Utc::now()) {
            debug!(gateway = %name, "Debrid circuit open");
            return Err(ResolveError::SourceUnavailable { source_name: name });
        }

        let query = build_query(
            &target.title,
            self.episode_number(target),
            target.quality.unwrap_or(gateway.settings().preferred_quality),
        );

        let started = Instant::now();
        let outcome = gateway.instant_stream(&query, target.quality).await;
        let elapsed = started.elapsed();
        match outcome {
            Ok(stream) => {
                self.health.record_success(&name, elapsed);
                info!(
                    anime_id = %target.anime_id,
                    episode_id = %target.episode_id,
                    torrent = %stream.title,
                    cached = stream.cached,
                    "Resolved stream through debrid"
                );
                Ok(StreamResolution {
                    stream_url: stream.stream_url,
                    origin_source: name,
                    cached: false,
                    error: Some(direct_error.to_string()),
                    path: ResolutionPath::Debrid,
                })
            }
            Err(e) => {
                warn!(gateway = %name, query = %query, error = %e, "Debrid fallback failed");
                match &e {
                    // the service answered; nothing to stream is not an outage
                    GatewayError::NoCandidates(_) | GatewayError::NoVideoFile(_) => {
                        self.health.record_success(&name, elapsed)
                    }
                    _ => self.health.record_failure(&name, &e.to_string(), elapsed),
                }
                Err(e.into())
            }
        }
    }

    /// Episode number for the torrent query. URL references are looked up in
    /// the cached episode list.
    fn episode_number(&self, target: &Target) -> Option<u32> {
        if let Some(number) = target.reference.number() {
            return Some(number);
        }
        let key = EpisodesKey::new(&target.anime_id);
        self.cache
            .get_episodes(&key)
            .ok()
            .flatten()
            .and_then(|list| list.find(&target.reference).map(|e| e.number))
    }
}

fn served_from_cache(hit: &StreamResolution) -> StreamResolution {
    StreamResolution {
        cached: true,
        ..hit.clone()
    }
}
