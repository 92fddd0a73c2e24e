//! The engine handle: one explicit owner of the shared cache, health tracker
//! and resolvers, cloned into every caller.

use std::sync::Arc;

use tracing::info;

use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::debrid::{GatewayError, TorrentCacheGateway};
use crate::error::ResolveError;
use crate::health::SourceHealthTracker;
use crate::resolver::{EpisodeResolver, StreamRequest, StreamResolution, StreamResolver};
use crate::source::{EpisodeList, SourceError, SourceRegistry};
use crate::telemetry::{EngineStats, TelemetryReporter};

/// Errors raised while assembling an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("Debrid setup failed: {0}")]
    Gateway(#[from] GatewayError),
}

struct Inner {
    episodes: EpisodeResolver,
    streams: StreamResolver,
    telemetry: TelemetryReporter,
    health: Arc<SourceHealthTracker>,
    cache: Arc<ResolutionCache>,
    gateway: Option<Arc<TorrentCacheGateway>>,
}

/// Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build the engine described by a config file: HTTP sources and, when a
    /// `[debrid]` section is present, the debrid fallback.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let registry = SourceRegistry::from_config(&config.sources)?;
        let gateway = config
            .debrid
            .as_ref()
            .map(TorrentCacheGateway::from_config)
            .transpose()?;

        let mut builder = Engine::builder().config(config.clone()).registry(registry);
        if let Some(gateway) = gateway {
            builder = builder.gateway(Arc::new(gateway));
        }
        Ok(builder.build())
    }

    pub async fn resolve_episodes(&self, anime_id: &str) -> Result<Arc<EpisodeList>, ResolveError> {
        self.inner.episodes.resolve(anime_id).await
    }

    /// Resolve with no title or quality hints.
    pub async fn resolve_stream(
        &self,
        anime_id: &str,
        episode_id: &str,
    ) -> Result<StreamResolution, ResolveError> {
        self.resolve_stream_with(&StreamRequest::new(anime_id, episode_id))
            .await
    }

    pub async fn resolve_stream_with(
        &self,
        request: &StreamRequest,
    ) -> Result<StreamResolution, ResolveError> {
        self.inner.streams.resolve(request).await
    }

    pub fn get_stats(&self) -> EngineStats {
        let in_flight = self.inner.episodes.in_flight() + self.inner.streams.in_flight();
        self.inner.telemetry.get_stats(in_flight)
    }

    pub fn reset_failures(&self) {
        self.inner.telemetry.reset_source_failures();
    }

    /// Returns false when no source by that name is known.
    pub fn reset_source(&self, name: &str) -> bool {
        self.inner.health.reset_source(name)
    }

    pub fn clear_episode_cache(&self) -> usize {
        self.inner.telemetry.clear_episodes_cache()
    }

    pub fn clear_all_cache(&self) {
        self.inner.telemetry.clear_all_cache();
    }

    /// Drop the episode list and every stream URL of one anime.
    pub fn invalidate_anime(&self, anime_id: &str) -> usize {
        self.inner.cache.invalidate_anime(anime_id)
    }

    pub fn gateway(&self) -> Option<&Arc<TorrentCacheGateway>> {
        self.inner.gateway.as_ref()
    }
}

#[derive(Default)]
pub struct EngineBuilder {
    registry: SourceRegistry,
    config: Config,
    gateway: Option<Arc<TorrentCacheGateway>>,
}

impl EngineBuilder {
    pub fn registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn gateway(mut self, gateway: Arc<TorrentCacheGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn build(self) -> Engine {
        let resolver = &self.config.resolver;
        let registry = Arc::new(self.registry);
        let health = Arc::new(SourceHealthTracker::new(&self.config.health));
        let cache = Arc::new(ResolutionCache::new());

        for name in registry.names() {
            health.register(&name);
        }
        if let Some(gateway) = &self.gateway {
            health.register(gateway.name());
        }

        let episodes = EpisodeResolver::new(
            registry.clone(),
            health.clone(),
            cache.clone(),
            resolver.source_timeout(),
            resolver.dedup_in_flight,
        );
        let streams = StreamResolver::new(
            episodes.clone(),
            registry.clone(),
            health.clone(),
            cache.clone(),
            self.gateway.clone(),
            resolver.stream_timeout(),
            resolver.dedup_in_flight,
        );
        let telemetry = TelemetryReporter::new(
            registry.clone(),
            health.clone(),
            cache.clone(),
            self.gateway.as_ref().map(|g| g.name().to_string()),
        );

        info!(
            sources = registry.len(),
            fallback = self.gateway.is_some(),
            dedup_in_flight = resolver.dedup_in_flight,
            "Resolution engine ready"
        );

        Engine {
            inner: Arc::new(Inner {
                episodes,
                streams,
                telemetry,
                health,
                cache,
                gateway: self.gateway,
            }),
        }
    }
}
