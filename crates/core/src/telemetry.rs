//! Read-only engine statistics and operator actions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cache::ResolutionCache;
use crate::health::{SourceHealth, SourceHealthTracker};
use crate::source::SourceRegistry;

/// Point-in-time view of source health and cache sizes.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// One entry per registered source in priority order, followed by the
    /// debrid gateway when configured.
    pub sources: Vec<SourceHealth>,
    pub cached_episode_lists: usize,
    pub cached_stream_urls: usize,
    /// Resolutions currently running.
    pub in_flight: usize,
    pub generated_at: DateTime<Utc>,
}

impl EngineStats {
    pub fn source(&self, name: &str) -> Option<&SourceHealth> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

pub struct TelemetryReporter {
    registry: Arc<SourceRegistry>,
    health: Arc<SourceHealthTracker>,
    cache: Arc<ResolutionCache>,
    gateway_name: Option<String>,
}

impl TelemetryReporter {
    pub fn new(
        registry: Arc<SourceRegistry>,
        health: Arc<SourceHealthTracker>,
        cache: Arc<ResolutionCache>,
        gateway_name: Option<String>,
    ) -> Self {
        Self {
            registry,
            health,
            cache,
            gateway_name,
        }
    }

    pub fn get_stats(&self, in_flight: usize) -> EngineStats {
        let url_counts = self.cache.stream_counts_by_source();

        let sources = self
            .registry
            .ordered()
            .iter()
            .map(|s| s.name().to_string())
            .chain(self.gateway_name.clone())
            .map(|name| {
                let mut health = self.health.get(&name);
                health.cached_url_count = url_counts.get(&name).copied().unwrap_or(0);
                health
            })
            .collect();

        EngineStats {
            sources,
            cached_episode_lists: self.cache.episode_count(),
            cached_stream_urls: self.cache.stream_count(),
            in_flight,
            generated_at: Utc::now(),
        }
    }

    /// Drop cached episode lists. Stream URLs and health are kept.
    pub fn clear_episodes_cache(&self) -> usize {
        let removed = self.cache.clear_episodes();
        info!(removed, "Cleared episode cache");
        removed
    }

    /// Drop everything cached. Health is kept.
    pub fn clear_all_cache(&self) {
        self.cache.invalidate_all();
        info!("Cleared all caches");
    }

    pub fn reset_source_failures(&self) {
        self.health.reset_all();
        info!("Reset failure state of all sources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::cache::{EpisodesKey, StreamKey};
    use crate::config::HealthConfig;
    use crate::testing::{fixtures, MockSource};

    fn reporter() -> (TelemetryReporter, Arc<SourceHealthTracker>, Arc<ResolutionCache>) {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("low", 1))).unwrap();
        registry.register(Arc::new(MockSource::new("high", 10))).unwrap();
        let health = Arc::new(SourceHealthTracker::new(&HealthConfig::default()));
        let cache = Arc::new(ResolutionCache::new());
        let reporter = TelemetryReporter::new(
            Arc::new(registry),
            health.clone(),
            cache.clone(),
            Some("torbox".to_string()),
        );
        (reporter, health, cache)
    }

    #[test]
    fn test_stats_compose_health_and_cache() {
        let (reporter, health, cache) = reporter();
        health.record_failure("low", "boom", Duration::from_millis(250));
        cache.put_episodes(&EpisodesKey::new("frieren"), fixtures::episode_list("high", 1, 2));
        cache.put_stream_url(
            &StreamKey::new("frieren", "1"),
            fixtures::direct_resolution("high", "https://h/1"),
        );

        let stats = reporter.get_stats(0);
        let names: Vec<_> = stats.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["high", "low", "torbox"]);
        assert_eq!(stats.cached_episode_lists, 1);
        assert_eq!(stats.cached_stream_urls, 1);
        assert_eq!(stats.source("high").unwrap().cached_url_count, 1);
        assert_eq!(stats.source("low").unwrap().fail_count, 1);
        assert!(stats.source("torbox").unwrap().is_available);
    }

    #[test]
    fn test_clear_actions_leave_health_alone() {
        let (reporter, health, cache) = reporter();
        health.record_failure("low", "boom", Duration::from_millis(250));
        cache.put_episodes(&EpisodesKey::new("a"), fixtures::episode_list("high", 1, 1));
        cache.put_stream_url(
            &StreamKey::new("a", "1"),
            fixtures::direct_resolution("high", "https://h/1"),
        );

        assert_eq!(reporter.clear_episodes_cache(), 1);
        assert_eq!(cache.stream_count(), 1);
        reporter.clear_all_cache();
        assert_eq!(cache.stream_count(), 0);
        assert_eq!(health.get("low").fail_count, 1);

        reporter.reset_source_failures();
        assert_eq!(health.get("low").fail_count, 0);
    }

    #[test]
    fn test_stats_report_request_counters() {
        let (reporter, health, _cache) = reporter();
        health.record_success("high", Duration::from_millis(120));
        health.record_success("high", Duration::from_millis(80));
        health.record_failure("high", "boom", Duration::from_millis(400));

        let stats = reporter.get_stats(0);
        let high = stats.source("high").unwrap();
        assert_eq!(high.total_requests, 3);
        assert_eq!(high.success_count, 2);
        assert_eq!(high.avg_latency_ms, 200);
        assert_eq!(stats.source("low").unwrap().total_requests, 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["sources"][0]["total_requests"], 3);
        assert_eq!(json["sources"][0]["avg_latency_ms"], 200);

        reporter.reset_source_failures();
        let high = reporter.get_stats(0);
        let high = high.source("high").unwrap();
        assert_eq!(high.fail_count, 0);
        assert_eq!(high.total_requests, 3);
    }
}
