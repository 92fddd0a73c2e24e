//! Torrent cache gateway: search, cache check and instant streaming on top of
//! a debrid service.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{DebridBackend, DebridConfig};
use crate::metrics;

use super::selection::{dedup_candidates, largest_video_file, rank_candidates};
use super::{
    DebridError, DebridService, DebridTorrent, InstantStream, NyaaSearcher, Quality, SearchError,
    TorBoxClient, TorrentCandidate, TorrentSearcher,
};

/// Errors surfaced by the gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Search failed: {0}")]
    Search(#[from] SearchError),

    #[error("No torrents found for: {0}")]
    NoCandidates(String),

    #[error("Debrid service error: {0}")]
    Debrid(#[from] DebridError),

    #[error("Torrent {hash} not ready after {waited_secs}s")]
    NotReady { hash: String, waited_secs: u64 },

    #[error("No video file in torrent {0}")]
    NoVideoFile(String),

    #[error("Debrid gateway misconfigured: {0}")]
    Config(String),
}

/// Tunables for the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub preferred_quality: Quality,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub max_cache_check: usize,
    pub max_candidates: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            preferred_quality: Quality::Fhd1080,
            poll_interval: Duration::from_millis(2000),
            max_wait: Duration::from_secs(60),
            max_cache_check: 20,
            max_candidates: 30,
        }
    }
}

impl From<&DebridConfig> for GatewaySettings {
    fn from(config: &DebridConfig) -> Self {
        Self {
            preferred_quality: Quality::parse(&config.preferred_quality)
                .unwrap_or(Quality::Fhd1080),
            poll_interval: config.poll_interval(),
            max_wait: config.max_wait(),
            max_cache_check: config.max_cache_check,
            max_candidates: config.max_candidates,
        }
    }
}

/// Wraps a debrid service and the torrent searchers queried for it.
pub struct TorrentCacheGateway {
    service: Arc<dyn DebridService>,
    searchers: Vec<Arc<dyn TorrentSearcher>>,
    settings: GatewaySettings,
}

impl TorrentCacheGateway {
    pub fn new(
        service: Arc<dyn DebridService>,
        searchers: Vec<Arc<dyn TorrentSearcher>>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            service,
            searchers,
            settings,
        }
    }

    /// Build the configured backend with the Nyaa searcher and its mirrors.
    pub fn from_config(config: &DebridConfig) -> Result<Self, GatewayError> {
        let service: Arc<dyn DebridService> = match config.backend {
            DebridBackend::Torbox => {
                let torbox = config.torbox.as_ref().ok_or_else(|| {
                    GatewayError::Config("debrid.torbox section is missing".to_string())
                })?;
                Arc::new(TorBoxClient::new(torbox)?)
            }
        };
        let searchers = NyaaSearcher::with_mirrors(config.nyaa.clone())?
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn TorrentSearcher>)
            .collect();

        Ok(Self::new(service, searchers, GatewaySettings::from(config)))
    }

    /// Name of the underlying debrid service; health is tracked under it.
    pub fn name(&self) -> &str {
        self.service.name()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn searcher_names(&self) -> Vec<&str> {
        self.searchers.iter().map(|s| s.name()).collect()
    }

    /// Query every searcher concurrently and merge their results.
    ///
    /// A failing searcher is logged and skipped; the search only fails when
    /// every searcher does. A single searcher's error is returned as is.
    async fn search_all(&self, query: &str) -> Result<Vec<TorrentCandidate>, SearchError> {
        let results = join_all(self.searchers.iter().map(|searcher| async move {
            (searcher.name(), searcher.search(query).await)
        }))
        .await;

        let mut merged = Vec::new();
        let mut errors: Vec<(String, SearchError)> = Vec::new();
        for (name, result) in results {
            match result {
                Ok(mut found) => {
                    debug!(searcher = %name, results = found.len(), "Searcher returned");
                    merged.append(&mut found);
                }
                Err(e) => {
                    warn!(searcher = %name, error = %e, "Searcher failed");
                    errors.push((name.to_string(), e));
                }
            }
        }

        if !errors.is_empty() && errors.len() == self.searchers.len() {
            if errors.len() == 1 {
                return Err(errors.remove(0).1);
            }
            let failures: BTreeMap<String, String> = errors
                .into_iter()
                .map(|(name, e)| (name, e.to_string()))
                .collect();
            return Err(SearchError::AllSearchersFailed(failures));
        }
        Ok(merged)
    }

    /// Search, dedup by hash, mark cached candidates and rank them best first.
    ///
    /// A failing cache check is logged and every candidate treated as uncached.
    pub async fn search(
        &self,
        query: &str,
        quality: Option<Quality>,
    ) -> Result<Vec<TorrentCandidate>, GatewayError> {
        let raw = self.search_all(query).await?;
        let mut candidates = dedup_candidates(raw);
        candidates.truncate(self.settings.max_candidates);

        if candidates.is_empty() {
            return Ok(candidates);
        }

        let hashes: Vec<String> = candidates
            .iter()
            .take(self.settings.max_cache_check)
            .map(|c| c.hash.clone())
            .collect();

        match self.service.check_cached(&hashes).await {
            Ok(cached) => {
                for candidate in &mut candidates {
                    if cached.get(&candidate.hash).copied().unwrap_or(false) {
                        candidate.is_cached_on_debrid_service = true;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Cache check failed, treating all candidates as uncached");
            }
        }

        rank_candidates(
            &mut candidates,
            quality.unwrap_or(self.settings.preferred_quality),
        );
        debug!(
            query = %query,
            candidates = candidates.len(),
            cached = candidates.iter().filter(|c| c.is_cached_on_debrid_service).count(),
            "Torrent search complete"
        );
        Ok(candidates)
    }

    pub async fn check_cached(&self, hashes: &[String]) -> Result<HashMap<String, bool>, GatewayError> {
        let hashes: Vec<String> = hashes.iter().map(|h| h.trim().to_lowercase()).collect();
        Ok(self.service.check_cached(&hashes).await?)
    }

    pub async fn add_magnet(&self, magnet: &str) -> Result<DebridTorrent, GatewayError> {
        Ok(self.service.add_magnet(magnet).await?)
    }

    pub async fn list_torrents(&self) -> Result<Vec<DebridTorrent>, GatewayError> {
        Ok(self.service.list_torrents().await?)
    }

    pub async fn delete_torrent(&self, id: u64) -> Result<bool, GatewayError> {
        Ok(self.service.delete_torrent(id).await?)
    }

    pub async fn download_link(&self, torrent_id: u64, file_id: u64) -> Result<String, GatewayError> {
        Ok(self.service.download_link(torrent_id, file_id).await?)
    }

    /// Find the best torrent for a query and return a direct stream link.
    ///
    /// A cached candidate is preferred over any uncached one. The chosen
    /// torrent is added to the service and polled until it is playable or
    /// `max_wait` elapses.
    pub async fn instant_stream(
        &self,
        query: &str,
        quality: Option<Quality>,
    ) -> Result<InstantStream, GatewayError> {
        let candidates = self.search(query, quality).await?;
        let Some(best) = candidates.first() else {
            metrics::FALLBACK_ATTEMPTS.with_label_values(&["failed"]).inc();
            return Err(GatewayError::NoCandidates(query.to_string()));
        };

        info!(
            title = %best.title,
            hash = %best.hash,
            cached = best.is_cached_on_debrid_service,
            seeders = best.seeders,
            "Selected torrent"
        );

        let result = self.stream_candidate(best).await;
        let label = match &result {
            Ok(_) if best.is_cached_on_debrid_service => "cached",
            Ok(_) => "added",
            Err(_) => "failed",
        };
        metrics::FALLBACK_ATTEMPTS.with_label_values(&[label]).inc();
        result
    }

    async fn stream_candidate(&self, candidate: &TorrentCandidate) -> Result<InstantStream, GatewayError> {
        let torrent = self.service.add_magnet(&candidate.magnet).await?;
        let torrent = self.wait_until_playable(torrent, &candidate.hash).await?;

        let file = largest_video_file(&torrent)
            .ok_or_else(|| GatewayError::NoVideoFile(candidate.hash.clone()))?;
        let stream_url = self.service.download_link(torrent.id, file.id).await?;

        let quality = match Quality::detect(&file.name) {
            Quality::Unknown => candidate.quality,
            detected => detected,
        };

        Ok(InstantStream {
            stream_url,
            torrent_id: torrent.id,
            file_id: file.id,
            file_name: file.name.clone(),
            file_size: file.size,
            quality,
            cached: candidate.is_cached_on_debrid_service,
            title: if torrent.name.is_empty() {
                candidate.title.clone()
            } else {
                torrent.name.clone()
            },
            hash: candidate.hash.clone(),
        })
    }

    async fn wait_until_playable(
        &self,
        mut torrent: DebridTorrent,
        hash: &str,
    ) -> Result<DebridTorrent, GatewayError> {
        let started = Instant::now();
        loop {
            if torrent.is_ready() && largest_video_file(&torrent).is_some() {
                return Ok(torrent);
            }
            if started.elapsed() >= self.settings.max_wait {
                return Err(GatewayError::NotReady {
                    hash: hash.to_string(),
                    waited_secs: self.settings.max_wait.as_secs(),
                });
            }
            debug!(
                torrent_id = torrent.id,
                progress = torrent.progress,
                state = %torrent.download_state,
                "Waiting for torrent"
            );
            tokio::time::sleep(self.settings.poll_interval).await;
            torrent = self.service.get_torrent(torrent.id).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockDebridService, MockTorrentSearcher};

    fn gateway(
        service: Arc<MockDebridService>,
        searcher: Arc<MockTorrentSearcher>,
    ) -> TorrentCacheGateway {
        TorrentCacheGateway::new(
            service,
            vec![searcher as Arc<dyn TorrentSearcher>],
            GatewaySettings::default(),
        )
    }

    #[tokio::test]
    async fn test_search_marks_cached_and_ranks() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        searcher
            .set_results(vec![
                fixtures::candidate("Frieren 01 1080p", "popular", 200, false),
                fixtures::candidate("Frieren 01 1080p", "cached", 5, false),
            ])
            .await;
        service.set_cached(&["cached"]).await;

        let gateway = gateway(service.clone(), searcher);
        let results = gateway.search("Frieren 01 1080p", None).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].hash, "cached");
        assert!(results[0].is_cached_on_debrid_service);
        assert!(!results[1].is_cached_on_debrid_service);
    }

    #[tokio::test]
    async fn test_search_caps_candidates_and_cache_batch() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        let many: Vec<_> = (0..50)
            .map(|i| fixtures::candidate("Frieren 01", &format!("h{:02}", i), 10, false))
            .collect();
        searcher.set_results(many).await;

        let gateway = gateway(service.clone(), searcher);
        let results = gateway.search("Frieren", None).await.unwrap();

        assert_eq!(results.len(), 30);
        let batches = service.cache_checks().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 20);
    }

    #[tokio::test]
    async fn test_search_survives_cache_check_failure() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        searcher
            .set_results(vec![fixtures::candidate("Frieren 01", "a", 1, false)])
            .await;
        service
            .set_next_error(DebridError::ApiError("down".to_string()))
            .await;

        let gateway = gateway(service, searcher);
        let results = gateway.search("Frieren", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_cached_on_debrid_service);
    }

    #[tokio::test]
    async fn test_instant_stream_prefers_cached_candidate() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        searcher
            .set_results(vec![
                fixtures::candidate("[Group] Frieren - 01 (1080p)", "uncached", 200, false),
                fixtures::candidate("[Group] Frieren - 01 (1080p)", "cached", 5, false),
            ])
            .await;
        service.set_cached(&["cached"]).await;

        let gateway = gateway(service.clone(), searcher);
        let stream = gateway.instant_stream("Frieren 01 1080p", None).await.unwrap();

        assert_eq!(stream.hash, "cached");
        assert!(stream.cached);
        assert_eq!(stream.quality, Quality::Fhd1080);
        assert!(stream.stream_url.contains(&stream.torrent_id.to_string()));

        let added = service.added_magnets().await;
        assert_eq!(added.len(), 1);
        assert!(added[0].contains("cached"));
    }

    #[tokio::test]
    async fn test_instant_stream_no_candidates() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());

        let gateway = gateway(service.clone(), searcher);
        let err = gateway.instant_stream("Nothing", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoCandidates(_)));
        assert!(service.added_magnets().await.is_empty());
    }

    #[tokio::test]
    async fn test_instant_stream_search_error() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        searcher.set_next_error(SearchError::Timeout).await;

        let gateway = gateway(service, searcher);
        let err = gateway.instant_stream("Frieren", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Search(SearchError::Timeout)));
    }

    #[tokio::test]
    async fn test_search_merges_and_dedups_across_searchers() {
        let service = Arc::new(MockDebridService::new());
        let nyaa = Arc::new(MockTorrentSearcher::named("nyaa"));
        let mirror = Arc::new(MockTorrentSearcher::named("nyaa.land"));
        nyaa.set_results(vec![
            fixtures::candidate("Frieren 01 1080p", "shared", 100, false),
            fixtures::candidate("Frieren 01 720p", "only-nyaa", 10, false),
        ])
        .await;
        mirror
            .set_results(vec![
                fixtures::candidate("Frieren 01 1080p", "SHARED", 300, false),
                fixtures::candidate("Frieren 01 1080p", "only-mirror", 50, false),
            ])
            .await;

        let gateway = TorrentCacheGateway::new(
            service,
            vec![nyaa.clone() as Arc<dyn TorrentSearcher>, mirror.clone()],
            GatewaySettings::default(),
        );
        assert_eq!(gateway.searcher_names(), vec!["nyaa", "nyaa.land"]);

        let results = gateway.search("Frieren 01 1080p", None).await.unwrap();
        let hashes: Vec<_> = results.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(hashes.len(), 3);
        assert_eq!(hashes[0], "shared");
        assert_eq!(results[0].seeders, 300);
        assert!(hashes.contains(&"only-nyaa"));
        assert!(hashes.contains(&"only-mirror"));
        assert_eq!(nyaa.queries().await, vec!["Frieren 01 1080p".to_string()]);
        assert_eq!(mirror.queries().await, vec!["Frieren 01 1080p".to_string()]);
    }

    #[tokio::test]
    async fn test_one_failing_searcher_is_skipped() {
        let service = Arc::new(MockDebridService::new());
        let down = Arc::new(MockTorrentSearcher::named("down"));
        let up = Arc::new(MockTorrentSearcher::named("up"));
        down.set_next_error(SearchError::Timeout).await;
        up.set_results(vec![fixtures::candidate("Frieren 01", "a", 5, false)])
            .await;

        let gateway = TorrentCacheGateway::new(
            service,
            vec![down as Arc<dyn TorrentSearcher>, up],
            GatewaySettings::default(),
        );
        let results = gateway.search("Frieren 01", None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hash, "a");
    }

    #[tokio::test]
    async fn test_all_searchers_failing_is_an_error() {
        let service = Arc::new(MockDebridService::new());
        let a = Arc::new(MockTorrentSearcher::named("a"));
        let b = Arc::new(MockTorrentSearcher::named("b"));
        a.set_next_error(SearchError::Timeout).await;
        b.set_next_error(SearchError::ApiError("HTTP 503".to_string()))
            .await;

        let gateway = TorrentCacheGateway::new(
            service,
            vec![a as Arc<dyn TorrentSearcher>, b],
            GatewaySettings::default(),
        );
        let err = gateway.instant_stream("Frieren", None).await.unwrap_err();
        match err {
            GatewayError::Search(SearchError::AllSearchersFailed(failures)) => {
                assert_eq!(failures.len(), 2);
                assert!(failures["b"].contains("503"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_searchers_means_no_candidates() {
        let service = Arc::new(MockDebridService::new());
        let gateway = TorrentCacheGateway::new(service, Vec::new(), GatewaySettings::default());
        let err = gateway.instant_stream("Frieren", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoCandidates(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncached_torrent_polls_until_ready() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        searcher
            .set_results(vec![fixtures::candidate("Frieren 01 1080p", "slow", 50, false)])
            .await;
        // two polls before it is playable
        service.set_ready_after_polls(2).await;

        let gateway = gateway(service.clone(), searcher);
        let stream = gateway.instant_stream("Frieren", None).await.unwrap();
        assert!(!stream.cached);
        assert_eq!(service.poll_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncached_torrent_times_out() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        searcher
            .set_results(vec![fixtures::candidate("Frieren 01", "never", 50, false)])
            .await;
        service.set_ready_after_polls(u32::MAX).await;

        let settings = GatewaySettings {
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            ..GatewaySettings::default()
        };
        let gateway = TorrentCacheGateway::new(
            service.clone(),
            vec![searcher as Arc<dyn TorrentSearcher>],
            settings,
        );
        let err = gateway.instant_stream("Frieren", None).await.unwrap_err();

        assert!(matches!(err, GatewayError::NotReady { waited_secs: 10, .. }));
        assert_eq!(service.poll_count().await, 5);
    }

    #[tokio::test]
    async fn test_passthrough_operations() {
        let service = Arc::new(MockDebridService::new());
        let searcher = Arc::new(MockTorrentSearcher::new());
        let gateway = gateway(service.clone(), searcher);

        let torrent = gateway.add_magnet("magnet:?xt=urn:btih:abc").await.unwrap();
        assert_eq!(gateway.list_torrents().await.unwrap().len(), 1);

        let link = gateway.download_link(torrent.id, 0).await.unwrap();
        assert!(link.starts_with("https://"));

        assert!(gateway.delete_torrent(torrent.id).await.unwrap());
        assert!(!gateway.delete_torrent(torrent.id).await.unwrap());
        assert!(gateway.list_torrents().await.unwrap().is_empty());

        let cached = gateway.check_cached(&["ABC".to_string()]).await.unwrap();
        assert_eq!(cached.get("abc"), Some(&false));
    }

    #[test]
    fn test_settings_from_config() {
        let config: DebridConfig = toml::from_str(
            r#"
backend = "torbox"
preferred_quality = "720p"
poll_interval_ms = 500
max_wait_secs = 15
"#,
        )
        .unwrap();
        let settings = GatewaySettings::from(&config);
        assert_eq!(settings.preferred_quality, Quality::Hd720);
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.max_wait, Duration::from_secs(15));
        assert_eq!(settings.max_cache_check, 20);
    }

    #[test]
    fn test_from_config_requires_torbox_section() {
        let config: DebridConfig = toml::from_str(r#"backend = "torbox""#).unwrap();
        let result = TorrentCacheGateway::from_config(&config);
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}
