//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the source, searcher and
//! debrid traits, so the engine can be exercised end to end without any
//! upstream service.
//!
//! # Example
//!
//! ```rust,ignore
//! use streamfinder_core::testing::{fixtures, MockSource};
//!
//! let source = Arc::new(MockSource::new("allanime", 10));
//! source.set_episodes(fixtures::episodes(1, 12)).await;
//!
//! let mut registry = SourceRegistry::new();
//! registry.register(source.clone())?;
//! let engine = Engine::builder().registry(registry).build();
//! ```

mod mock_debrid;
mod mock_source;

pub use mock_debrid::{MockDebridService, MockTorrentSearcher};
pub use mock_source::MockSource;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::debrid::{DebridFile, DebridTorrent, Quality, TorrentCandidate};
    use crate::resolver::StreamResolution;
    use crate::source::{Episode, EpisodeList};

    /// Episodes `1..=count` of one season, with no source stamped.
    pub fn episodes(season: u32, count: u32) -> Vec<Episode> {
        (1..=count)
            .map(|n| {
                Episode::new(
                    format!("Episode {}", n),
                    format!("/watch/s{}e{}", season, n),
                    season,
                    n,
                )
            })
            .collect()
    }

    /// An episode list as the resolver would cache it for `source`.
    pub fn episode_list(source: &str, season: u32, count: u32) -> EpisodeList {
        let entries = episodes(season, count)
            .into_iter()
            .map(|mut e| {
                e.source = source.to_string();
                e
            })
            .collect();
        EpisodeList::new(entries)
    }

    pub fn direct_resolution(source: &str, url: &str) -> StreamResolution {
        StreamResolution::direct(url, source)
    }

    /// Create a torrent candidate; quality is detected from the title.
    pub fn candidate(title: &str, hash: &str, seeders: u32, cached: bool) -> TorrentCandidate {
        TorrentCandidate {
            title: title.to_string(),
            hash: hash.to_string(),
            magnet: format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                hash,
                urlencoding::encode(title)
            ),
            size: 1024 * 1024 * 1400, // 1.4 GB
            seeders,
            leechers: seeders / 4,
            is_cached_on_debrid_service: cached,
            source: "mock".to_string(),
            quality: Quality::detect(title),
        }
    }

    /// A debrid torrent holding one episode and a subtitle file.
    pub fn debrid_torrent(id: u64, hash: &str, ready: bool) -> DebridTorrent {
        DebridTorrent {
            id,
            hash: hash.to_string(),
            name: format!("Torrent {}", hash),
            size: 1024 * 1024 * 1400,
            progress: if ready { 1.0 } else { 0.25 },
            download_state: if ready { "cached" } else { "downloading" }.to_string(),
            download_finished: ready,
            files: vec![
                DebridFile {
                    id: 0,
                    name: "Episode 01.ass".to_string(),
                    size: 40 * 1024,
                },
                DebridFile {
                    id: 1,
                    name: "Episode 01.mkv".to_string(),
                    size: 1024 * 1024 * 1400,
                },
            ],
        }
    }
}
