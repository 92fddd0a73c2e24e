//! Candidate ranking helpers.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{DebridFile, DebridTorrent, Quality, TorrentCandidate};

const VIDEO_EXTENSIONS: &[&str] = &["mkv", "mp4", "avi", "webm", "mov", "m4v"];

/// Whether a file name has a playable video extension.
pub fn is_video_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Build a fallback search query: `"{title} {episode:02} {quality}"`.
pub fn build_query(title: &str, episode: Option<u32>, quality: Quality) -> String {
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut query = title;
    if let Some(episode) = episode {
        query.push_str(&format!(" {:02}", episode));
    }
    if quality != Quality::Unknown {
        query.push(' ');
        query.push_str(quality.as_str());
    }
    query
}

/// Extract the info hash from a magnet link (lowercase).
pub fn hash_from_magnet(magnet: &str) -> Option<String> {
    let lower = magnet.to_lowercase();
    let start = lower.find("btih:")? + "btih:".len();
    let rest = &lower[start..];
    let hash = rest.split('&').next().unwrap_or(rest).trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

/// Merge candidates sharing an info hash, keeping the best-seeded copy.
///
/// First-seen order is preserved. Candidates without a hash are dropped.
pub fn dedup_candidates(candidates: Vec<TorrentCandidate>) -> Vec<TorrentCandidate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<TorrentCandidate> = Vec::new();

    for mut candidate in candidates {
        candidate.hash = candidate.hash.trim().to_lowercase();
        if candidate.hash.is_empty() {
            continue;
        }
        match index.get(&candidate.hash) {
            Some(&i) => {
                let existing = &mut unique[i];
                existing.is_cached_on_debrid_service |= candidate.is_cached_on_debrid_service;
                if candidate.seeders > existing.seeders {
                    existing.seeders = candidate.seeders;
                    existing.leechers = candidate.leechers;
                }
            }
            None => {
                index.insert(candidate.hash.clone(), unique.len());
                unique.push(candidate);
            }
        }
    }

    unique
}

/// Selection order: cached before uncached regardless of seeders, then the
/// closer quality match, then more seeders.
pub fn compare_candidates(a: &TorrentCandidate, b: &TorrentCandidate, requested: Quality) -> Ordering {
    b.is_cached_on_debrid_service
        .cmp(&a.is_cached_on_debrid_service)
        .then_with(|| b.quality.match_score(requested).cmp(&a.quality.match_score(requested)))
        .then_with(|| b.seeders.cmp(&a.seeders))
}

/// Sort candidates best first.
pub fn rank_candidates(candidates: &mut [TorrentCandidate], requested: Quality) {
    candidates.sort_by(|a, b| compare_candidates(a, b, requested));
}

/// The highest-confidence candidate.
pub fn select_best(candidates: &[TorrentCandidate], requested: Quality) -> Option<&TorrentCandidate> {
    candidates
        .iter()
        .min_by(|a, b| compare_candidates(a, b, requested))
}

/// The file to stream: the largest video file.
pub fn largest_video_file(torrent: &DebridTorrent) -> Option<&DebridFile> {
    torrent.video_files().into_iter().next()
}
