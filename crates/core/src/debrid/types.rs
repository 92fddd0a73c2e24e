//! Types for torrent search and debrid service operations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur during torrent search.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Failed to parse results: {0}")]
    ParseError(String),

    #[error("All searchers failed: {0:?}")]
    AllSearchersFailed(BTreeMap<String, String>),
}

/// Errors that can occur during debrid service operations.
#[derive(Debug, Clone, Error)]
pub enum DebridError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Torrent not found: {0}")]
    TorrentNotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Request timeout")]
    Timeout,
}

/// Video quality label detected from a release or file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480p")]
    Sd480,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Fhd1080,
    #[serde(rename = "2160p")]
    Uhd2160,
}

impl Quality {
    /// Parse a quality label as a user would type it.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "2160p" | "2160" | "4k" | "uhd" => Some(Self::Uhd2160),
            "1080p" | "1080" | "fhd" | "fullhd" => Some(Self::Fhd1080),
            "720p" | "720" | "hd" => Some(Self::Hd720),
            "480p" | "480" | "sd" => Some(Self::Sd480),
            _ => None,
        }
    }

    /// Detect the quality mentioned in a release or file name.
    ///
    /// Only whole tokens count: `1080p`, `[2160]`, `1920x1080`, `BD720p`,
    /// `4K`. Digits inside hashes or episode titles are ignored. The highest
    /// quality mentioned wins.
    pub fn detect(name: &str) -> Self {
        name.to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter_map(Self::from_token)
            .max_by_key(Quality::rank)
            .unwrap_or(Self::Unknown)
    }

    fn from_token(token: &str) -> Option<Self> {
        if matches!(token, "4k" | "uhd") {
            return Some(Self::Uhd2160);
        }
        // 1920x1080
        let token = match token.split_once('x') {
            Some((width, height)) if width.bytes().all(|b| b.is_ascii_digit()) => height,
            _ => token,
        };
        // bd1080p, web720p
        let token = match token.strip_suffix('p') {
            Some(rest) => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
            None => token.strip_suffix('i').unwrap_or(token),
        };
        match token {
            "2160" => Some(Self::Uhd2160),
            "1080" => Some(Self::Fhd1080),
            "720" => Some(Self::Hd720),
            "480" => Some(Self::Sd480),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Sd480 => 1,
            Self::Hd720 => 2,
            Self::Fhd1080 => 3,
            Self::Uhd2160 => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Sd480 => "480p",
            Self::Hd720 => "720p",
            Self::Fhd1080 => "1080p",
            Self::Uhd2160 => "2160p",
        }
    }

    /// How well this quality satisfies a requested one. Higher is better.
    ///
    /// An exact match scores highest; otherwise closer qualities win and a
    /// higher quality beats a lower one at the same distance. Unknown scores 0.
    pub fn match_score(&self, requested: Quality) -> u8 {
        if *self == Self::Unknown {
            return 0;
        }
        if *self == requested {
            return 10;
        }
        let distance = self.rank().abs_diff(requested.rank());
        let above = u8::from(self.rank() > requested.rank());
        10u8.saturating_sub(distance * 2).saturating_add(above).min(9)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A torrent found by a searcher. Never mutated after the gateway returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentCandidate {
    pub title: String,
    /// Info hash (lowercase hex).
    pub hash: String,
    pub magnet: String,
    /// Total size in bytes.
    pub size: u64,
    pub seeders: u32,
    pub leechers: u32,
    /// Whether the debrid service already holds this torrent.
    pub is_cached_on_debrid_service: bool,
    /// Name of the searcher that produced the candidate.
    pub source: String,
    pub quality: Quality,
}

/// A file inside a debrid torrent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebridFile {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl DebridFile {
    pub fn is_video(&self) -> bool {
        super::selection::is_video_file(&self.name)
    }
}

/// A torrent held by the debrid service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebridTorrent {
    pub id: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Download progress (0.0 - 1.0).
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub download_state: String,
    #[serde(default)]
    pub download_finished: bool,
    #[serde(default)]
    pub files: Vec<DebridFile>,
}

impl DebridTorrent {
    /// The service reports the content as fully available for download.
    pub fn is_ready(&self) -> bool {
        let state = self.download_state.to_lowercase();
        self.download_finished
            || self.progress >= 1.0
            || matches!(state.as_str(), "cached" | "completed" | "uploading" | "seeding")
    }

    /// Video files, largest first.
    pub fn video_files(&self) -> Vec<&DebridFile> {
        let mut videos: Vec<_> = self.files.iter().filter(|f| f.is_video()).collect();
        videos.sort_by(|a, b| b.size.cmp(&a.size));
        videos
    }
}

/// Result of an instant-stream lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstantStream {
    pub stream_url: String,
    pub torrent_id: u64,
    pub file_id: u64,
    pub file_name: String,
    pub file_size: u64,
    pub quality: Quality,
    /// The torrent was already cached on the service when selected.
    pub cached: bool,
    pub title: String,
    pub hash: String,
}

/// Trait for torrent search backends.
#[async_trait]
pub trait TorrentSearcher: Send + Sync {
    /// Searcher name (e.g. "nyaa").
    fn name(&self) -> &str;

    /// Search for torrents matching a free-text query.
    async fn search(&self, query: &str) -> Result<Vec<TorrentCandidate>, SearchError>;
}

/// Trait for debrid services that download torrents server-side and serve
/// the files over plain HTTP.
#[async_trait]
pub trait DebridService: Send + Sync {
    /// Service name (e.g. "torbox").
    fn name(&self) -> &str;

    /// Which of the given info hashes the service already holds.
    ///
    /// Every requested hash appears in the result (lowercase).
    async fn check_cached(&self, hashes: &[String]) -> Result<HashMap<String, bool>, DebridError>;

    /// Add a torrent by magnet link.
    async fn add_magnet(&self, magnet: &str) -> Result<DebridTorrent, DebridError>;

    /// Fetch the current state of one torrent.
    async fn get_torrent(&self, id: u64) -> Result<DebridTorrent, DebridError>;

    /// List every torrent on the account.
    async fn list_torrents(&self) -> Result<Vec<DebridTorrent>, DebridError>;

    /// Remove a torrent. Returns false when it did not exist.
    async fn delete_torrent(&self, id: u64) -> Result<bool, DebridError>;

    /// Direct HTTP link for one file of a torrent.
    async fn download_link(&self, torrent_id: u64, file_id: u64) -> Result<String, DebridError>;
}
