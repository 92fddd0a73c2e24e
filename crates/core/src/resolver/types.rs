use serde::{Deserialize, Serialize};

/// Which path produced a stream URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// The episode's origin source.
    Direct,
    /// The debrid instant-stream fallback.
    Debrid,
}

/// A resolved stream. Produced per request, optionally cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamResolution {
    pub stream_url: String,
    /// Source (or debrid service) the URL came from.
    pub origin_source: String,
    /// Served from the resolution cache.
    pub cached: bool,
    /// Direct-path failure when the fallback produced the URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub path: ResolutionPath,
}

impl StreamResolution {
    pub fn direct(stream_url: impl Into<String>, origin_source: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            origin_source: origin_source.into(),
            cached: false,
            error: None,
            path: ResolutionPath::Direct,
        }
    }
}

/// A stream request with optional fallback hints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamRequest {
    pub anime_id: String,
    pub episode_id: String,
    /// Human title used to search torrents; derived from `anime_id` when absent.
    pub title: Option<String>,
    /// Requested quality label (e.g. "1080p").
    pub quality: Option<String>,
}

impl StreamRequest {
    pub fn new(anime_id: impl Into<String>, episode_id: impl Into<String>) -> Self {
        Self {
            anime_id: anime_id.into(),
            episode_id: episode_id.into(),
            title: None,
            quality: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Title for torrent search.
    pub fn search_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => self
                .anime_id
                .replace(['-', '_'], " ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}
