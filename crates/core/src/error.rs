//! Resolution error taxonomy.

use thiserror::Error;

use crate::cache::CacheError;
use crate::debrid::GatewayError;

/// Errors returned by episode and stream resolution.
///
/// Per-source failures are recorded and swallowed by the resolvers; callers
/// only see a terminal variant (`AllSourcesExhausted`, `NoStreamAvailable`,
/// `CacheCorrupt`, `InvalidRequest`). `Clone` lets one in-flight result be
/// handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error("Source {source_name} skipped: circuit open")]
    SourceUnavailable { source_name: String },

    #[error("Source {source_name} timed out after {timeout_ms}ms")]
    SourceTimeout { source_name: String, timeout_ms: u64 },

    #[error("Source {source_name} returned no results")]
    SourceEmptyResult { source_name: String },

    #[error("Source {source_name} failed: {message}")]
    SourceFailed { source_name: String, message: String },

    #[error("Episode {episode_id} not found for {anime_id}")]
    EpisodeNotFound { anime_id: String, episode_id: String },

    #[error("No episodes found for {anime_id}: {attempted} source(s) tried{}", last_error_suffix(.last_error))]
    AllSourcesExhausted {
        anime_id: String,
        attempted: usize,
        last_error: Option<Box<ResolveError>>,
    },

    #[error("Torrent search failed: {0}")]
    TorrentSearchFailed(String),

    #[error("Torrent not cached and could not be added: {0}")]
    TorrentNotCachedAndAddFailed(String),

    #[error("No debrid fallback configured")]
    FallbackNotConfigured,

    #[error("No stream available for {anime_id} episode {episode_id}: {cause}")]
    NoStreamAvailable {
        anime_id: String,
        episode_id: String,
        cause: Box<ResolveError>,
    },

    #[error("Cache corrupt: {0}")]
    CacheCorrupt(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

fn last_error_suffix(last_error: &Option<Box<ResolveError>>) -> String {
    match last_error {
        Some(e) => format!(", last error: {}", e),
        None => String::new(),
    }
}

impl ResolveError {
    /// Stable identifier for API responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::SourceTimeout { .. } => "source_timeout",
            Self::SourceEmptyResult { .. } => "source_empty_result",
            Self::SourceFailed { .. } => "source_failed",
            Self::EpisodeNotFound { .. } => "episode_not_found",
            Self::AllSourcesExhausted { .. } => "all_sources_exhausted",
            Self::TorrentSearchFailed(_) => "torrent_search_failed",
            Self::TorrentNotCachedAndAddFailed(_) => "torrent_not_cached_and_add_failed",
            Self::FallbackNotConfigured => "fallback_not_configured",
            Self::NoStreamAvailable { .. } => "no_stream_available",
            Self::CacheCorrupt(_) => "cache_corrupt",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }

    /// How much a caller learns from this error. Higher is more specific.
    ///
    /// Used to pick which cause to surface when both the direct path and the
    /// fallback fail.
    pub fn specificity(&self) -> u8 {
        match self {
            Self::FallbackNotConfigured => 0,
            Self::SourceUnavailable { .. } => 1,
            Self::AllSourcesExhausted { .. } => 2,
            Self::SourceEmptyResult { .. } => 3,
            Self::SourceTimeout { .. } => 4,
            Self::SourceFailed { .. } | Self::TorrentSearchFailed(_) => 5,
            Self::EpisodeNotFound { .. } | Self::TorrentNotCachedAndAddFailed(_) => 6,
            Self::CacheCorrupt(_) => 7,
            Self::InvalidRequest(_) => 8,
            Self::NoStreamAvailable { cause, .. } => cause.specificity(),
        }
    }

    /// Pick the more specific of two errors, preferring `later` on ties.
    pub fn most_specific(earlier: ResolveError, later: ResolveError) -> ResolveError {
        if later.specificity() >= earlier.specificity() {
            later
        } else {
            earlier
        }
    }
}

impl From<CacheError> for ResolveError {
    fn from(e: CacheError) -> Self {
        Self::CacheCorrupt(e.to_string())
    }
}

impl From<GatewayError> for ResolveError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Search(_) | GatewayError::NoCandidates(_) => {
                Self::TorrentSearchFailed(e.to_string())
            }
            GatewayError::Config(_) => Self::FallbackNotConfigured,
            GatewayError::Debrid(_) | GatewayError::NotReady { .. } | GatewayError::NoVideoFile(_) => {
                Self::TorrentNotCachedAndAddFailed(e.to_string())
            }
        }
    }
}
