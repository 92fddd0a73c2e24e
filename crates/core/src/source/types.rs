//! Source types and trait definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity of a registered content source. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source name.
    pub name: String,
    /// Language tag of the content (e.g. "en", "pt-BR").
    pub language: String,
    /// Higher priority sources are tried first.
    pub priority: i32,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, language: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            priority,
        }
    }
}

/// One entry of an episode list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    /// Source-specific locator for the episode page or media.
    pub url: String,
    #[serde(default = "default_season")]
    pub season: u32,
    pub number: u32,
    /// Name of the source the entry came from. Stamped by the resolver.
    #[serde(default)]
    pub source: String,
}

fn default_season() -> u32 {
    1
}

impl Episode {
    pub fn new(title: impl Into<String>, url: impl Into<String>, season: u32, number: u32) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            season,
            number,
            source: String::new(),
        }
    }
}

/// Ordered episode list for one anime.
///
/// Entries are grouped by season and sorted by episode number ascending
/// within a season. The ordering is established on construction and on
/// deserialization, so every `EpisodeList` in the process upholds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Episode>", into = "Vec<Episode>")]
pub struct EpisodeList {
    entries: Vec<Episode>,
}

impl EpisodeList {
    pub fn new(mut entries: Vec<Episode>) -> Self {
        // stable: equal (season, number) keep source order
        entries.sort_by_key(|e| (e.season, e.number));
        Self { entries }
    }

    pub fn entries(&self) -> &[Episode] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.entries.iter()
    }

    /// Source that produced the list, taken from the first entry.
    pub fn origin_source(&self) -> Option<&str> {
        self.entries
            .first()
            .map(|e| e.source.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Find the entry an episode reference points at.
    pub fn find(&self, reference: &EpisodeRef) -> Option<&Episode> {
        match reference {
            EpisodeRef::Url(url) => self.entries.iter().find(|e| e.url.trim() == url),
            EpisodeRef::Number {
                season: Some(season),
                number,
            } => self
                .entries
                .iter()
                .find(|e| e.season == *season && e.number == *number),
            EpisodeRef::Number {
                season: None,
                number,
            } => self.entries.iter().find(|e| e.number == *number),
        }
    }
}

impl From<Vec<Episode>> for EpisodeList {
    fn from(entries: Vec<Episode>) -> Self {
        Self::new(entries)
    }
}

impl From<EpisodeList> for Vec<Episode> {
    fn from(list: EpisodeList) -> Self {
        list.entries
    }
}

/// A caller-supplied episode identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeRef {
    /// The entry's `url` as returned in the episode list.
    Url(String),
    /// Episode number, optionally qualified by season.
    Number { season: Option<u32>, number: u32 },
}

impl EpisodeRef {
    /// Parse an episode identifier.
    ///
    /// Accepts an episode URL, a bare number (`"7"`), or a season/episode
    /// form (`"s2e7"`, `"S02E07"`, `"2x7"`). Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        if let Ok(number) = input.parse::<u32>() {
            return Some(Self::Number {
                season: None,
                number,
            });
        }

        let lower = input.to_lowercase();
        if let Some(rest) = lower.strip_prefix('s') {
            if let Some((season, number)) = rest.split_once('e') {
                if let (Ok(season), Ok(number)) = (season.parse(), number.parse()) {
                    return Some(Self::Number {
                        season: Some(season),
                        number,
                    });
                }
            }
        }
        if let Some((season, number)) = lower.split_once('x') {
            if let (Ok(season), Ok(number)) = (season.parse(), number.parse()) {
                return Some(Self::Number {
                    season: Some(season),
                    number,
                });
            }
        }

        Some(Self::Url(input.to_string()))
    }

    /// Episode number, when the reference carries one.
    pub fn number(&self) -> Option<u32> {
        match self {
            Self::Number { number, .. } => Some(*number),
            Self::Url(_) => None,
        }
    }
}

/// Errors raised by a content source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Source already registered: {0}")]
    DuplicateName(String),
}

/// Trait for content source implementations.
///
/// The scraping itself lives behind this seam: "given an anime identifier,
/// return episodes or fail".
#[async_trait]
pub trait EpisodeSource: Send + Sync {
    /// Source identity.
    fn descriptor(&self) -> &SourceDescriptor;

    /// Source name, shorthand for `descriptor().name`.
    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// List the episodes of an anime.
    async fn fetch_episodes(&self, anime_id: &str) -> Result<Vec<Episode>, SourceError>;

    /// Resolve a playable URL for one episode.
    async fn fetch_stream_url(&self, anime_id: &str, episode: &Episode)
        -> Result<String, SourceError>;
}
