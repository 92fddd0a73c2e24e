//! Deterministic cache keys.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Separator between identifier parts. Cannot appear in normalized input
/// typed by a user, so `("a b", "c")` and `("a", "b c")` never collide.
const PART_SEPARATOR: char = '\u{1f}';

/// Normalize an identifier: trim, lower-case, collapse inner whitespace.
pub fn normalize_identifier(input: &str) -> String {
    input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// SHA-256 hex digest of normalized identifier parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(parts: &[&str]) -> Self {
        let joined = parts
            .iter()
            .map(|p| normalize_identifier(p))
            .collect::<Vec<_>>()
            .join(&PART_SEPARATOR.to_string());

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs.
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key of a cached episode list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpisodesKey {
    anime_id: String,
    fingerprint: Fingerprint,
}

impl EpisodesKey {
    pub fn new(anime_id: &str) -> Self {
        Self {
            anime_id: normalize_identifier(anime_id),
            fingerprint: Fingerprint::of(&[anime_id]),
        }
    }

    /// Normalized anime identifier.
    pub fn anime_id(&self) -> &str {
        &self.anime_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Key of a cached stream URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    anime_id: String,
    episode_id: String,
    fingerprint: Fingerprint,
}

impl StreamKey {
    pub fn new(anime_id: &str, episode_id: &str) -> Self {
        Self {
            anime_id: normalize_identifier(anime_id),
            episode_id: normalize_identifier(episode_id),
            fingerprint: Fingerprint::of(&[anime_id, episode_id]),
        }
    }

    pub fn anime_id(&self) -> &str {
        &self.anime_id
    }

    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}
