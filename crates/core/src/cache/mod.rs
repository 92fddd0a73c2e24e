//! In-memory resolution cache.
//!
//! Holds resolved episode lists and stream URLs keyed by a fingerprint of the
//! normalized request identifiers. There is no TTL; entries live until they
//! are invalidated explicitly.

mod fingerprint;
mod store;

pub use fingerprint::{normalize_identifier, EpisodesKey, Fingerprint, StreamKey};
pub use store::{CacheEntry, CacheKind, ResolutionCache};

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Corrupt {kind} entry for {key}: {reason}")]
    Corrupt {
        kind: CacheKind,
        key: String,
        reason: String,
    },
}
