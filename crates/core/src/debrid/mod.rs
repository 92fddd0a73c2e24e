//! Debrid / torrent cache fallback.
//!
//! This module provides the `TorrentSearcher` and `DebridService` traits,
//! their Nyaa and TorBox implementations, candidate ranking, and the
//! `TorrentCacheGateway` that the stream resolver falls back to when the
//! direct source path fails.

mod gateway;
mod nyaa;
mod rate_limiter;
pub mod selection;
mod torbox;
mod types;

pub use gateway::{GatewayError, GatewaySettings, TorrentCacheGateway};
pub use nyaa::NyaaSearcher;
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use selection::{build_query, is_video_file};
pub use torbox::TorBoxClient;
pub use types::*;
