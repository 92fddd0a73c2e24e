//! Multi-source anime episode and stream resolution.
//!
//! Episode lists and stream URLs are resolved from a prioritized set of
//! sources, with per-source circuit breaking, an in-memory resolution cache
//! and a debrid/torrent-cache fallback for streams.

pub mod cache;
pub mod config;
pub mod debrid;
pub mod engine;
pub mod error;
pub mod health;
pub mod metrics;
pub mod resolver;
pub mod source;
pub mod telemetry;
pub mod testing;

pub use cache::{CacheError, EpisodesKey, Fingerprint, ResolutionCache, StreamKey};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use debrid::{
    DebridError, DebridService, GatewayError, InstantStream, Quality, SearchError,
    TorrentCacheGateway, TorrentCandidate, TorrentSearcher,
};
pub use engine::{Engine, EngineBuilder, EngineError};
pub use error::ResolveError;
pub use health::{CircuitState, SourceHealth, SourceHealthTracker};
pub use resolver::{ResolutionPath, StreamRequest, StreamResolution};
pub use source::{
    Episode, EpisodeList, EpisodeRef, EpisodeSource, HttpSource, SourceDescriptor, SourceError,
    SourceRegistry,
};
pub use telemetry::{EngineStats, TelemetryReporter};
