//! Content source abstraction.
//!
//! This module provides an `EpisodeSource` trait for upstream providers that
//! can list the episodes of an anime and yield a stream URL for one of them,
//! plus a `SourceRegistry` holding the configured providers in priority order.

mod http;
mod registry;
mod types;

pub use http::HttpSource;
pub use registry::SourceRegistry;
pub use types::*;
