//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Source attempts (per source outcome and latency)
//! - Resolutions (episode lists and streams)
//! - Cache lookups
//! - Debrid fallback

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Sources
// =============================================================================

/// Source attempts by source and result.
pub static SOURCE_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamfinder_source_attempts_total",
            "Total attempts made against content sources",
        ),
        &["source", "result"], // "success", "timeout", "empty", "error", "skipped"
    )
    .unwrap()
});

/// Source attempt duration in seconds.
pub static SOURCE_ATTEMPT_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamfinder_source_attempt_duration_seconds",
            "Duration of a single source attempt",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 8.0, 15.0, 30.0]),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Resolution
// =============================================================================

/// Resolutions by kind and result.
pub static RESOLUTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamfinder_resolutions_total",
            "Total resolutions performed",
        ),
        &["kind", "result"], // kind: "episodes", "stream"
    )
    .unwrap()
});

/// Cache lookups by kind and result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamfinder_cache_lookups_total",
            "Total resolution cache lookups",
        ),
        &["kind", "result"], // result: "hit", "miss", "corrupt"
    )
    .unwrap()
});

/// Debrid fallback attempts by result.
pub static FALLBACK_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "streamfinder_fallback_attempts_total",
            "Total debrid fallback attempts",
        ),
        &["result"], // "cached", "added", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SOURCE_ATTEMPTS.clone()),
        Box::new(SOURCE_ATTEMPT_DURATION.clone()),
        Box::new(RESOLUTIONS.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(FALLBACK_ATTEMPTS.clone()),
    ]
}
