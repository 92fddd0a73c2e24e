//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the streamfinder server:
//! - HTTP request metrics (latency, counts)
//! - Source availability and cache sizes (collected from engine stats on scrape)
//! - Resolution metrics declared in the core crate

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "streamfinder_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("streamfinder_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "streamfinder_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Source availability (1 = circuit closed).
pub static SOURCE_AVAILABLE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "streamfinder_source_available",
            "Whether a source is currently available (1) or backed off (0)",
        ),
        &["source"],
    )
    .unwrap()
});

pub static SOURCE_FAIL_COUNT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "streamfinder_source_fail_count",
            "Consecutive failures recorded for a source",
        ),
        &["source"],
    )
    .unwrap()
});

pub static CACHED_EPISODE_LISTS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "streamfinder_cached_episode_lists",
        "Number of cached episode lists",
    )
    .unwrap()
});

pub static CACHED_STREAM_URLS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "streamfinder_cached_stream_urls",
        "Number of cached stream URLs",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Engine
    registry
        .register(Box::new(SOURCE_AVAILABLE.clone()))
        .unwrap();
    registry
        .register(Box::new(SOURCE_FAIL_COUNT.clone()))
        .unwrap();
    registry
        .register(Box::new(CACHED_EPISODE_LISTS.clone()))
        .unwrap();
    registry
        .register(Box::new(CACHED_STREAM_URLS.clone()))
        .unwrap();

    // Core resolution metrics
    for metric in streamfinder_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Refresh gauges from the current engine stats.
pub fn collect_dynamic_metrics(state: &AppState) {
    let stats = state.engine().get_stats();

    for source in &stats.sources {
        SOURCE_AVAILABLE
            .with_label_values(&[source.name.as_str()])
            .set(i64::from(source.is_available));
        SOURCE_FAIL_COUNT
            .with_label_values(&[source.name.as_str()])
            .set(i64::from(source.fail_count));
    }
    CACHED_EPISODE_LISTS.set(stats.cached_episode_lists as i64);
    CACHED_STREAM_URLS.set(stats.cached_stream_urls as i64);
}

static NUMERIC_SEGMENT: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace identifiers with placeholders).
///
/// Anime and episode identifiers are free-form, so they are replaced by
/// position rather than by shape.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut normalized = Vec::with_capacity(segments.len());

    let mut i = 0;
    while i < segments.len() {
        let segment = segments[i];
        normalized.push(segment.to_string());
        let placeholder = match segment {
            "anime" => Some("{anime_id}"),
            "episodes" if i >= 2 && segments[i - 2] == "anime" => Some("{episode_id}"),
            "sources" => Some("{name}"),
            _ => None,
        };
        if let Some(placeholder) = placeholder {
            if let Some(next) = segments.get(i + 1) {
                if !next.is_empty() && *next != "reset" {
                    normalized.push(placeholder.to_string());
                    i += 1;
                }
            }
        }
        i += 1;
    }

    let joined = normalized.join("/");
    NUMERIC_SEGMENT.replace_all(&joined, "/{id}$1").to_string()
}
