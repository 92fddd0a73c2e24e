use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Circuit breaker state of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy; requests flow.
    #[default]
    Closed,
    /// Failing; no requests until `retry_after`.
    Open { retry_after: DateTime<Utc> },
    /// One probe request is in flight.
    HalfOpen { probe_started: DateTime<Utc> },
}

impl CircuitState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Open { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open { .. } => "open",
            Self::HalfOpen { .. } => "half_open",
        }
    }
}

/// Lifetime request counters of one source. Not cleared by a health reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RequestStats {
    pub total_requests: u64,
    pub success_count: u64,
    pub total_latency_ms: u64,
}

impl RequestStats {
    pub fn record(&mut self, success: bool, elapsed: Duration) {
        self.total_requests = self.total_requests.saturating_add(1);
        if success {
            self.success_count = self.success_count.saturating_add(1);
        }
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.total_latency_ms = self.total_latency_ms.saturating_add(elapsed_ms);
    }

    /// Mean attempt latency, 0 before the first attempt.
    pub fn avg_latency_ms(&self) -> u64 {
        self.total_latency_ms
            .checked_div(self.total_requests)
            .unwrap_or(0)
    }
}

/// Internal per-source record, owned by the tracker.
#[derive(Debug, Clone, Default)]
pub(crate) struct HealthRecord {
    pub state: CircuitState,
    pub fail_count: u32,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub requests: RequestStats,
}

impl HealthRecord {
    /// Healthy record that keeps the request counters.
    pub fn reset(&self) -> Self {
        Self {
            requests: self.requests,
            ..Self::default()
        }
    }
}

/// Read-only view of a source's health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHealth {
    pub name: String,
    pub is_available: bool,
    pub fail_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    pub circuit: CircuitState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub success_count: u64,
    pub avg_latency_ms: u64,
    /// Number of cached stream URLs that came from this source.
    pub cached_url_count: usize,
}

impl SourceHealth {
    pub(crate) fn from_record(name: &str, record: &HealthRecord) -> Self {
        Self {
            name: name.to_string(),
            is_available: record.state.is_closed(),
            fail_count: record.fail_count,
            last_error: record.last_error.clone(),
            retry_after: record.state.retry_after(),
            circuit: record.state,
            last_success_at: record.last_success_at,
            last_failure_at: record.last_failure_at,
            total_requests: record.requests.total_requests,
            success_count: record.requests.success_count,
            avg_latency_ms: record.requests.avg_latency_ms(),
            cached_url_count: 0,
        }
    }

    /// Health of a source with no recorded history.
    pub fn healthy(name: &str) -> Self {
        Self::from_record(name, &HealthRecord::default())
    }
}
