use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;

use super::types::{CircuitState, HealthRecord, SourceHealth};

/// Longest window the tracker will schedule; larger configured values clamp to it.
const MAX_WINDOW_SECS: i64 = 100 * 365 * 24 * 60 * 60;

fn window_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_WINDOW_SECS)
}

/// Tracks failures and availability for every source.
///
/// Sources that were never registered or never tried are healthy.
#[derive(Debug)]
pub struct SourceHealthTracker {
    records: DashMap<String, HealthRecord>,
    failure_threshold: u32,
    base_backoff_secs: i64,
    max_backoff_secs: i64,
    probe_timeout: chrono::Duration,
}

impl Default for SourceHealthTracker {
    fn default() -> Self {
        Self::new(&HealthConfig::default())
    }
}

impl SourceHealthTracker {
    pub fn new(config: &HealthConfig) -> Self {
        Self {
            records: DashMap::new(),
            failure_threshold: config.failure_threshold.max(1),
            base_backoff_secs: window_secs(config.base_backoff_secs),
            max_backoff_secs: window_secs(config.max_backoff_secs),
            probe_timeout: chrono::Duration::seconds(window_secs(config.probe_timeout_secs)),
        }
    }

    /// Make a source known so it shows up in snapshots before its first attempt.
    pub fn register(&self, name: &str) {
        self.records.entry(name.to_string()).or_default();
    }

    /// Backoff window for a given consecutive failure count.
    ///
    /// `base * 2^(fail_count - threshold)`, capped at the configured maximum.
    pub fn backoff_for(&self, fail_count: u32) -> chrono::Duration {
        let exponent = fail_count.saturating_sub(self.failure_threshold).min(62);
        let secs = self
            .base_backoff_secs
            .saturating_mul(1i64 << exponent)
            .min(self.max_backoff_secs);
        chrono::Duration::seconds(secs)
    }

    /// Reset the failure counter and close the circuit. `elapsed` is how long
    /// the successful attempt took.
    pub fn record_success(&self, name: &str, elapsed: Duration) {
        self.record_success_at(name, elapsed, Utc::now());
    }

    pub fn record_success_at(&self, name: &str, elapsed: Duration, now: DateTime<Utc>) {
        let mut record = self.records.entry(name.to_string()).or_default();
        record.requests.record(true, elapsed);
        if !record.state.is_closed() {
            info!(source = %name, "Source recovered, closing circuit");
        }
        record.state = CircuitState::Closed;
        record.fail_count = 0;
        record.last_success_at = Some(now);
    }

    /// Count a failure, opening the circuit once the threshold is reached.
    pub fn record_failure(&self, name: &str, error: &str, elapsed: Duration) {
        self.record_failure_at(name, error, elapsed, Utc::now());
    }

    pub fn record_failure_at(
        &self,
        name: &str,
        error: &str,
        elapsed: Duration,
        now: DateTime<Utc>,
    ) {
        let mut record = self.records.entry(name.to_string()).or_default();
        record.requests.record(false, elapsed);
        record.fail_count = record.fail_count.saturating_add(1);
        record.last_error = Some(error.to_string());
        record.last_failure_at = Some(now);

        let should_open = match record.state {
            // failed probe or failure reported while already open
            CircuitState::HalfOpen { .. } | CircuitState::Open { .. } => true,
            CircuitState::Closed => record.fail_count >= self.failure_threshold,
        };

        if should_open {
            let retry_after = now + self.backoff_for(record.fail_count);
            record.state = CircuitState::Open { retry_after };
            warn!(
                source = %name,
                fail_count = record.fail_count,
                retry_after = %retry_after,
                error = %error,
                "Source circuit open"
            );
        } else {
            debug!(source = %name, fail_count = record.fail_count, error = %error, "Source failure recorded");
        }
    }

    /// Whether the resolver may try this source now.
    ///
    /// Closed sources are eligible. An open source whose backoff has elapsed
    /// moves to half-open and this call returns `true` once; further calls
    /// return `false` until the probe reports back or the probe times out.
    pub fn is_eligible(&self, name: &str, now: DateTime<Utc>) -> bool {
        let Some(mut record) = self.records.get_mut(name) else {
            return true;
        };

        let state = record.state;
        match state {
            CircuitState::Closed => true,
            CircuitState::Open { retry_after } if now >= retry_after => {
                debug!(source = %name, "Backoff elapsed, allowing probe");
                record.state = CircuitState::HalfOpen { probe_started: now };
                true
            }
            CircuitState::Open { .. } => false,
            CircuitState::HalfOpen { probe_started } if now - probe_started >= self.probe_timeout => {
                debug!(source = %name, "Probe never reported back, allowing another");
                record.state = CircuitState::HalfOpen { probe_started: now };
                true
            }
            CircuitState::HalfOpen { .. } => false,
        }
    }

    /// Time left before an open source may be probed again.
    pub fn cooldown_remaining(&self, name: &str, now: DateTime<Utc>) -> Option<Duration> {
        let record = self.records.get(name)?;
        let retry_after = record.state.retry_after()?;
        (retry_after - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Health of one source.
    pub fn get(&self, name: &str) -> SourceHealth {
        self.records
            .get(name)
            .map(|r| SourceHealth::from_record(name, &r))
            .unwrap_or_else(|| SourceHealth::healthy(name))
    }

    /// Health of every known source, sorted by name.
    pub fn snapshot(&self) -> Vec<SourceHealth> {
        let mut health: Vec<_> = self
            .records
            .iter()
            .map(|entry| SourceHealth::from_record(entry.key(), entry.value()))
            .collect();
        health.sort_by(|a, b| a.name.cmp(&b.name));
        health
    }

    /// Restore every source to the initial healthy state. Request counters
    /// are kept.
    pub fn reset_all(&self) {
        for mut entry in self.records.iter_mut() {
            let reset = entry.value().reset();
            *entry.value_mut() = reset;
        }
        info!(sources = self.records.len(), "Reset all source health");
    }

    /// Restore one source. Returns false for an unknown name.
    pub fn reset_source(&self, name: &str) -> bool {
        match self.records.get_mut(name) {
            Some(mut record) => {
                *record = record.reset();
                info!(source = %name, "Reset source health");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::seconds(s)
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn tracker() -> SourceHealthTracker {
        SourceHealthTracker::new(&HealthConfig::default())
    }

    #[test]
    fn test_unknown_source_is_eligible() {
        let tracker = tracker();
        assert!(tracker.is_eligible("never-seen", t0()));
        assert!(tracker.get("never-seen").is_available);
    }

    #[test]
    fn test_failures_below_threshold_keep_source_available() {
        let tracker = tracker();
        tracker.record_failure_at("a", "boom", ms(50), t0());
        tracker.record_failure_at("a", "boom", ms(50), t0());

        let health = tracker.get("a");
        assert!(health.is_available);
        assert_eq!(health.fail_count, 2);
        assert_eq!(health.last_error.as_deref(), Some("boom"));
        assert!(tracker.is_eligible("a", t0()));
    }

    #[test]
    fn test_threshold_opens_circuit_with_base_backoff() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
        }

        let health = tracker.get("a");
        assert!(!health.is_available);
        assert_eq!(health.retry_after, Some(t0() + secs(30)));
        assert!(!tracker.is_eligible("a", t0() + secs(29)));
        assert!(tracker.is_eligible("a", t0() + secs(30)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let tracker = tracker();
        assert_eq!(tracker.backoff_for(3), secs(30));
        assert_eq!(tracker.backoff_for(4), secs(60));
        assert_eq!(tracker.backoff_for(5), secs(120));
        assert_eq!(tracker.backoff_for(9), secs(1800)); // 30 * 64 = 1920, capped
        assert_eq!(tracker.backoff_for(1000), secs(1800));

        let mut previous = chrono::Duration::zero();
        for n in 3..40 {
            let current = tracker.backoff_for(n);
            assert!(current >= previous);
            assert!(current <= secs(1800));
            previous = current;
        }
    }

    #[test]
    fn test_half_open_allows_single_probe() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
        }

        let later = t0() + secs(31);
        assert!(tracker.is_eligible("a", later));
        assert_eq!(
            tracker.get("a").circuit,
            CircuitState::HalfOpen {
                probe_started: later
            }
        );
        // Probe in flight: nobody else gets through
        assert!(!tracker.is_eligible("a", later));
        assert!(!tracker.is_eligible("a", later + secs(59)));
        // Probe timed out
        assert!(tracker.is_eligible("a", later + secs(60)));
    }

    #[test]
    fn test_failed_probe_reopens_with_longer_backoff() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
        }
        let probe_at = t0() + secs(30);
        assert!(tracker.is_eligible("a", probe_at));
        tracker.record_failure_at("a", "still down", ms(50), probe_at);

        let health = tracker.get("a");
        assert_eq!(health.fail_count, 4);
        assert_eq!(health.retry_after, Some(probe_at + secs(60)));
        assert!(!tracker.is_eligible("a", probe_at + secs(59)));
    }

    #[test]
    fn test_successful_probe_closes_circuit() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
        }
        assert!(tracker.is_eligible("a", t0() + secs(30)));
        tracker.record_success_at("a", ms(50), t0() + secs(31));

        let health = tracker.get("a");
        assert!(health.is_available);
        assert_eq!(health.fail_count, 0);
        assert!(health.retry_after.is_none());
        assert_eq!(health.last_success_at, Some(t0() + secs(31)));
        assert!(tracker.is_eligible("a", t0() + secs(31)));
    }

    #[test]
    fn test_cooldown_remaining() {
        let tracker = tracker();
        assert!(tracker.cooldown_remaining("a", t0()).is_none());
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
        }
        assert_eq!(
            tracker.cooldown_remaining("a", t0() + secs(10)),
            Some(Duration::from_secs(20))
        );
        assert!(tracker.cooldown_remaining("a", t0() + secs(30)).is_none());
    }

    #[test]
    fn test_reset_all_restores_initial_state() {
        let tracker = tracker();
        tracker.register("c");
        for _ in 0..5 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
        }
        tracker.record_failure_at("b", "boom", ms(50), t0());
        assert!(tracker.is_eligible("a", t0() + secs(3600)));

        tracker.reset_all();

        for health in tracker.snapshot() {
            assert!(health.is_available, "{} not available", health.name);
            assert_eq!(health.fail_count, 0);
            assert!(health.retry_after.is_none());
            assert!(health.last_error.is_none());
        }
        assert_eq!(tracker.snapshot().len(), 3);
    }

    #[test]
    fn test_request_counters_survive_reset() {
        let tracker = tracker();
        tracker.record_success_at("a", ms(100), t0());
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(400), t0());
        }

        let health = tracker.get("a");
        assert_eq!(health.total_requests, 4);
        assert_eq!(health.success_count, 1);
        assert_eq!(health.avg_latency_ms, 325);

        tracker.reset_all();
        let health = tracker.get("a");
        assert!(health.is_available);
        assert_eq!(health.fail_count, 0);
        assert_eq!(health.total_requests, 4);
        assert_eq!(health.success_count, 1);

        assert!(tracker.reset_source("a"));
        assert_eq!(tracker.get("a").total_requests, 4);
    }

    #[test]
    fn test_huge_backoff_settings_saturate() {
        let tracker = SourceHealthTracker::new(&HealthConfig {
            failure_threshold: 1,
            base_backoff_secs: u64::MAX / 2,
            max_backoff_secs: u64::MAX,
            probe_timeout_secs: u64::MAX,
        });
        assert_eq!(tracker.backoff_for(u32::MAX), secs(MAX_WINDOW_SECS));
        assert_eq!(tracker.backoff_for(1), secs(MAX_WINDOW_SECS));

        for _ in 0..100 {
            tracker.record_failure_at("a", "boom", ms(1), t0());
        }
        assert_eq!(tracker.get("a").retry_after, Some(t0() + secs(MAX_WINDOW_SECS)));

        let doubling = SourceHealthTracker::new(&HealthConfig {
            failure_threshold: 1,
            base_backoff_secs: 1 << 20,
            max_backoff_secs: u64::MAX,
            probe_timeout_secs: 60,
        });
        assert_eq!(doubling.backoff_for(40), secs(MAX_WINDOW_SECS));
    }

    #[test]
    fn test_reset_source_only_touches_one() {
        let tracker = tracker();
        for _ in 0..3 {
            tracker.record_failure_at("a", "boom", ms(50), t0());
            tracker.record_failure_at("b", "boom", ms(50), t0());
        }
        assert!(tracker.reset_source("a"));
        assert!(!tracker.reset_source("missing"));

        assert!(tracker.get("a").is_available);
        assert!(!tracker.get("b").is_available);
    }

    #[test]
    fn test_snapshot_sorted_and_includes_registered() {
        let tracker = tracker();
        tracker.register("zeta");
        tracker.register("alpha");
        tracker.record_failure_at("mid", "boom", ms(50), t0());

        let names: Vec<_> = tracker.snapshot().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_custom_threshold() {
        let tracker = SourceHealthTracker::new(&HealthConfig {
            failure_threshold: 1,
            base_backoff_secs: 5,
            max_backoff_secs: 20,
            probe_timeout_secs: 10,
        });
        tracker.record_failure_at("a", "boom", ms(50), t0());
        assert_eq!(tracker.get("a").retry_after, Some(t0() + secs(5)));
        assert_eq!(tracker.backoff_for(4), secs(20));
    }
}
