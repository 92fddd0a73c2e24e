use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub debrid: Option<DebridConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Source health / circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthConfig {
    /// Consecutive failures before a source is taken out of rotation.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// First backoff window once the threshold is reached.
    #[serde(default = "default_base_backoff")]
    pub base_backoff_secs: u64,
    /// Upper bound for the doubling backoff.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    /// A half-open probe that never reports back is released after this long.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_base_backoff() -> u64 {
    30
}

fn default_max_backoff() -> u64 {
    30 * 60
}

fn default_probe_timeout() -> u64 {
    60
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            base_backoff_secs: default_base_backoff(),
            max_backoff_secs: default_max_backoff(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Resolution policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResolverConfig {
    /// Per-source timeout for an episode list request.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,
    /// Per-source timeout for a direct stream URL request.
    #[serde(default = "default_source_timeout")]
    pub stream_timeout_ms: u64,
    /// Collapse concurrent resolutions of the same key into one.
    #[serde(default = "default_true")]
    pub dedup_in_flight: bool,
}

fn default_source_timeout() -> u64 {
    8000
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: default_source_timeout(),
            stream_timeout_ms: default_source_timeout(),
            dedup_in_flight: true,
        }
    }
}

impl ResolverConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }
}

/// A content provider reachable over the HTTP/JSON capability contract.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub priority: i32,
    /// Base URL of the scraper endpoint.
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP-level timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u32,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_http_timeout() -> u32 {
    30
}

/// Debrid / instant-stream fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DebridConfig {
    /// Debrid backend type
    pub backend: DebridBackend,
    /// Quality used when the caller does not ask for one.
    #[serde(default = "default_quality")]
    pub preferred_quality: String,
    /// Interval between readiness checks for an uncached torrent.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Give up on an uncached torrent after this long.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    /// Maximum hashes sent in one cache check.
    #[serde(default = "default_max_cache_check")]
    pub max_cache_check: usize,
    /// Maximum search candidates considered.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
    /// TorBox-specific configuration (required when backend = "torbox")
    #[serde(default)]
    pub torbox: Option<TorBoxConfig>,
    #[serde(default)]
    pub nyaa: NyaaConfig,
}

fn default_quality() -> String {
    "1080p".to_string()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_max_wait() -> u64 {
    60
}

fn default_max_cache_check() -> usize {
    20
}

fn default_max_candidates() -> usize {
    30
}

impl DebridConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// Available debrid backends
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebridBackend {
    Torbox,
}

/// TorBox API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TorBoxConfig {
    #[serde(default = "default_torbox_url")]
    pub url: String,
    pub api_key: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u32,
    /// Max requests per minute; 0 disables pacing (default: 60)
    #[serde(default = "default_torbox_rate_limit")]
    pub rate_limit_rpm: u32,
}

fn default_torbox_url() -> String {
    "https://api.torbox.app".to_string()
}

fn default_torbox_rate_limit() -> u32 {
    60
}

/// Nyaa RSS search configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NyaaConfig {
    #[serde(default = "default_nyaa_url")]
    pub url: String,
    /// Nyaa category filter ("1_2" = anime, English-translated)
    #[serde(default = "default_nyaa_category")]
    pub category: String,
    #[serde(default = "default_nyaa_timeout")]
    pub timeout_secs: u32,
    /// Max requests per minute per host; 0 disables pacing (default: 30)
    #[serde(default = "default_nyaa_rate_limit")]
    pub rate_limit_rpm: u32,
    /// Mirror base URLs searched alongside `url`.
    #[serde(default)]
    pub mirrors: Vec<String>,
}

fn default_nyaa_url() -> String {
    "https://nyaa.si".to_string()
}

fn default_nyaa_category() -> String {
    "1_2".to_string()
}

fn default_nyaa_timeout() -> u32 {
    8
}

fn default_nyaa_rate_limit() -> u32 {
    30
}

impl Default for NyaaConfig {
    fn default() -> Self {
        Self {
            url: default_nyaa_url(),
            category: default_nyaa_category(),
            timeout_secs: default_nyaa_timeout(),
            rate_limit_rpm: default_nyaa_rate_limit(),
            mirrors: Vec::new(),
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub health: HealthConfig,
    pub resolver: ResolverConfig,
    pub sources: Vec<SourceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debrid: Option<SanitizedDebridConfig>,
}

/// Sanitized debrid config (API key redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDebridConfig {
    pub backend: String,
    pub preferred_quality: String,
    pub max_wait_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torbox: Option<SanitizedTorBoxConfig>,
}

/// Sanitized TorBox config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedTorBoxConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
    pub rate_limit_rpm: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            health: config.health.clone(),
            resolver: config.resolver.clone(),
            sources: config.sources.clone(),
            debrid: config.debrid.as_ref().map(|d| SanitizedDebridConfig {
                backend: match d.backend {
                    DebridBackend::Torbox => "torbox".to_string(),
                },
                preferred_quality: d.preferred_quality.clone(),
                max_wait_secs: d.max_wait_secs,
                torbox: d.torbox.as_ref().map(|t| SanitizedTorBoxConfig {
                    url: t.url.clone(),
                    api_key_configured: !t.api_key.is_empty(),
                    timeout_secs: t.timeout_secs,
                    rate_limit_rpm: t.rate_limit_rpm,
                }),
            }),
        }
    }
}
