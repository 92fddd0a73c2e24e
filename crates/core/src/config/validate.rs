use std::collections::HashSet;

use super::{types::Config, ConfigError, DebridBackend};
use crate::debrid::Quality;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Health thresholds and backoff bounds are coherent
/// - Source names are present and unique
/// - The selected debrid backend has its credentials
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.health.failure_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "health.failure_threshold must be at least 1".to_string(),
        ));
    }

    if config.health.base_backoff_secs > config.health.max_backoff_secs {
        return Err(ConfigError::ValidationError(format!(
            "health.base_backoff_secs ({}) exceeds health.max_backoff_secs ({})",
            config.health.base_backoff_secs, config.health.max_backoff_secs
        )));
    }

    if config.resolver.source_timeout_ms == 0 || config.resolver.stream_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "resolver timeouts cannot be 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        let name = source.name.trim();
        if name.is_empty() {
            return Err(ConfigError::ValidationError(
                "sources[].name cannot be empty".to_string(),
            ));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate source name: {}",
                name
            )));
        }
        if source.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "source {} has an empty url",
                name
            )));
        }
    }

    if let Some(debrid) = &config.debrid {
        match debrid.backend {
            DebridBackend::Torbox => match &debrid.torbox {
                Some(torbox) if !torbox.api_key.trim().is_empty() => {}
                _ => {
                    return Err(ConfigError::ValidationError(
                        "debrid.torbox.api_key is required when backend = \"torbox\"".to_string(),
                    ))
                }
            },
        }

        if Quality::parse(&debrid.preferred_quality).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "unknown debrid.preferred_quality: {}",
                debrid.preferred_quality
            )));
        }
    }

    Ok(())
}
