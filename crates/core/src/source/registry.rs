//! Ordered set of configured content sources.

use std::sync::Arc;

use tracing::info;

use crate::config::SourceConfig;

use super::{EpisodeSource, HttpSource, SourceDescriptor, SourceError};

/// Holds the registered sources in registration order.
///
/// Sources are never removed at runtime; only their health changes.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn EpisodeSource>>,
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of HTTP sources from configuration, skipping disabled ones.
    pub fn from_config(configs: &[SourceConfig]) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        for config in configs.iter().filter(|c| c.enabled) {
            let source = HttpSource::new(config)?;
            registry.register(Arc::new(source))?;
            info!(
                source = %config.name,
                priority = config.priority,
                language = %config.language,
                "Registered source"
            );
        }
        Ok(registry)
    }

    /// Register a source. Names are unique, case-insensitively.
    pub fn register(&mut self, source: Arc<dyn EpisodeSource>) -> Result<(), SourceError> {
        if self.get(source.name()).is_some() {
            return Err(SourceError::DuplicateName(source.name().to_string()));
        }
        self.sources.push(source);
        Ok(())
    }

    /// Look up a source by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<Arc<dyn EpisodeSource>> {
        self.sources
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Sources by descending priority, ties broken by registration order.
    pub fn ordered(&self) -> Vec<Arc<dyn EpisodeSource>> {
        let mut sources = self.sources.clone();
        // sort_by_key is stable, which keeps registration order for ties
        sources.sort_by_key(|s| std::cmp::Reverse(s.descriptor().priority));
        sources
    }

    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.sources.iter().map(|s| s.descriptor().clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
