use streamfinder_core::{Config, Engine, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Engine,
}

impl AppState {
    pub fn new(config: Config, engine: Engine) -> Self {
        Self { config, engine }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}
