//! `EngineBuilder`: programmatic configuration on top of [`EngineConfig`].

use std::sync::Arc;

use trialforge_pool::{PoolConfig, WorldProvider};
use trialforge_session::{Clock, RegistryConfig, SystemClock};
use trialforge_store::StoreConfig;

use crate::{Engine, EngineConfig, TrialforgeError};

/// Builder for configuring and starting an [`Engine`].
///
/// # Example
///
/// ```rust,ignore
/// use trialforge::prelude::*;
///
/// let engine = Engine::builder()
///     .config(EngineConfig::from_toml_file("trialforge.toml")?)
///     .start(Arc::new(my_worlds))
///     .await?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl EngineBuilder {
    /// Creates a builder with default settings and the system clock.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.config.registry = registry;
        self
    }

    /// Sets the time source for session timers.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens the store, migrates it and starts every component.
    ///
    /// # Errors
    /// [`TrialforgeError::Migration`] if the schema can't be brought up to
    /// date; the host should abort.
    pub async fn start(self, provider: Arc<dyn WorldProvider>) -> Result<Engine, TrialforgeError> {
        Engine::start(self.config, provider, self.clock).await
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
