//! Engine configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use trialforge_pool::PoolConfig;
use trialforge_session::RegistryConfig;
use trialforge_store::StoreConfig;

use crate::TrialforgeError;

/// Everything the [`Engine`](crate::Engine) needs to start.
///
/// ```toml
/// [store]
/// path = "data/trialforge.db"
///
/// [pool]
/// pool_dir = "world_pool"
/// target_size = 3
///
/// [registry]
/// snapshot_dir = "data/sessions"
/// ```
///
/// Missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store: StoreConfig,
    pub pool: PoolConfig,
    pub registry: RegistryConfig,
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, TrialforgeError> {
        toml::from_str(raw).map_err(|source| TrialforgeError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, TrialforgeError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TrialforgeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }
}
