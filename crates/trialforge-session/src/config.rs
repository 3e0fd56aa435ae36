//! Registry configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the [`SessionRegistry`](crate::SessionRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Mirror every provisioned session to the store after each change.
    /// When off, only explicit [`persist`](crate::SessionRegistry::persist)
    /// calls write.
    pub autosave: bool,

    /// Where file snapshots (`<id>.json`) are written on shutdown.
    /// `None` disables file snapshots.
    pub snapshot_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            autosave: true,
            snapshot_dir: None,
        }
    }
}
