//! Unified error type for the Trialforge engine.

use std::path::PathBuf;

use trialforge_pool::PoolError;
use trialforge_protocol::ProtocolError;
use trialforge_session::SessionError;
use trialforge_snapshot::SnapshotError;
use trialforge_store::{MigrationError, StoreError};

/// Top-level error that wraps all crate-specific errors.
///
/// Hosts embedding the engine deal with this single type; `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TrialforgeError {
    /// The store could not be opened or queried.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Schema migration failed. Startup must abort.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
