//! Error types for the pool layer.

use std::path::PathBuf;

use trialforge_store::StoreError;

/// A world operation reported by the [`WorldProvider`](crate::WorldProvider)
/// failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("world {name}: {reason}")]
pub struct WorldError {
    pub name: String,
    pub reason: String,
}

impl WorldError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// A filesystem operation on a pool or live folder failed.
    #[error("pool filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A claim would overwrite a live world folder.
    #[error("live world folder {0} already exists")]
    LiveWorldExists(PathBuf),

    /// The world provider refused an operation.
    #[error(transparent)]
    World(#[from] WorldError),

    /// The main context thread has stopped.
    #[error("main context is not running")]
    MainContextGone,

    /// The pool worker task has stopped.
    #[error("pool worker is not running")]
    WorkerGone,

    /// Pool metadata could not be written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PoolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
