//! Error types for the store layer.

use std::path::PathBuf;

/// Errors raised by the [`Store`](crate::Store) client.
///
/// Raw rusqlite errors never escape the store: they are wrapped here so
/// callers match on one enum regardless of what went wrong underneath.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file could not be opened or configured.
    #[error("cannot open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement or query failed.
    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// The store was explicitly closed and has not been reopened.
    #[error("store is closed")]
    Closed,

    /// Filesystem access around the database file failed.
    #[error("store file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the [`Migrator`](crate::Migrator).
///
/// Every variant is fatal: the caller is expected to abort startup.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The store could not be inspected at all.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The database file has content but no recognizable tables.
    #[error("store at {path} holds {bytes} bytes but no tables; refusing to migrate a corrupt store")]
    Corrupt { path: PathBuf, bytes: u64 },

    /// Two migrations declare the same version.
    #[error("migration version {0} is declared more than once")]
    DuplicateVersion(u32),

    /// A migration's statements failed. Nothing was recorded for it.
    #[error("migration {version} ({description}) failed: {source}")]
    Failed {
        version: u32,
        description: &'static str,
        #[source]
        source: StoreError,
    },

    /// A migration applied, but its metadata row did not read back.
    #[error("migration {0} applied but its schema_migrations row is missing")]
    Unrecorded(u32),
}
