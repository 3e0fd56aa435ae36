//! The forward-only schema migration engine.
//!
//! # Algorithm
//!
//! ```text
//! integrity check (log only)
//!   → ensure schema_migrations
//!   → current = MAX(version) or 0      (data but no tables → Corrupt)
//!   → pending = version > current, ascending
//!   → for each: apply + record (one transaction) → verify row
//!   → checkpoint
//! ```
//!
//! The first failure stops everything: the failing version's statements
//! and its record roll back together, nothing after it runs, and the error is returned to
//! the caller, which is expected to abort startup. The engine never
//! retries. Each migration's statements must be idempotent
//! (`CREATE ... IF NOT EXISTS`) so an operator can rerun startup after
//! fixing the cause.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::{MigrationError, Store, StoreError};

/// The statements of one migration. Receives the connection inside the
/// migration's transaction.
pub type MigrationFn = fn(&Connection) -> rusqlite::Result<()>;

/// One versioned schema change, defined at build time.
#[derive(Clone)]
pub struct Migration {
    /// Strictly unique, ascending. Gaps are allowed.
    pub version: u32,
    /// Human-readable summary, stored in `schema_migrations.description`.
    pub description: &'static str,
    /// The idempotent statements.
    pub apply: MigrationFn,
}

impl Migration {
    /// Creates a migration record.
    pub const fn new(version: u32, description: &'static str, apply: MigrationFn) -> Self {
        Self {
            version,
            description,
            apply,
        }
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version recorded before the run.
    pub from_version: u32,
    /// Version recorded after the run.
    pub to_version: u32,
    /// Versions applied by this run, in order.
    pub applied: Vec<u32>,
}

/// Applies pending [`Migration`]s to a [`Store`].
pub struct Migrator<'a> {
    store: &'a Store,
    migrations: Vec<Migration>,
}

impl<'a> Migrator<'a> {
    /// Creates a migrator for an explicit migration list. Declaration
    /// order doesn't matter; the list is sorted by version.
    pub fn new(store: &'a Store, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { store, migrations }
    }

    /// Creates a migrator for the built-in Trialforge schema.
    pub fn builtin(store: &'a Store) -> Self {
        Self::new(store, crate::builtin_migrations())
    }

    /// Highest version in the migration list (0 if empty).
    pub fn latest_version(&self) -> u32 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    /// Runs the full migration algorithm. See the module docs.
    ///
    /// # Errors
    /// Every error is fatal; see [`MigrationError`].
    pub fn run(&self) -> Result<MigrationReport, MigrationError> {
        self.check_unique_versions()?;
        self.integrity_check();

        // Inspect before creating the metadata table: a file with bytes in
        // it but no tables at all is corrupt, not empty.
        let bytes = self.store.file_len()?;
        if bytes > 0 && self.store.table_count()? == 0 {
            tracing::error!(
                path = %self.store.path().display(),
                bytes,
                "store has data but no tables, aborting"
            );
            return Err(MigrationError::Corrupt {
                path: self.store.path().to_path_buf(),
                bytes,
            });
        }

        self.ensure_metadata_table()?;
        let from_version = self.current_version()?;

        let pending: Vec<&Migration> = self
            .migrations
            .iter()
            .filter(|m| m.version > from_version)
            .collect();

        if pending.is_empty() {
            tracing::info!(version = from_version, "schema up to date");
            return Ok(MigrationReport {
                from_version,
                to_version: from_version,
                applied: Vec::new(),
            });
        }

        tracing::info!(
            from = from_version,
            to = self.latest_version(),
            pending = pending.len(),
            "applying schema migrations"
        );

        let mut applied = Vec::with_capacity(pending.len());
        for migration in pending {
            self.apply_one(migration)?;
            applied.push(migration.version);
        }

        self.store.checkpoint()?;
        let to_version = self.current_version()?;
        tracing::info!(version = to_version, applied = applied.len(), "schema migrated");

        Ok(MigrationReport {
            from_version,
            to_version,
            applied,
        })
    }

    /// Highest recorded version, or 0 when nothing has been applied.
    pub fn current_version(&self) -> Result<u32, StoreError> {
        if !self.store.table_exists("schema_migrations")? {
            return Ok(0);
        }
        self.store
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .map(|v| v.unwrap_or(0))
    }

    /// Every recorded `(version, description, executed_at)`, ascending.
    pub fn applied(&self) -> Result<Vec<(u32, String, DateTime<Utc>)>, StoreError> {
        self.store.query_map(
            "SELECT version, description, executed_at FROM schema_migrations ORDER BY version",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
    }

    fn check_unique_versions(&self) -> Result<(), MigrationError> {
        let mut seen = HashSet::with_capacity(self.migrations.len());
        for migration in &self.migrations {
            if !seen.insert(migration.version) {
                return Err(MigrationError::DuplicateVersion(migration.version));
            }
        }
        Ok(())
    }

    fn integrity_check(&self) {
        match self.store.integrity_check() {
            Ok(result) if result == "ok" => {
                tracing::debug!("store integrity check passed");
            }
            Ok(result) => {
                tracing::warn!(%result, "store integrity check reported problems");
            }
            Err(e) => {
                tracing::warn!(error = %e, "store integrity check was inconclusive");
            }
        }
    }

    fn ensure_metadata_table(&self) -> Result<(), StoreError> {
        self.store.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                executed_at TEXT NOT NULL
            );",
        )
    }

    fn apply_one(&self, migration: &Migration) -> Result<(), MigrationError> {
        let Migration {
            version,
            description,
            apply,
        } = *migration;

        tracing::info!(version, description, "applying migration");

        let result = self.store.transaction(|tx| {
            apply(tx)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, description, executed_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![version, description, Utc::now()],
            )?;
            Ok(())
        });
        if let Err(source) = result {
            tracing::error!(version, description, error = %source, "migration failed, aborting");
            return Err(MigrationError::Failed {
                version,
                description,
                source,
            });
        }

        let recorded: u32 = self
            .store
            .query_row(
                "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )?
            .unwrap_or(0);
        if recorded != 1 {
            tracing::error!(version, recorded, "migration row did not read back");
            return Err(MigrationError::Unrecorded(version));
        }

        Ok(())
    }
}
