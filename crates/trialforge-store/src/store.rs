//! The durable store client.
//!
//! `Store` owns at most one SQLite connection behind a mutex. Every public
//! method goes through [`Store::with_connection`], which (re)opens the
//! connection on demand. If a statement fails in a way that means the
//! connection itself is gone (I/O failure, file replaced underneath us),
//! the connection is dropped and the next call transparently reconnects.
//!
//! # Concurrency note
//!
//! SQLite serializes writers anyway, so one connection behind a
//! `std::sync::Mutex` is enough for a single-process engine. Calls are
//! short and synchronous; async callers invoke them directly.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, ErrorCode, OptionalExtension, Params, Row, Transaction};

use crate::{StoreConfig, StoreError};

/// Reconnecting wrapper around a SQLite database.
pub struct Store {
    config: StoreConfig,
    conn: Mutex<Option<Connection>>,
}

impl Store {
    /// Opens (creating if needed) the database described by `config`.
    ///
    /// Opening eagerly means a bad path fails at startup rather than on
    /// the first query.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let conn = open_connection(&config)?;
        tracing::info!(path = %config.path.display(), "store opened");
        Ok(Self {
            config,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Drops the current connection. The next call reopens it.
    pub fn close(&self) {
        if self.lock().take().is_some() {
            tracing::debug!(path = %self.config.path.display(), "store connection closed");
        }
    }

    /// Runs `f` against the live connection, reconnecting first if needed.
    ///
    /// This is the single choke point where rusqlite errors become
    /// [`StoreError`]s.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock();
        if guard.is_none() {
            *guard = Some(open_connection(&self.config)?);
            tracing::info!(path = %self.config.path.display(), "store reconnected");
        }
        let Some(conn) = guard.as_mut() else {
            return Err(StoreError::Closed);
        };

        match f(conn) {
            Ok(value) => Ok(value),
            Err(err) => {
                if is_connection_lost(&err) {
                    tracing::warn!(
                        path = %self.config.path.display(),
                        error = %err,
                        "store connection lost, will reconnect on next call"
                    );
                    *guard = None;
                }
                Err(StoreError::Query(err))
            }
        }
    }

    /// Executes one parameterized statement, returning the affected row count.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, StoreError> {
        self.with_connection(|conn| conn.execute(sql, params))
    }

    /// Executes several `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        self.with_connection(|conn| conn.execute_batch(sql))
    }

    /// Returns the first row mapped through `f`, or `None` if there is none.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>, StoreError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_connection(|conn| conn.query_row(sql, params, f).optional())
    }

    /// Maps every row through `f`.
    pub fn query_map<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>, StoreError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, f)?;
            let collected = rows.collect::<rusqlite::Result<Vec<T>>>();
            collected
        })
    }

    /// Runs `f` inside a transaction. Commits if `f` succeeds; any error
    /// rolls the whole transaction back.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }

    /// Returns `true` if the query yields at least one row.
    pub fn exists<P: Params>(&self, sql: &str, params: P) -> Result<bool, StoreError> {
        self.query_row(sql, params, |_| Ok(())).map(|row| row.is_some())
    }

    /// Returns `true` if a table with this name exists.
    pub fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.exists(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1",
            [name],
        )
    }

    /// Number of user tables (SQLite's internal tables excluded).
    pub fn table_count(&self) -> Result<u32, StoreError> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get(0),
            )
        })
    }

    /// Runs `PRAGMA integrity_check` and returns its first line (`"ok"` when
    /// healthy).
    pub fn integrity_check(&self) -> Result<String, StoreError> {
        self.with_connection(|conn| {
            conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
        })
    }

    /// Flushes the write-ahead log (if any) into the main database file so
    /// external tools see a consistent file.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        })
    }

    /// Size of the database file in bytes (0 if it doesn't exist yet).
    pub fn file_len(&self) -> Result<u64, StoreError> {
        match std::fs::metadata(&self.config.path) {
            Ok(meta) => Ok(meta.len()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(StoreError::Io {
                path: self.config.path.clone(),
                source,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wraps a parse failure inside a row mapper as a rusqlite conversion error.
///
/// Row mappers must return `rusqlite::Result`, so ids and enums stored as
/// TEXT are parsed and, on failure, reported through this.
pub fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn open_connection(config: &StoreConfig) -> Result<Connection, StoreError> {
    let open_err = |source| StoreError::Open {
        path: config.path.clone(),
        source,
    };
    let conn = Connection::open(&config.path).map_err(open_err)?;
    conn.busy_timeout(config.busy_timeout).map_err(open_err)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(open_err)?;
    Ok(conn)
}

fn is_connection_lost(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(
                e.code,
                ErrorCode::CannotOpen | ErrorCode::SystemIoFailure | ErrorCode::NotADatabase
            )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreConfig::at(dir.path().join("test.db"))).unwrap();
        (dir, store)
    }

    #[test]
    fn test_execute_and_query_row_round_trip() {
        let (_dir, store) = temp_store();
        store.execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY, v INTEGER)").unwrap();
        store.execute("INSERT INTO t (k, v) VALUES (?1, ?2)", ("a", 7)).unwrap();

        let v: Option<i64> = store
            .query_row("SELECT v FROM t WHERE k = ?1", ["a"], |row| row.get(0))
            .unwrap();
        assert_eq!(v, Some(7));
    }

    #[test]
    fn test_query_row_missing_returns_none() {
        let (_dir, store) = temp_store();
        store.execute_batch("CREATE TABLE t (k TEXT)").unwrap();

        let v: Option<String> = store
            .query_row("SELECT k FROM t", [], |row| row.get(0))
            .unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn test_transaction_error_rolls_back() {
        let (_dir, store) = temp_store();
        store.execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY)").unwrap();

        let result = store.transaction(|tx| {
            tx.execute("INSERT INTO t (k) VALUES ('a')", [])?;
            tx.execute("INSERT INTO t (k) VALUES ('a')", [])?;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::Query(_))));
        assert!(!store.exists("SELECT 1 FROM t", []).unwrap());
    }

    #[test]
    fn test_close_then_query_reconnects() {
        let (_dir, store) = temp_store();
        store.execute_batch("CREATE TABLE t (k TEXT)").unwrap();

        store.close();

        assert!(store.table_exists("t").unwrap());
    }

    #[test]
    fn test_table_count_ignores_internal_tables() {
        let (_dir, store) = temp_store();
        assert_eq!(store.table_count().unwrap(), 0);
        store
            .execute_batch("CREATE TABLE a (x INTEGER PRIMARY KEY AUTOINCREMENT); CREATE TABLE b (y)")
            .unwrap();
        // AUTOINCREMENT creates sqlite_sequence, which must not count.
        assert_eq!(store.table_count().unwrap(), 2);
    }

    #[test]
    fn test_integrity_check_fresh_store_is_ok() {
        let (_dir, store) = temp_store();
        assert_eq!(store.integrity_check().unwrap(), "ok");
    }

    #[test]
    fn test_foreign_keys_are_enforced() {
        let (_dir, store) = temp_store();
        store
            .execute_batch(
                "CREATE TABLE p (id TEXT PRIMARY KEY);
                 CREATE TABLE c (pid TEXT REFERENCES p(id) ON DELETE CASCADE);",
            )
            .unwrap();

        let result = store.execute("INSERT INTO c (pid) VALUES ('missing')", []);
        assert!(result.is_err());
    }
}
