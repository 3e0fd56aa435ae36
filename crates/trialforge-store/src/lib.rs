//! Durable storage for Trialforge.
//!
//! Two pieces live here:
//!
//! 1. **[`Store`]**: a thin, reconnecting wrapper around a SQLite
//!    connection. It offers parameterized queries, batch and transactional
//!    execution, and existence checks, and converts every low-level error
//!    into a [`StoreError`] at its boundary.
//! 2. **[`Migrator`]**: the forward-only schema migration engine. It runs
//!    once at startup, before anything else touches the store, and aborts
//!    startup on the first failing migration.
//!
//! The built-in schema ([`builtin_migrations`]) defines every table the
//! other crates use.

mod config;
mod error;
mod migration;
mod schema;
mod store;

pub use config::StoreConfig;
pub use error::{MigrationError, StoreError};
pub use migration::{Migration, MigrationFn, MigrationReport, Migrator};
pub use schema::builtin_migrations;
pub use store::{conversion_error, Store};

/// Re-exported so downstream crates bind parameters and map rows against
/// the same rusqlite version the store was built with.
pub use rusqlite;
