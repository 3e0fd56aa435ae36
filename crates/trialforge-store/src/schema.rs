//! The built-in Trialforge schema, as an ordered list of migrations.
//!
//! Append new versions at the end. Never edit a migration that has shipped:
//! stores that already recorded it will not run it again.

use rusqlite::Connection;

use crate::Migration;

/// Every built-in migration, in version order.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![
        Migration::new(1, "create sessions and session_members", create_sessions),
        Migration::new(2, "create session_settings", create_session_settings),
        Migration::new(3, "create player_snapshots", create_player_snapshots),
        Migration::new(4, "create pool_entries", create_pool_entries),
        Migration::new(5, "index memberships by player", index_members_by_player),
    ]
}

fn create_sessions(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            status TEXT NOT NULL,
            world_name TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            started_at TEXT,
            paused_at TEXT,
            completed_at TEXT,
            total_paused_ms INTEGER NOT NULL DEFAULT 0,
            provisioned INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS session_members (
            session_id TEXT NOT NULL,
            player_id TEXT NOT NULL,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (session_id, player_id),
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);",
    )
}

fn create_session_settings(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session_settings (
            session_id TEXT PRIMARY KEY,
            keep_inventory INTEGER NOT NULL,
            natural_regeneration INTEGER NOT NULL,
            ultra_hardcore INTEGER NOT NULL,
            shared_health INTEGER NOT NULL,
            starter_kit TEXT NOT NULL,
            border_size INTEGER NOT NULL,
            difficulty TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );",
    )
}

fn create_player_snapshots(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS player_snapshots (
            player_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            inventory TEXT NOT NULL,
            ender_chest TEXT NOT NULL,
            world TEXT NOT NULL,
            x REAL NOT NULL,
            y REAL NOT NULL,
            z REAL NOT NULL,
            yaw REAL NOT NULL,
            pitch REAL NOT NULL,
            health REAL NOT NULL,
            food INTEGER NOT NULL,
            saturation REAL NOT NULL,
            xp_level INTEGER NOT NULL,
            xp_progress REAL NOT NULL,
            effects TEXT NOT NULL,
            game_mode TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            PRIMARY KEY (player_id, session_id),
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        );",
    )
}

fn create_pool_entries(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pool_entries (
            name TEXT PRIMARY KEY,
            seed INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );",
    )
}

fn index_members_by_player(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_session_members_player ON session_members(player_id);",
    )
}
