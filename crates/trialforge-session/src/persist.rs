//! Mapping sessions to store rows and to JSON files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use trialforge_protocol::{Codec, Difficulty, JsonCodec, PlayerId, SessionId};
use trialforge_store::rusqlite::{self, Row, params};
use trialforge_store::{Store, StoreError, conversion_error};

use crate::session::Session;
use crate::{SessionError, SessionSettings, StarterKit};

// ---------------------------------------------------------------------------
// Store rows
// ---------------------------------------------------------------------------

/// Upserts the session row, its members and its settings in one
/// transaction. The session row is updated in place (never replaced) so
/// rows that cascade from it survive.
pub(crate) fn write_session(store: &Store, session: &Session) -> Result<(), StoreError> {
    let id = session.id.to_string();
    store.transaction(|tx| {
        tx.execute(
            "INSERT INTO sessions (
                id, name, status, world_name, owner_id, created_at,
                started_at, paused_at, completed_at, total_paused_ms, provisioned
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                world_name = excluded.world_name,
                owner_id = excluded.owner_id,
                created_at = excluded.created_at,
                started_at = excluded.started_at,
                paused_at = excluded.paused_at,
                completed_at = excluded.completed_at,
                total_paused_ms = excluded.total_paused_ms,
                provisioned = excluded.provisioned",
            params![
                id,
                session.name,
                session.status.as_str(),
                session.world_name,
                session.owner.to_string(),
                session.created_at,
                session.started_at,
                session.paused_at,
                session.completed_at,
                session.total_paused_ms,
                session.provisioned,
            ],
        )?;

        tx.execute("DELETE FROM session_members WHERE session_id = ?1", [&id])?;
        for (player, joined_at) in &session.members {
            tx.execute(
                "INSERT INTO session_members (session_id, player_id, joined_at) VALUES (?1, ?2, ?3)",
                params![id, player.to_string(), joined_at],
            )?;
        }

        let s = &session.settings;
        tx.execute(
            "INSERT OR REPLACE INTO session_settings (
                session_id, keep_inventory, natural_regeneration, ultra_hardcore,
                shared_health, starter_kit, border_size, difficulty
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                s.keep_inventory,
                s.natural_regeneration,
                s.ultra_hardcore,
                s.shared_health,
                s.starter_kit.as_str(),
                s.border_size,
                s.difficulty.as_str(),
            ],
        )?;
        Ok(())
    })
}

pub(crate) fn delete_session(store: &Store, id: &SessionId) -> Result<(), StoreError> {
    store.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

/// Loads every stored session with its members and settings.
pub(crate) fn read_sessions(store: &Store) -> Result<Vec<Session>, StoreError> {
    let mut sessions: HashMap<SessionId, Session> = store
        .query_map(
            "SELECT id, name, status, world_name, owner_id, created_at,
                    started_at, paused_at, completed_at, total_paused_ms, provisioned
             FROM sessions",
            [],
            session_from_row,
        )?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let members: Vec<(SessionId, PlayerId, DateTime<Utc>)> = store.query_map(
        "SELECT session_id, player_id, joined_at FROM session_members",
        [],
        |row| Ok((parse(row, 0)?, parse(row, 1)?, row.get(2)?)),
    )?;
    for (session_id, player, joined_at) in members {
        if let Some(session) = sessions.get_mut(&session_id) {
            session.members.insert(player, joined_at);
        }
    }

    let settings: Vec<(SessionId, SessionSettings)> = store.query_map(
        "SELECT session_id, keep_inventory, natural_regeneration, ultra_hardcore,
                shared_health, starter_kit, border_size, difficulty
         FROM session_settings",
        [],
        |row| {
            Ok((
                parse(row, 0)?,
                SessionSettings {
                    keep_inventory: row.get(1)?,
                    natural_regeneration: row.get(2)?,
                    ultra_hardcore: row.get(3)?,
                    shared_health: row.get(4)?,
                    starter_kit: parse::<StarterKit>(row, 5)?,
                    border_size: row.get(6)?,
                    difficulty: parse::<Difficulty>(row, 7)?,
                },
            ))
        },
    )?;
    for (session_id, s) in settings {
        if let Some(session) = sessions.get_mut(&session_id) {
            session.settings = s;
        }
    }

    let mut sessions: Vec<Session> = sessions.into_values().collect();
    sessions.sort_by_key(|s| s.created_at);
    Ok(sessions)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: parse(row, 0)?,
        name: row.get(1)?,
        status: parse(row, 2)?,
        world_name: row.get(3)?,
        owner: parse(row, 4)?,
        members: Default::default(),
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        paused_at: row.get(7)?,
        completed_at: row.get(8)?,
        total_paused_ms: row.get(9)?,
        settings: SessionSettings::default(),
        provisioned: row.get(10)?,
        provisioning: false,
        deleted: false,
    })
}

/// Reads a TEXT column through `FromStr`.
fn parse<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Writes `<dir>/<id>.json`, replacing any previous file atomically.
pub(crate) async fn write_file(
    codec: &JsonCodec,
    dir: &Path,
    session: &Session,
) -> Result<PathBuf, SessionError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SessionError::Io { path, source }
    };
    let bytes = codec.encode(session)?;
    let path = dir.join(format!("{}.json", session.id));
    let tmp = dir.join(format!("{}.json.tmp", session.id));
    tokio::fs::write(&tmp, bytes).await.map_err(io_err(&tmp))?;
    tokio::fs::rename(&tmp, &path).await.map_err(io_err(&path))?;
    Ok(path)
}

/// Reads every `*.json` file in `dir`. Files that fail to decode are
/// skipped with a warning.
pub(crate) async fn read_files(codec: &JsonCodec, dir: &Path) -> Result<Vec<Session>, SessionError> {
    let io_err = |source: std::io::Error| SessionError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut read = tokio::fs::read_dir(dir).await.map_err(io_err)?;

    let mut sessions = Vec::new();
    while let Some(entry) = read.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let decoded = tokio::fs::read(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|bytes| codec.decode::<Session>(&bytes).map_err(|e| e.to_string()));
        match decoded {
            Ok(session) => sessions.push(session),
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "skipping unreadable session file");
            }
        }
    }
    sessions.sort_by_key(|s| s.created_at);
    Ok(sessions)
}
