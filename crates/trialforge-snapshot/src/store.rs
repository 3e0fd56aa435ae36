//! The snapshot store: one row per (player, session).
//!
//! Snapshots are written when a member disconnects and consumed exactly
//! once when they come back. Item groups (inventory, ender chest, effects)
//! are stored as JSON text; scalar groups get their own columns.
//!
//! Restore is all-or-nothing from the player's point of view: every group
//! is decoded before any setter is called. A row that fails to decode is
//! reported as [`SnapshotError::Corrupt`] and left in the store so it can
//! be inspected or repaired by hand.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use trialforge_protocol::{Codec, JsonCodec, PlayerId, SessionId};
use trialforge_store::rusqlite::{self, Row, params};
use trialforge_store::{Store, conversion_error};

use crate::{
    GameMode, Inventory, Location, PlayerState, RestorablePlayer, Slots, SnapshotError,
    StatusEffect, Vitals,
};

/// A row as stored, item groups still encoded.
struct SnapshotRow {
    inventory: String,
    ender_chest: String,
    location: Location,
    vitals: Vitals,
    effects: String,
    game_mode: String,
}

impl SnapshotRow {
    const COLUMNS: &'static str = "inventory, ender_chest, world, x, y, z, yaw, pitch, \
         health, food, saturation, xp_level, xp_progress, effects, game_mode";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            inventory: row.get(0)?,
            ender_chest: row.get(1)?,
            location: Location {
                world: row.get(2)?,
                x: row.get(3)?,
                y: row.get(4)?,
                z: row.get(5)?,
                yaw: row.get(6)?,
                pitch: row.get(7)?,
            },
            vitals: Vitals {
                health: row.get(8)?,
                food: row.get(9)?,
                saturation: row.get(10)?,
                xp_level: row.get(11)?,
                xp_progress: row.get(12)?,
            },
            effects: row.get(13)?,
            game_mode: row.get(14)?,
        })
    }

    /// Decodes every group, naming the first one that fails.
    fn decode(self, codec: &JsonCodec) -> Result<PlayerState, (&'static str, String)> {
        let inventory: Inventory = codec
            .decode_text(&self.inventory)
            .map_err(|e| ("inventory", e.to_string()))?;
        let ender_chest: Slots = codec
            .decode_text(&self.ender_chest)
            .map_err(|e| ("ender_chest", e.to_string()))?;
        let effects: Vec<StatusEffect> = codec
            .decode_text(&self.effects)
            .map_err(|e| ("effects", e.to_string()))?;
        let game_mode: GameMode = self
            .game_mode
            .parse()
            .map_err(|e: trialforge_protocol::ProtocolError| ("game_mode", e.to_string()))?;
        if !self.vitals.health.is_finite() || self.vitals.health < 0.0 {
            return Err(("vitals", format!("health {} out of range", self.vitals.health)));
        }
        if self.location.world.is_empty() {
            return Err(("location", "empty world name".to_string()));
        }

        Ok(PlayerState {
            inventory,
            ender_chest,
            location: self.location,
            vitals: self.vitals,
            effects,
            game_mode,
        })
    }
}

/// Saves and restores player snapshots.
pub struct SnapshotStore {
    store: Arc<Store>,
    codec: JsonCodec,
}

impl SnapshotStore {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            codec: JsonCodec,
        }
    }

    /// Captures `player` and upserts the snapshot for `session_id`.
    ///
    /// The session row must exist; snapshots cascade with their session.
    pub fn save<P>(&self, player: &P, session_id: &SessionId) -> Result<(), SnapshotError>
    where
        P: RestorablePlayer + ?Sized,
    {
        let player_id = player.id();
        let state = player.capture();
        let encode_err = |group| {
            move |source| SnapshotError::Encode {
                player: player_id,
                group,
                source,
            }
        };
        let inventory = self
            .codec
            .encode_text(&state.inventory)
            .map_err(encode_err("inventory"))?;
        let ender_chest = self
            .codec
            .encode_text(&state.ender_chest)
            .map_err(encode_err("ender_chest"))?;
        let effects = self
            .codec
            .encode_text(&state.effects)
            .map_err(encode_err("effects"))?;
        let Location {
            world,
            x,
            y,
            z,
            yaw,
            pitch,
        } = &state.location;
        let vitals = &state.vitals;

        self.store.execute(
            "INSERT OR REPLACE INTO player_snapshots (
                player_id, session_id, inventory, ender_chest, world, x, y, z, yaw, pitch,
                health, food, saturation, xp_level, xp_progress, effects, game_mode, saved_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                player_id.to_string(),
                session_id.to_string(),
                inventory,
                ender_chest,
                world,
                x,
                y,
                z,
                yaw,
                pitch,
                vitals.health,
                vitals.food,
                vitals.saturation,
                vitals.xp_level,
                vitals.xp_progress,
                effects,
                state.game_mode.as_str(),
                Utc::now(),
            ],
        )?;

        tracing::info!(%player_id, %session_id, world = %world, "player snapshot saved");
        Ok(())
    }

    /// Applies the stored snapshot to `player` and deletes it.
    ///
    /// Returns `Ok(false)` when there is nothing to restore.
    pub fn restore<P>(&self, player: &mut P, session_id: &SessionId) -> Result<bool, SnapshotError>
    where
        P: RestorablePlayer + ?Sized,
    {
        let player_id = player.id();
        let sql = format!(
            "SELECT {} FROM player_snapshots WHERE player_id = ?1 AND session_id = ?2",
            SnapshotRow::COLUMNS
        );
        let Some(row) = self.store.query_row(
            &sql,
            params![player_id.to_string(), session_id.to_string()],
            SnapshotRow::from_row,
        )?
        else {
            tracing::debug!(%player_id, %session_id, "no snapshot to restore");
            return Ok(false);
        };

        let state = row.decode(&self.codec).map_err(|(group, reason)| {
            tracing::error!(%player_id, %session_id, group, %reason, "snapshot corrupt, kept for inspection");
            SnapshotError::Corrupt {
                player: player_id,
                session: *session_id,
                group,
                reason,
            }
        })?;

        let PlayerState {
            inventory,
            ender_chest,
            location,
            vitals,
            effects,
            game_mode,
        } = state;
        player.set_game_mode(game_mode);
        player.teleport(&location);
        player.set_inventory(inventory, ender_chest);
        player.set_vitals(vitals);
        player.set_effects(effects);

        self.clear(&player_id, session_id)?;
        tracing::info!(%player_id, %session_id, "player snapshot restored");
        Ok(true)
    }

    pub fn has_data(&self, player_id: &PlayerId, session_id: &SessionId) -> Result<bool, SnapshotError> {
        Ok(self.store.exists(
            "SELECT 1 FROM player_snapshots WHERE player_id = ?1 AND session_id = ?2",
            params![player_id.to_string(), session_id.to_string()],
        )?)
    }

    /// When the snapshot was taken, if there is one.
    pub fn saved_at(
        &self,
        player_id: &PlayerId,
        session_id: &SessionId,
    ) -> Result<Option<DateTime<Utc>>, SnapshotError> {
        Ok(self.store.query_row(
            "SELECT saved_at FROM player_snapshots WHERE player_id = ?1 AND session_id = ?2",
            params![player_id.to_string(), session_id.to_string()],
            |row| row.get(0),
        )?)
    }

    pub fn clear(&self, player_id: &PlayerId, session_id: &SessionId) -> Result<(), SnapshotError> {
        self.store.execute(
            "DELETE FROM player_snapshots WHERE player_id = ?1 AND session_id = ?2",
            params![player_id.to_string(), session_id.to_string()],
        )?;
        Ok(())
    }

    /// Deletes every snapshot of one player.
    pub fn clear_player(&self, player_id: &PlayerId) -> Result<usize, SnapshotError> {
        let removed = self.store.execute(
            "DELETE FROM player_snapshots WHERE player_id = ?1",
            [player_id.to_string()],
        )?;
        if removed > 0 {
            tracing::debug!(%player_id, removed, "player snapshots cleared");
        }
        Ok(removed)
    }

    /// Deletes every snapshot taken in one session.
    pub fn clear_session(&self, session_id: &SessionId) -> Result<usize, SnapshotError> {
        let removed = self.store.execute(
            "DELETE FROM player_snapshots WHERE session_id = ?1",
            [session_id.to_string()],
        )?;
        if removed > 0 {
            tracing::debug!(%session_id, removed, "session snapshots cleared");
        }
        Ok(removed)
    }

    /// The session of the player's most recent snapshot.
    pub fn latest_session_for(&self, player_id: &PlayerId) -> Result<Option<SessionId>, SnapshotError> {
        Ok(self.store.query_row(
            "SELECT session_id FROM player_snapshots WHERE player_id = ?1
             ORDER BY saved_at DESC LIMIT 1",
            [player_id.to_string()],
            |row| {
                let raw: String = row.get(0)?;
                raw.parse::<SessionId>().map_err(|e| conversion_error(0, e))
            },
        )?)
    }
}
