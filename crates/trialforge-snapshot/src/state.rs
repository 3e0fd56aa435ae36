//! The captured state of one player.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trialforge_protocol::ProtocolError;

/// One stack of items in a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Namespaced material key, e.g. `minecraft:diamond_sword`.
    pub material: String,
    pub amount: u8,
    /// Opaque engine-specific item data (enchantments, names, damage).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ItemStack {
    pub fn new(material: impl Into<String>, amount: u8) -> Self {
        Self {
            material: material.into(),
            amount,
            data: None,
        }
    }
}

/// Slot contents, `None` for empty slots. Slot positions are preserved.
pub type Slots = Vec<Option<ItemStack>>;

/// The main inventory plus equipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub contents: Slots,
    /// Boots, leggings, chestplate, helmet.
    pub armor: Slots,
    pub offhand: Option<ItemStack>,
}

/// A position in a named world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
}

impl Location {
    pub fn new(world: impl Into<String>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

/// Health, hunger and experience.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub health: f64,
    pub food: u32,
    pub saturation: f32,
    pub xp_level: u32,
    /// Progress towards the next level, `0.0..1.0`.
    pub xp_progress: f32,
}

impl Default for Vitals {
    /// Full health and hunger, no experience.
    fn default() -> Self {
        Self {
            health: 20.0,
            food: 20,
            saturation: 5.0,
            xp_level: 0,
            xp_progress: 0.0,
        }
    }
}

/// An active potion effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Namespaced effect key, e.g. `minecraft:speed`.
    pub kind: String,
    pub amplifier: u8,
    pub duration_ticks: u32,
    #[serde(default)]
    pub ambient: bool,
}

// ---------------------------------------------------------------------------
// GameMode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Survival,
    Creative,
    Adventure,
    Spectator,
}

impl GameMode {
    pub const ALL: [GameMode; 4] = [Self::Survival, Self::Creative, Self::Adventure, Self::Spectator];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Survival => "survival",
            Self::Creative => "creative",
            Self::Adventure => "adventure",
            Self::Spectator => "spectator",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownVariant {
                kind: "game mode",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// PlayerState
// ---------------------------------------------------------------------------

/// Everything a snapshot holds for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub inventory: Inventory,
    pub ender_chest: Slots,
    pub location: Location,
    pub vitals: Vitals,
    pub effects: Vec<StatusEffect>,
    pub game_mode: GameMode,
}

impl PlayerState {
    /// A player standing at `location` with nothing: empty inventories,
    /// default vitals, no effects, survival.
    pub fn empty_at(location: Location) -> Self {
        Self {
            inventory: Inventory::default(),
            ender_chest: Vec::new(),
            location,
            vitals: Vitals::default(),
            effects: Vec::new(),
            game_mode: GameMode::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_mode_from_str_round_trips_names() {
        for mode in GameMode::ALL {
            assert_eq!(mode.as_str().parse::<GameMode>().unwrap(), mode);
        }
        assert!("hardcore".parse::<GameMode>().is_err());
    }

    #[test]
    fn test_item_stack_without_data_omits_field() {
        let json = serde_json::to_string(&ItemStack::new("minecraft:stone", 64)).unwrap();
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_empty_at_has_full_vitals() {
        let state = PlayerState::empty_at(Location::new("world", 0.0, 64.0, 0.0));
        assert_eq!(state.vitals, Vitals::default());
        assert!(state.inventory.contents.is_empty());
        assert_eq!(state.game_mode, GameMode::Survival);
    }
}
