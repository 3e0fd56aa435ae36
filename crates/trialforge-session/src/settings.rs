//! Per-session settings and the catalogue that drives the settings menu.
//!
//! Every setting is either a toggle or a cycle through a fixed list of
//! options. The menu layer renders [`catalogue`] and calls
//! [`SessionSettings::advance`] when a player clicks an entry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use trialforge_protocol::{Difficulty, ProtocolError, WorldRules};

use crate::SessionError;

// ---------------------------------------------------------------------------
// StarterKit
// ---------------------------------------------------------------------------

/// Items handed to every member at the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StarterKit {
    #[default]
    None,
    Basic,
    Iron,
    Diamond,
}

impl StarterKit {
    pub const ALL: [StarterKit; 4] = [Self::None, Self::Basic, Self::Iron, Self::Diamond];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Iron => "iron",
            Self::Diamond => "diamond",
        }
    }
}

impl fmt::Display for StarterKit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StarterKit {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownVariant {
                kind: "starter kit",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Setting ids and values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingId {
    KeepInventory,
    NaturalRegeneration,
    UltraHardcore,
    SharedHealth,
    StarterKit,
    BorderSize,
    Difficulty,
}

impl fmt::Display for SettingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The value of one setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingValue {
    Toggle(bool),
    Kit(StarterKit),
    /// World border diameter in blocks; 0 means no border.
    Border(u32),
    Difficulty(Difficulty),
}

/// How a setting's value moves when it is advanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingKind {
    Toggle { default: bool },
    Cycle {
        default: SettingValue,
        options: Vec<SettingValue>,
    },
}

impl SettingKind {
    /// The value after one click. Cycles wrap; an unknown current value
    /// resets to the default.
    pub fn advance(&self, current: SettingValue) -> SettingValue {
        match self {
            Self::Toggle { default } => match current {
                SettingValue::Toggle(on) => SettingValue::Toggle(!on),
                _ => SettingValue::Toggle(*default),
            },
            Self::Cycle { default, options } => options
                .iter()
                .position(|o| *o == current)
                .map(|i| options[(i + 1) % options.len()])
                .unwrap_or(*default),
        }
    }

    pub fn default_value(&self) -> SettingValue {
        match self {
            Self::Toggle { default } => SettingValue::Toggle(*default),
            Self::Cycle { default, .. } => *default,
        }
    }

    /// Returns `true` if `value` is one this setting can hold.
    pub fn accepts(&self, value: SettingValue) -> bool {
        match self {
            Self::Toggle { .. } => matches!(value, SettingValue::Toggle(_)),
            Self::Cycle { options, .. } => options.contains(&value),
        }
    }
}

/// One entry of the settings menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingDef {
    pub id: SettingId,
    /// Localization key for the entry's label.
    pub label_key: &'static str,
    pub kind: SettingKind,
}

/// Border diameters offered in the menu.
pub const BORDER_SIZES: [u32; 5] = [0, 250, 500, 1000, 2500];

/// Every setting, in menu order.
pub fn catalogue() -> Vec<SettingDef> {
    vec![
        SettingDef {
            id: SettingId::KeepInventory,
            label_key: "settings.keep_inventory",
            kind: SettingKind::Toggle { default: false },
        },
        SettingDef {
            id: SettingId::NaturalRegeneration,
            label_key: "settings.natural_regeneration",
            kind: SettingKind::Toggle { default: true },
        },
        SettingDef {
            id: SettingId::UltraHardcore,
            label_key: "settings.ultra_hardcore",
            kind: SettingKind::Toggle { default: false },
        },
        SettingDef {
            id: SettingId::SharedHealth,
            label_key: "settings.shared_health",
            kind: SettingKind::Toggle { default: false },
        },
        SettingDef {
            id: SettingId::StarterKit,
            label_key: "settings.starter_kit",
            kind: SettingKind::Cycle {
                default: SettingValue::Kit(StarterKit::None),
                options: StarterKit::ALL.map(SettingValue::Kit).to_vec(),
            },
        },
        SettingDef {
            id: SettingId::BorderSize,
            label_key: "settings.border_size",
            kind: SettingKind::Cycle {
                default: SettingValue::Border(0),
                options: BORDER_SIZES.map(SettingValue::Border).to_vec(),
            },
        },
        SettingDef {
            id: SettingId::Difficulty,
            label_key: "settings.difficulty",
            kind: SettingKind::Cycle {
                default: SettingValue::Difficulty(Difficulty::Normal),
                options: Difficulty::ALL.map(SettingValue::Difficulty).to_vec(),
            },
        },
    ]
}

fn definition(id: SettingId) -> Option<SettingDef> {
    catalogue().into_iter().find(|def| def.id == id)
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// The chosen settings of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub keep_inventory: bool,
    pub natural_regeneration: bool,
    /// No natural regeneration regardless of the regeneration toggle.
    pub ultra_hardcore: bool,
    pub shared_health: bool,
    pub starter_kit: StarterKit,
    pub border_size: u32,
    pub difficulty: Difficulty,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_inventory: false,
            natural_regeneration: true,
            ultra_hardcore: false,
            shared_health: false,
            starter_kit: StarterKit::None,
            border_size: 0,
            difficulty: Difficulty::Normal,
        }
    }
}

impl SessionSettings {
    /// The world-level part of the settings.
    pub fn world_rules(&self) -> WorldRules {
        WorldRules {
            difficulty: self.difficulty,
            natural_regeneration: self.natural_regeneration && !self.ultra_hardcore,
            keep_inventory: self.keep_inventory,
            border_size: self.border_size,
        }
    }

    pub fn get(&self, id: SettingId) -> SettingValue {
        match id {
            SettingId::KeepInventory => SettingValue::Toggle(self.keep_inventory),
            SettingId::NaturalRegeneration => SettingValue::Toggle(self.natural_regeneration),
            SettingId::UltraHardcore => SettingValue::Toggle(self.ultra_hardcore),
            SettingId::SharedHealth => SettingValue::Toggle(self.shared_health),
            SettingId::StarterKit => SettingValue::Kit(self.starter_kit),
            SettingId::BorderSize => SettingValue::Border(self.border_size),
            SettingId::Difficulty => SettingValue::Difficulty(self.difficulty),
        }
    }

    /// Sets one setting, rejecting values the catalogue doesn't offer.
    pub fn set(&mut self, id: SettingId, value: SettingValue) -> Result<(), SessionError> {
        let invalid = || SessionError::InvalidSetting {
            setting: id,
            value: format!("{value:?}"),
        };
        if !definition(id).is_some_and(|def| def.kind.accepts(value)) {
            return Err(invalid());
        }
        match (id, value) {
            (SettingId::KeepInventory, SettingValue::Toggle(on)) => self.keep_inventory = on,
            (SettingId::NaturalRegeneration, SettingValue::Toggle(on)) => {
                self.natural_regeneration = on
            }
            (SettingId::UltraHardcore, SettingValue::Toggle(on)) => self.ultra_hardcore = on,
            (SettingId::SharedHealth, SettingValue::Toggle(on)) => self.shared_health = on,
            (SettingId::StarterKit, SettingValue::Kit(kit)) => self.starter_kit = kit,
            (SettingId::BorderSize, SettingValue::Border(size)) => self.border_size = size,
            (SettingId::Difficulty, SettingValue::Difficulty(d)) => self.difficulty = d,
            _ => return Err(invalid()),
        }
        Ok(())
    }

    /// Advances one setting as a menu click would, returning the new value.
    pub fn advance(&mut self, id: SettingId) -> Result<SettingValue, SessionError> {
        let def = definition(id).ok_or(SessionError::InvalidSetting {
            setting: id,
            value: String::new(),
        })?;
        let next = def.kind.advance(self.get(id));
        self.set(id, next)?;
        Ok(next)
    }
}
