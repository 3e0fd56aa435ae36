//! World naming and world-level rules.
//!
//! A session (and a parked pool entry) always owns exactly three worlds:
//! the primary world plus two secondary worlds generated from the same
//! seed. Their folder names follow one suffix convention:
//!
//! ```text
//! <base>              primary
//! <base>_secondaryA   secondary A
//! <base>_secondaryB   secondary B
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, SessionId};

/// Prefix for the primary world of a session.
pub const SESSION_WORLD_PREFIX: &str = "session_";

// ---------------------------------------------------------------------------
// WorldKind
// ---------------------------------------------------------------------------

/// Which of the three related worlds a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldKind {
    Primary,
    SecondaryA,
    SecondaryB,
}

impl WorldKind {
    /// All three kinds, in creation order.
    pub const ALL: [WorldKind; 3] = [Self::Primary, Self::SecondaryA, Self::SecondaryB];

    /// Folder-name suffix appended to the base name.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Primary => "",
            Self::SecondaryA => "_secondaryA",
            Self::SecondaryB => "_secondaryB",
        }
    }
}

impl fmt::Display for WorldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::SecondaryA => write!(f, "secondaryA"),
            Self::SecondaryB => write!(f, "secondaryB"),
        }
    }
}

// ---------------------------------------------------------------------------
// WorldNames
// ---------------------------------------------------------------------------

/// The three folder names that belong together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldNames {
    base: String,
}

impl WorldNames {
    /// Names derived from an arbitrary base (a pool entry name).
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Deterministic names for a session: `session_<uuid-simple>`.
    pub fn for_session(id: &SessionId) -> Self {
        Self::new(format!("{SESSION_WORLD_PREFIX}{}", id.simple()))
    }

    /// The primary world name (also the base).
    pub fn primary(&self) -> &str {
        &self.base
    }

    /// The folder name for one of the three worlds.
    pub fn name(&self, kind: WorldKind) -> String {
        format!("{}{}", self.base, kind.suffix())
    }

    /// `(kind, name)` for all three worlds, primary first.
    pub fn all(&self) -> [(WorldKind, String); 3] {
        WorldKind::ALL.map(|kind| (kind, self.name(kind)))
    }
}

impl fmt::Display for WorldNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)
    }
}

// ---------------------------------------------------------------------------
// Difficulty
// ---------------------------------------------------------------------------

/// World difficulty, cycled in the settings menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Peaceful,
    Easy,
    #[default]
    Normal,
    Hard,
}

impl Difficulty {
    /// Every difficulty, in cycle order.
    pub const ALL: [Difficulty; 4] = [Self::Peaceful, Self::Easy, Self::Normal, Self::Hard];

    /// The next difficulty in the cycle, wrapping from `Hard` to `Peaceful`.
    pub fn next(self) -> Self {
        match self {
            Self::Peaceful => Self::Easy,
            Self::Easy => Self::Normal,
            Self::Normal => Self::Hard,
            Self::Hard => Self::Peaceful,
        }
    }

    /// Stable lowercase name used in store rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Peaceful => "peaceful",
            Self::Easy => "easy",
            Self::Normal => "normal",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownVariant {
                kind: "difficulty",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// WorldRules
// ---------------------------------------------------------------------------

/// World-level configuration applied to all three worlds of a set.
///
/// Derived from session settings at finalize time; pool entries are
/// prepared with [`WorldRules::default`] and re-configured on claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldRules {
    pub difficulty: Difficulty,
    /// Whether health regenerates naturally.
    pub natural_regeneration: bool,
    pub keep_inventory: bool,
    /// World border diameter in blocks. 0 means no border.
    pub border_size: u32,
}

impl Default for WorldRules {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Normal,
            natural_regeneration: true,
            keep_inventory: false,
            border_size: 0,
        }
    }
}
