//! Identity types shared by every layer.
//!
//! Both ids are newtype wrappers around a [`Uuid`]: a `SessionId` can't be
//! passed where a `PlayerId` is expected even though both are UUIDs
//! underneath. They serialize as the bare hyphenated UUID string
//! (`#[serde(transparent)]`) and `Display` the same way, so the value in a
//! log line, a store row, and a snapshot file is always identical.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// PlayerId
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Player ids are assigned by the connection-handling collaborator (the
/// account UUID); Trialforge never invents them outside tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Generates a random player id. Mostly useful in tests and tools.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PlayerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ProtocolError::InvalidId {
            kind: "player",
            value: s.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A unique identifier for a session (one isolated challenge).
///
/// Session ids are random v4 UUIDs, so collisions are practically
/// impossible; the registry still checks for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The compact (no hyphens) form, used inside world folder names.
    pub fn simple(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| ProtocolError::InvalidId {
            kind: "session",
            value: s.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_id_display_parses_back() {
        let id = PlayerId::random();
        let parsed: PlayerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_session_id_parse_invalid_returns_error() {
        let result = "not-a-uuid".parse::<SessionId>();
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidId { kind: "session", .. })
        ));
    }

    #[test]
    fn test_session_id_simple_has_no_hyphens() {
        let id = SessionId::random();
        assert_eq!(id.simple().len(), 32);
        assert!(!id.simple().contains('-'));
    }

    #[test]
    fn test_random_session_ids_differ() {
        assert_ne!(SessionId::random(), SessionId::random());
    }
}
