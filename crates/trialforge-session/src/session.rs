//! Session types: the canonical record and the read-only views of it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use trialforge_protocol::{PlayerId, ProtocolError, SessionId, WorldNames};

use crate::SessionSettings;

// ---------------------------------------------------------------------------
// SessionStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// ```text
///           ┌──→ Completed
/// Active ───┤
///           └──→ Failed
/// ```
///
/// Both end states are final. Members, timers and settings are frozen
/// once a session leaves `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Active, Self::Completed) | (Self::Active, Self::Failed)
        )
    }

    /// Stable lowercase name used in store rows.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ProtocolError::UnknownVariant {
                kind: "session status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The canonical session record. Owned by the registry, always behind the
/// session's mutex; everyone else sees [`SessionInfo`] copies.
///
/// Serialized as-is for file snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Session {
    pub id: SessionId,
    pub name: String,
    pub world_name: String,
    pub status: SessionStatus,
    pub owner: PlayerId,
    /// Current members while Active; the final roster afterwards.
    pub members: BTreeMap<PlayerId, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_paused_ms: i64,
    #[serde(default)]
    pub settings: SessionSettings,
    #[serde(default)]
    pub provisioned: bool,
    /// Set while `finalize` is provisioning worlds.
    #[serde(skip)]
    pub provisioning: bool,
    /// Set by `delete` so an in-flight `finalize` knows not to write back.
    #[serde(skip)]
    pub deleted: bool,
}

impl Session {
    pub fn new(id: SessionId, name: String, owner: PlayerId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            world_name: WorldNames::for_session(&id).primary().to_string(),
            status: SessionStatus::Active,
            owner,
            members: BTreeMap::new(),
            created_at: now,
            started_at: None,
            paused_at: None,
            completed_at: None,
            total_paused_ms: 0,
            settings: SessionSettings::default(),
            provisioned: false,
            provisioning: false,
            deleted: false,
        }
    }

    pub fn world(&self) -> WorldNames {
        WorldNames::new(self.world_name.as_str())
    }

    /// Adds a member. The first addition starts the timer.
    pub fn add_member(&mut self, player: PlayerId, now: DateTime<Utc>) {
        self.members.insert(player, now);
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    /// Starts a pause. Returns `false` if already paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// Ends the current pause, folding it into the paused total. Returns
    /// `false` if not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        let Some(paused_at) = self.paused_at.take() else {
            return false;
        };
        // Time paused before the timer started doesn't count.
        if let Some(started_at) = self.started_at {
            let from = paused_at.max(started_at);
            self.total_paused_ms += (now - from).num_milliseconds().max(0);
        }
        true
    }

    /// Moves to a final status, closing any open pause.
    pub fn finish(&mut self, status: SessionStatus, now: DateTime<Utc>) {
        self.resume(now);
        self.status = status;
        self.completed_at = Some(now);
    }

    /// Time spent running: from start to now (or completion), minus pauses.
    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        let Some(started_at) = self.started_at else {
            return TimeDelta::zero();
        };
        let end = match (self.completed_at, self.paused_at) {
            (Some(completed_at), _) => completed_at,
            (None, Some(paused_at)) => paused_at.max(started_at),
            (None, None) => now,
        };
        let running = end - started_at - TimeDelta::milliseconds(self.total_paused_ms);
        running.max(TimeDelta::zero())
    }

    pub fn info(&self, now: DateTime<Utc>) -> SessionInfo {
        SessionInfo {
            id: self.id,
            name: self.name.clone(),
            world: self.world(),
            status: self.status,
            owner: self.owner,
            members: self.members.keys().copied().collect(),
            created_at: self.created_at,
            started_at: self.started_at,
            paused_at: self.paused_at,
            completed_at: self.completed_at,
            total_paused: TimeDelta::milliseconds(self.total_paused_ms),
            elapsed: self.elapsed(now),
            settings: self.settings.clone(),
            provisioned: self.provisioned,
        }
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A read-only copy of a session, taken at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub name: String,
    pub world: WorldNames,
    pub status: SessionStatus,
    pub owner: PlayerId,
    /// Sorted by player id.
    pub members: Vec<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_paused: TimeDelta,
    /// Running time when the copy was taken.
    pub elapsed: TimeDelta,
    pub settings: SessionSettings,
    pub provisioned: bool,
}

impl SessionInfo {
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn is_member(&self, player: &PlayerId) -> bool {
        self.members.binary_search(player).is_ok()
    }

    /// Elapsed time as `HH:MM:SS`. Hours grow past 99 if needed.
    pub fn formatted_duration(&self) -> String {
        let secs = self.elapsed.num_seconds().max(0);
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// How a player enters a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// A fresh entry: the player is placed at the start.
    Normal,
    /// Coming back from a snapshot: the snapshot decides where they stand.
    Restore,
}

/// What the caller should do after a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub session_id: SessionId,
    /// The session the player was moved out of, if any.
    pub previous: Option<SessionId>,
    /// Reset vitals and teleport to `spawn_world`'s spawn.
    pub place_at_start: bool,
    pub spawn_world: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::default() + TimeDelta::seconds(secs)
    }

    fn session() -> Session {
        Session::new(SessionId::random(), "Alpha".into(), PlayerId::random(), t(0))
    }

    #[test]
    fn test_new_derives_world_name_from_id() {
        let s = session();
        assert_eq!(s.world_name, format!("session_{}", s.id.simple()));
        assert_eq!(s.status, SessionStatus::Active);
        assert!(s.members.is_empty());
    }

    #[test]
    fn test_add_member_sets_started_at_once() {
        let mut s = session();
        s.add_member(PlayerId::random(), t(10));
        s.add_member(PlayerId::random(), t(20));
        assert_eq!(s.started_at, Some(t(10)));
    }

    #[test]
    fn test_elapsed_not_started_is_zero() {
        assert_eq!(session().elapsed(t(100)), TimeDelta::zero());
    }

    #[test]
    fn test_elapsed_excludes_pauses() {
        let mut s = session();
        s.add_member(PlayerId::random(), t(0));
        s.pause(t(60));
        assert_eq!(s.elapsed(t(90)), TimeDelta::seconds(60), "frozen while paused");
        s.resume(t(120));
        assert_eq!(s.elapsed(t(150)), TimeDelta::seconds(90));
    }

    #[test]
    fn test_pause_twice_counts_once() {
        let mut s = session();
        s.add_member(PlayerId::random(), t(0));
        assert!(s.pause(t(10)));
        assert!(!s.pause(t(20)));
        assert!(s.resume(t(30)));
        assert!(!s.resume(t(40)));
        assert_eq!(s.total_paused_ms, 20_000);
    }

    #[test]
    fn test_pause_before_start_is_not_counted() {
        let mut s = session();
        s.pause(t(0));
        s.add_member(PlayerId::random(), t(50));
        s.resume(t(60));
        assert_eq!(s.total_paused_ms, 10_000);
        assert_eq!(s.elapsed(t(100)), TimeDelta::seconds(40));
    }

    #[test]
    fn test_finish_closes_pause_and_freezes_elapsed() {
        let mut s = session();
        s.add_member(PlayerId::random(), t(0));
        s.pause(t(100));
        s.finish(SessionStatus::Completed, t(130));
        assert!(s.paused_at.is_none());
        assert_eq!(s.completed_at, Some(t(130)));
        assert_eq!(s.elapsed(t(1000)), TimeDelta::seconds(100));
    }

    #[test]
    fn test_formatted_duration_pads_fields() {
        let mut s = session();
        s.add_member(PlayerId::random(), t(0));
        let info = s.info(t(3600 + 2 * 60 + 5));
        assert_eq!(info.formatted_duration(), "01:02:05");
    }

    #[test]
    fn test_status_transitions_are_one_way() {
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Failed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Active));
        assert!(!SessionStatus::Failed.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn test_status_from_str_round_trips() {
        for s in [SessionStatus::Active, SessionStatus::Completed, SessionStatus::Failed] {
            assert_eq!(s.as_str().parse::<SessionStatus>().unwrap(), s);
        }
    }
}
