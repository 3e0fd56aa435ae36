//! Error types for the session layer.

use std::path::PathBuf;

use trialforge_pool::PoolError;
use trialforge_protocol::{PlayerId, ProtocolError, SessionId};
use trialforge_store::StoreError;

use crate::{SessionStatus, SettingId};

/// Errors that can occur during session operations.
///
/// Every variant maps to a stable localization key via
/// [`SessionError::message_key`], which is what players get to see.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// A freshly generated id already exists.
    #[error("session id {0} already exists")]
    IdCollision(SessionId),

    /// The operation needs an Active session.
    #[error("cannot {action} session {id}: it is {status}")]
    NotActive {
        id: SessionId,
        status: SessionStatus,
        action: &'static str,
    },

    #[error("player {0} is already a member of session {1}")]
    AlreadyMember(PlayerId, SessionId),

    /// The session's worlds don't exist yet.
    #[error("session {0} has not been provisioned")]
    NotProvisioned(SessionId),

    #[error("player {0} is not in a session")]
    NotInSession(PlayerId),

    /// `finalize` was already called (or is running) for this session.
    #[error("session {0} is already provisioned or provisioning")]
    AlreadyFinalized(SessionId),

    /// Settings only change before the worlds are provisioned.
    #[error("settings of session {0} are locked")]
    SettingsLocked(SessionId),

    #[error("invalid value {value} for setting {setting}")]
    InvalidSetting { setting: SettingId, value: String },

    /// Neither a pool claim nor on-demand creation produced worlds. The
    /// session is left unprovisioned; the caller should delete it.
    #[error("provisioning session {id} failed: {source}")]
    ProvisioningFailed {
        id: SessionId,
        #[source]
        source: PoolError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] ProtocolError),
}

impl SessionError {
    /// Stable key for the player-facing message.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "session.not_found",
            Self::IdCollision(_) => "session.create.id_collision",
            Self::NotActive { action, .. } => match *action {
                "join" => "session.join.not_active",
                "pause" | "resume" => "session.pause.not_active",
                "settings" => "session.settings.not_active",
                "finalize" => "session.finalize.not_active",
                _ => "session.not_active",
            },
            Self::AlreadyMember(..) => "session.join.already_member",
            Self::NotProvisioned(_) => "session.join.not_ready",
            Self::NotInSession(_) => "session.leave.not_in_session",
            Self::AlreadyFinalized(_) => "session.finalize.already_done",
            Self::SettingsLocked(_) => "session.settings.locked",
            Self::InvalidSetting { .. } => "session.settings.invalid",
            Self::ProvisioningFailed { .. } => "session.finalize.failed",
            Self::Store(_) | Self::Io { .. } | Self::Codec(_) => "session.storage_error",
        }
    }
}
