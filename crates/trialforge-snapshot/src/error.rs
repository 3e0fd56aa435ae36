//! Error types for the snapshot layer.

use trialforge_protocol::{PlayerId, ProtocolError, SessionId};
use trialforge_store::StoreError;

/// Errors that can occur while saving or restoring player snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot row could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Captured state could not be encoded for storage.
    #[error("cannot encode {group} for player {player}: {source}")]
    Encode {
        player: PlayerId,
        group: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// A stored group could not be decoded. Nothing was applied to the
    /// player and the row was left in place.
    #[error("snapshot of player {player} in session {session} is corrupt ({group}): {reason}")]
    Corrupt {
        player: PlayerId,
        session: SessionId,
        group: &'static str,
        reason: String,
    },
}
