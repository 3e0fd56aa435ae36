//! Session registry for Trialforge.
//!
//! A session is one group challenge run: an id, a dedicated world set, a
//! member list, a pausable timer and a handful of settings. The
//! [`SessionRegistry`] owns every session and keeps the player → session
//! index consistent with each session's member list.
//!
//! # Lifecycle
//!
//! ```text
//! create ──→ (settings) ──→ finalize ──→ join / leave / pause / resume ──→ complete | fail
//! ```
//!
//! `finalize` provisions the worlds, from the resource pool when it can.
//! Players can only join once a session is provisioned, and settings are
//! frozen from that point on.

mod clock;
mod config;
mod error;
mod persist;
mod registry;
mod session;
mod settings;

#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use clock::{Clock, SystemClock};
pub use config::RegistryConfig;
pub use error::SessionError;
pub use registry::SessionRegistry;
pub use session::{JoinMode, JoinOutcome, SessionInfo, SessionStatus};
pub use settings::{
    BORDER_SIZES, SessionSettings, SettingDef, SettingId, SettingKind, SettingValue, StarterKit,
    catalogue,
};
