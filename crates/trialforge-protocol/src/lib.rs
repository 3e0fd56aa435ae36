//! Shared vocabulary for Trialforge.
//!
//! Every other crate in the workspace speaks in terms of these types:
//!
//! - **Identity** ([`PlayerId`], [`SessionId`]): opaque UUID newtypes.
//! - **Worlds** ([`WorldNames`], [`WorldKind`], [`WorldRules`],
//!   [`Difficulty`]): how the three worlds of a session or pool entry are
//!   named and configured.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into bytes for file snapshots and snapshot blobs.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Store / Pool / Snapshot / Session  →  Protocol (ids, names, codec)
//! ```

mod codec;
mod error;
mod types;
mod world;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{PlayerId, SessionId};
pub use world::{Difficulty, SESSION_WORLD_PREFIX, WorldKind, WorldNames, WorldRules};
