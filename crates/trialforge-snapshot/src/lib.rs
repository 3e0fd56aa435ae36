//! Player state snapshots for Trialforge.
//!
//! When a session member disconnects, their inventory, position, vitals,
//! effects and game mode are written to the store. When they reconnect
//! into the same session the snapshot is applied and deleted, so each
//! snapshot is used at most once.
//!
//! # Key types
//!
//! - [`SnapshotStore`]: save / restore / clear against the durable store
//! - [`RestorablePlayer`]: the host's live player handle
//! - [`PlayerState`]: what a snapshot holds

mod error;
mod player;
mod state;
mod store;

pub use error::SnapshotError;
#[cfg(any(test, feature = "testing"))]
pub use player::MemoryPlayer;
pub use player::RestorablePlayer;
pub use state::{GameMode, Inventory, ItemStack, Location, PlayerState, Slots, StatusEffect, Vitals};
pub use store::SnapshotStore;
