//! The boundary to the world engine.

use std::path::PathBuf;

use trialforge_protocol::{WorldKind, WorldRules};

use crate::WorldError;

/// Everything needed to generate one world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSpec {
    /// Folder name inside the world container.
    pub name: String,
    pub kind: WorldKind,
    /// Shared by all three worlds of a set.
    pub seed: i64,
}

/// The world engine, as seen by the pool.
///
/// Implemented by the embedding host. Every method except
/// [`world_container`](WorldProvider::world_container) is only ever called
/// from the [`MainContext`](crate::MainContext) thread, so implementations
/// may touch non-thread-safe engine state from them.
pub trait WorldProvider: Send + Sync + 'static {
    /// Directory holding live world folders. Read once when the pool
    /// starts; may be called from any thread.
    fn world_container(&self) -> PathBuf;

    /// Generates and loads a world at `<container>/<spec.name>`.
    fn create_world(&self, spec: &WorldSpec) -> Result<(), WorldError>;

    /// Whether the area around the world's spawn has finished generating.
    /// Polled until it returns `true`.
    fn surroundings_ready(&self, name: &str) -> bool;

    /// Applies difficulty, regeneration, inventory rule and border size.
    fn apply_rules(&self, name: &str, rules: &WorldRules) -> Result<(), WorldError>;

    /// Saves and unloads a loaded world, leaving its folder on disk.
    fn unload_world(&self, name: &str) -> Result<(), WorldError>;

    /// Loads an existing world folder from the container.
    fn load_world(&self, name: &str) -> Result<(), WorldError>;
}
