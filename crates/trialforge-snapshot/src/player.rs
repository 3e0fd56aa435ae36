//! The live-player boundary.

use trialforge_protocol::PlayerId;

use crate::{GameMode, Inventory, Location, PlayerState, Slots, StatusEffect, Vitals};

/// A connected player whose state can be captured and overwritten.
///
/// Implemented by the embedding host on top of its player handle. Setters
/// replace a whole group; [`set_effects`](Self::set_effects) clears
/// existing effects before adding the new ones.
pub trait RestorablePlayer {
    fn id(&self) -> PlayerId;

    /// Reads every snapshot group from the live player.
    fn capture(&self) -> PlayerState;

    fn set_inventory(&mut self, inventory: Inventory, ender_chest: Slots);

    fn teleport(&mut self, location: &Location);

    /// Teleports to the spawn point of `world`, which the host knows.
    fn teleport_to_spawn(&mut self, world: &str);

    fn set_vitals(&mut self, vitals: Vitals);

    fn set_effects(&mut self, effects: Vec<StatusEffect>);

    fn set_game_mode(&mut self, mode: GameMode);

    /// Puts a player at the start of a session: full vitals, no effects,
    /// standing on the primary world's spawn.
    fn place_at_start(&mut self, world: &str) {
        self.set_vitals(Vitals::default());
        self.set_effects(Vec::new());
        self.set_game_mode(GameMode::Survival);
        self.teleport_to_spawn(world);
    }
}

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryPlayer;

#[cfg(any(test, feature = "testing"))]
mod memory {
    use super::*;

    /// A player that is just a [`PlayerState`] in memory.
    #[derive(Debug, Clone, PartialEq)]
    pub struct MemoryPlayer {
        pub id: PlayerId,
        pub state: PlayerState,
        /// Number of teleports received, start placements included.
        pub teleports: usize,
    }

    impl MemoryPlayer {
        /// A fresh player standing at the origin of `world`.
        pub fn new(world: &str) -> Self {
            Self {
                id: PlayerId::random(),
                state: PlayerState::empty_at(Location::new(world, 0.0, 64.0, 0.0)),
                teleports: 0,
            }
        }
    }

    impl RestorablePlayer for MemoryPlayer {
        fn id(&self) -> PlayerId {
            self.id
        }

        fn capture(&self) -> PlayerState {
            self.state.clone()
        }

        fn set_inventory(&mut self, inventory: Inventory, ender_chest: Slots) {
            self.state.inventory = inventory;
            self.state.ender_chest = ender_chest;
        }

        fn teleport(&mut self, location: &Location) {
            self.state.location = location.clone();
            self.teleports += 1;
        }

        fn teleport_to_spawn(&mut self, world: &str) {
            self.teleport(&Location::new(world, 0.5, 64.0, 0.5));
        }

        fn set_vitals(&mut self, vitals: Vitals) {
            self.state.vitals = vitals;
        }

        fn set_effects(&mut self, effects: Vec<StatusEffect>) {
            self.state.effects = effects;
        }

        fn set_game_mode(&mut self, mode: GameMode) {
            self.state.game_mode = mode;
        }
    }
}
