//! Connected players as the simulation sees them.

use std::collections::BTreeSet;

use glam::Vec3;
use voxsim_core::{float_to_node, node_to_block, BlockPos, PlayerInventory};
use voxsim_world::{EntityId, Observer};

/// Slots in a fresh player inventory.
pub const PLAYER_INVENTORY_SIZE: usize = 32;

/// A player: an observer with an inventory and a view of known entities.
#[derive(Debug, Clone)]
pub struct Player {
    /// Unique player name.
    pub name: String,
    /// Feet position; standing on node `n` puts `y` at `n + 0.5`.
    pub pos: Vec3,
    /// Carried items.
    pub inventory: PlayerInventory,
    known: BTreeSet<EntityId>,
}

impl Player {
    /// Player at `pos` with an empty inventory.
    pub fn new(name: impl Into<String>, pos: Vec3) -> Self {
        Self {
            name: name.into(),
            pos,
            inventory: PlayerInventory::new(PLAYER_INVENTORY_SIZE),
            known: BTreeSet::new(),
        }
    }

    /// Entities this player's client has been told about.
    pub fn known(&self) -> &BTreeSet<EntityId> {
        &self.known
    }

    pub(crate) fn known_mut(&mut self) -> &mut BTreeSet<EntityId> {
        &mut self.known
    }

    /// Block containing the player.
    pub fn block(&self) -> BlockPos {
        node_to_block(float_to_node(self.pos))
    }

    /// Node the player is standing on.
    pub fn ground_node(&self) -> glam::IVec3 {
        float_to_node(self.pos - Vec3::new(0.0, 0.25, 0.0))
    }

    /// Observer view handed to mob behavior.
    pub fn observer(&self) -> Observer {
        Observer::new(self.name.clone(), self.pos)
    }
}
