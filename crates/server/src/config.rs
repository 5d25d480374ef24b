//! Simulation tuning knobs.

use serde::{Deserialize, Serialize};
use voxsim_world::MobLevel;

/// Settings for one [`Simulation`](crate::Simulation) instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for every random decision the simulation makes.
    pub world_seed: u64,
    /// Cubic radius, in blocks, kept active around each player.
    pub active_block_range: i32,
    /// Mobs above this level are removed.
    pub max_mob_level: MobLevel,
    /// Resident blocks kept in memory before eviction to the archive.
    pub block_cache_capacity: usize,
    /// Queued block loads completed per tick.
    pub block_loads_per_tick: usize,
    /// Radius, in nodes, within which clients are told about entities.
    pub client_view_radius: f32,
    /// Game seconds per real second.
    pub time_speed: f32,
    /// Surface height of the flat terrain source.
    pub ground_level: i32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            world_seed: 0,
            active_block_range: 2,
            max_mob_level: MobLevel::Destructive,
            block_cache_capacity: 4096,
            block_loads_per_tick: 16,
            client_view_radius: 48.0,
            time_speed: 72.0,
            ground_level: 0,
        }
    }
}
