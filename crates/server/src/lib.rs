#![warn(missing_docs)]
//! Authoritative simulation host: players, ambient block rules and the tick driver.

mod ambient;
pub mod config;
pub mod player;
pub mod simulation;

pub use ambient::{FOOTSTEP_RECOVERY_CHANCE, MUD_GRASS_CHANCE, SPAWN_CLEARANCE};
pub use config::SimulationConfig;
pub use player::{Player, PLAYER_INVENTORY_SIZE};
pub use simulation::{SharedSimulation, Simulation, TickSummary};
