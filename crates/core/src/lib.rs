#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod item;
pub mod pos;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use item::{
    tool_features, Inventory, InventoryItem, ItemParseError, PlayerInventory, ToolFeatures,
    ToolType,
};
pub use pos::{
    block_origin, float_to_node, node_center, node_to_block, BlockPos, BLOCK_SIZE,
    MAP_BLOCK_LIMIT,
};

/// Monotonic counter of scheduler ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any deterministic timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

/// Helper to derive a reproducible RNG seeded by world + block + tick domains.
pub fn scoped_rng(world_seed: u64, block_hash: u64, tick: SimTick) -> StdRng {
    let seed = world_seed ^ block_hash ^ tick.0;
    StdRng::seed_from_u64(seed)
}

/// Fixed-interval gate driven by accumulated frame time.
///
/// Each subsystem owns one of these so that a slow tick delays every subsystem
/// by the same amount of simulated time instead of letting them drift apart.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalLimiter {
    accumulator: f32,
}

impl IntervalLimiter {
    /// Create a limiter with an empty accumulator.
    pub const fn new() -> Self {
        Self { accumulator: 0.0 }
    }

    /// Accumulate `dtime`; returns true (and consumes one `interval`) once due.
    pub fn step(&mut self, dtime: f32, interval: f32) -> bool {
        self.accumulator += dtime;
        if self.accumulator < interval {
            return false;
        }
        self.accumulator -= interval;
        true
    }

    /// Time accumulated toward the next firing.
    pub fn accumulated(&self) -> f32 {
        self.accumulator
    }
}
