//! Node and block coordinate math.
//!
//! World positions are measured in nodes: `1.0` is one node edge, and the
//! node at integer coordinate `n` spans `n - 0.5 .. n + 0.5`.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge length of a map block in nodes.
pub const BLOCK_SIZE: i32 = 16;

/// Largest block coordinate (per axis, absolute) that may exist.
pub const MAP_BLOCK_LIMIT: i32 = 31000 / BLOCK_SIZE;

/// Block coordinate in block space.
/// Implements Ord for deterministic iteration in BTreeMap/BTreeSet (sorts by x, y, then z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct BlockPos {
    /// X block coordinate.
    pub x: i32,
    /// Y block coordinate.
    pub y: i32,
    /// Z block coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Construct a block position.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset by a block delta.
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Whether this block lies inside the world edge.
    pub fn within_limit(self) -> bool {
        self.x.abs() <= MAP_BLOCK_LIMIT
            && self.y.abs() <= MAP_BLOCK_LIMIT
            && self.z.abs() <= MAP_BLOCK_LIMIT
    }

    /// Stable hash used to scope per-block random streams.
    pub fn hash64(self) -> u64 {
        let x = self.x as u64 & 0x1f_ffff;
        let y = self.y as u64 & 0x1f_ffff;
        let z = self.z as u64 & 0x1f_ffff;
        (x << 42) | (y << 21) | z
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Node containing a world position (round half away from zero).
pub fn float_to_node(pos: Vec3) -> IVec3 {
    pos.round().as_ivec3()
}

/// Centre of a node in world units.
pub fn node_center(node: IVec3) -> Vec3 {
    node.as_vec3()
}

/// Block containing a node.
pub fn node_to_block(node: IVec3) -> BlockPos {
    BlockPos::new(
        node.x.div_euclid(BLOCK_SIZE),
        node.y.div_euclid(BLOCK_SIZE),
        node.z.div_euclid(BLOCK_SIZE),
    )
}

/// First node (minimum corner) of a block.
pub fn block_origin(block: BlockPos) -> IVec3 {
    IVec3::new(block.x, block.y, block.z) * BLOCK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_nodes_map_to_negative_blocks() {
        assert_eq!(node_to_block(IVec3::new(-1, 0, 15)), BlockPos::new(-1, 0, 0));
        assert_eq!(node_to_block(IVec3::new(16, -16, -17)), BlockPos::new(1, -1, -2));
    }

    #[test]
    fn float_to_node_rounds_to_nearest() {
        assert_eq!(float_to_node(Vec3::new(0.49, -0.51, 2.5)), IVec3::new(0, -1, 3));
    }

    #[test]
    fn block_origin_inverts_node_to_block() {
        let block = BlockPos::new(-3, 2, 7);
        assert_eq!(node_to_block(block_origin(block)), block);
        assert_eq!(
            node_to_block(block_origin(block) + IVec3::splat(BLOCK_SIZE - 1)),
            block
        );
    }

    #[test]
    fn world_edge_is_enforced() {
        assert!(BlockPos::new(MAP_BLOCK_LIMIT, 0, 0).within_limit());
        assert!(!BlockPos::new(0, -MAP_BLOCK_LIMIT - 1, 0).within_limit());
    }
}
