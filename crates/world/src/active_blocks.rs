//! Tracking of which blocks are "alive" around observers.

use std::collections::BTreeSet;

use voxsim_core::BlockPos;

/// Blocks that entered and left the active set during one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveBlockDiff {
    pub added: BTreeSet<BlockPos>,
    pub removed: BTreeSet<BlockPos>,
}

impl ActiveBlockDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The set of currently active blocks. Replaced wholesale on every refresh.
#[derive(Debug, Clone, Default)]
pub struct ActiveBlockSet {
    blocks: BTreeSet<BlockPos>,
}

impl ActiveBlockSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute the set as the union of cubes of `radius` around each observer block.
    pub fn update(&mut self, observers: &[BlockPos], radius: i32) -> ActiveBlockDiff {
        let radius = radius.max(0);
        let mut next = BTreeSet::new();
        for center in observers {
            for dx in -radius..=radius {
                for dy in -radius..=radius {
                    for dz in -radius..=radius {
                        let pos = center.offset(dx, dy, dz);
                        if pos.within_limit() {
                            next.insert(pos);
                        }
                    }
                }
            }
        }

        let added = next.difference(&self.blocks).copied().collect();
        let removed = self.blocks.difference(&next).copied().collect();
        self.blocks = next;
        ActiveBlockDiff { added, removed }
    }

    pub fn contains(&self, pos: BlockPos) -> bool {
        self.blocks.contains(&pos)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Iterate in deterministic (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.blocks.iter().copied()
    }
}
