use glam::IVec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use voxsim_core::{block_origin, BlockPos, InventoryItem, BLOCK_SIZE};

use crate::content::{ContentId, CONTENT_AIR};
use crate::static_object::StaticObjectList;

/// Nodes per block edge, as a usize.
pub const BLOCK_EDGE: usize = BLOCK_SIZE as usize;
/// Total node count per block.
pub const BLOCK_VOLUME: usize = BLOCK_EDGE * BLOCK_EDGE * BLOCK_EDGE;

/// Block-local node position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl LocalPos {
    /// Convert to a linear index within the node array.
    pub fn index(self) -> usize {
        debug_assert!(self.x < BLOCK_EDGE);
        debug_assert!(self.y < BLOCK_EDGE);
        debug_assert!(self.z < BLOCK_EDGE);
        (self.y * BLOCK_EDGE + self.z) * BLOCK_EDGE + self.x
    }

    /// Inverse of [`LocalPos::index`].
    pub fn from_index(index: usize) -> Self {
        Self {
            x: index % BLOCK_EDGE,
            z: (index / BLOCK_EDGE) % BLOCK_EDGE,
            y: index / (BLOCK_EDGE * BLOCK_EDGE),
        }
    }

    /// Local position of a world node, if it lies within `block`.
    pub fn of_node(block: BlockPos, node: IVec3) -> Option<Self> {
        let rel = node - block_origin(block);
        let range = 0..BLOCK_SIZE;
        if range.contains(&rel.x) && range.contains(&rel.y) && range.contains(&rel.z) {
            Some(Self {
                x: rel.x as usize,
                y: rel.y as usize,
                z: rel.z as usize,
            })
        } else {
            None
        }
    }

    /// World node at this local position within `block`.
    pub fn to_node(self, block: BlockPos) -> IVec3 {
        block_origin(block) + IVec3::new(self.x as i32, self.y as i32, self.z as i32)
    }
}

/// Extra per-node state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeMetadata {
    /// Items absorbed by a parcel node.
    Parcel { items: Vec<InventoryItem> },
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Modification flags set whenever block data changes and must be saved.
    pub struct ModifiedFlags: u8 {
        const NODES = 0b0000_0001;
        const METADATA = 0b0000_0010;
        const STATIC_OBJECTS = 0b0000_0100;
    }
}

impl Default for ModifiedFlags {
    fn default() -> Self {
        ModifiedFlags::empty()
    }
}

/// A 16³ region of the world: nodes, node metadata and the entities at rest in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapBlock {
    position: BlockPos,
    nodes: Vec<ContentId>,
    metadata: BTreeMap<u16, NodeMetadata>,
    static_objects: StaticObjectList,
    /// Game time of the last save or unload, if any.
    timestamp: Option<f64>,
    #[serde(skip)]
    modified: ModifiedFlags,
}

impl MapBlock {
    /// Allocate a fresh block filled with air.
    pub fn new(position: BlockPos) -> Self {
        Self::filled(position, CONTENT_AIR)
    }

    /// Allocate a block filled with one content type.
    pub fn filled(position: BlockPos, content: ContentId) -> Self {
        Self {
            position,
            nodes: vec![content; BLOCK_VOLUME],
            metadata: BTreeMap::new(),
            static_objects: StaticObjectList::default(),
            timestamp: None,
            modified: ModifiedFlags::NODES,
        }
    }

    #[inline]
    pub fn position(&self) -> BlockPos {
        self.position
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Fetch a node's content.
    pub fn node(&self, local: LocalPos) -> ContentId {
        self.nodes[local.index()]
    }

    /// Set a node and mark the block modified. Replacing a node drops its metadata.
    pub fn set_node(&mut self, local: LocalPos, content: ContentId) {
        let idx = local.index();
        if self.nodes[idx] != content {
            self.nodes[idx] = content;
            self.modified.insert(ModifiedFlags::NODES);
            if self.metadata.remove(&(idx as u16)).is_some() {
                self.modified.insert(ModifiedFlags::METADATA);
            }
        }
    }

    pub fn metadata(&self, local: LocalPos) -> Option<&NodeMetadata> {
        self.metadata.get(&(local.index() as u16))
    }

    pub fn metadata_mut(&mut self, local: LocalPos) -> Option<&mut NodeMetadata> {
        let meta = self.metadata.get_mut(&(local.index() as u16));
        if meta.is_some() {
            self.modified.insert(ModifiedFlags::METADATA);
        }
        meta
    }

    /// Attach or clear metadata for a node.
    pub fn set_metadata(&mut self, local: LocalPos, meta: Option<NodeMetadata>) {
        let key = local.index() as u16;
        match meta {
            Some(meta) => {
                self.metadata.insert(key, meta);
            }
            None => {
                self.metadata.remove(&key);
            }
        }
        self.modified.insert(ModifiedFlags::METADATA);
    }

    /// Local positions that carry metadata, in index order.
    pub fn metadata_positions(&self) -> Vec<LocalPos> {
        self.metadata
            .keys()
            .map(|&idx| LocalPos::from_index(idx as usize))
            .collect()
    }

    pub fn static_objects(&self) -> &StaticObjectList {
        &self.static_objects
    }

    /// Mutable access to static objects. Callers decide whether the change is worth a save.
    pub fn static_objects_mut(&mut self) -> &mut StaticObjectList {
        &mut self.static_objects
    }

    pub fn raise_modified(&mut self, flags: ModifiedFlags) {
        self.modified.insert(flags);
    }

    pub fn modified(&self) -> ModifiedFlags {
        self.modified
    }

    /// Consume and return the current modification flags.
    pub fn take_modified_flags(&mut self) -> ModifiedFlags {
        let flags = self.modified;
        self.modified = ModifiedFlags::empty();
        flags
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn set_timestamp(&mut self, game_time: f64) {
        self.timestamp = Some(game_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CONTENT_STONE;

    #[test]
    fn local_index_roundtrips() {
        for idx in [0, 1, 17, 255, 4095] {
            assert_eq!(LocalPos::from_index(idx).index(), idx);
        }
    }

    #[test]
    fn set_node_raises_modified_only_on_change() {
        let mut block = MapBlock::new(BlockPos::new(0, 0, 0));
        block.take_modified_flags();
        let p = LocalPos { x: 1, y: 2, z: 3 };
        block.set_node(p, CONTENT_AIR);
        assert!(block.modified().is_empty());
        block.set_node(p, CONTENT_STONE);
        assert_eq!(block.take_modified_flags(), ModifiedFlags::NODES);
        assert_eq!(block.node(p), CONTENT_STONE);
    }

    #[test]
    fn replacing_a_node_drops_its_metadata() {
        let mut block = MapBlock::new(BlockPos::new(0, 0, 0));
        let p = LocalPos { x: 0, y: 0, z: 0 };
        block.set_metadata(p, Some(NodeMetadata::Parcel { items: Vec::new() }));
        block.set_node(p, CONTENT_STONE);
        assert!(block.metadata(p).is_none());
    }

    #[test]
    fn of_node_respects_block_bounds() {
        let block = BlockPos::new(-1, 0, 0);
        assert_eq!(
            LocalPos::of_node(block, IVec3::new(-1, 0, 15)),
            Some(LocalPos { x: 15, y: 0, z: 15 })
        );
        assert!(LocalPos::of_node(block, IVec3::new(0, 0, 0)).is_none());
        let local = LocalPos { x: 3, y: 4, z: 5 };
        assert_eq!(LocalPos::of_node(block, local.to_node(block)), Some(local));
    }
}
