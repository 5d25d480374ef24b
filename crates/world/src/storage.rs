use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::num::NonZeroUsize;

use anyhow::Result;
use glam::IVec3;
use lru::LruCache;
use tracing::{debug, warn};

use voxsim_core::{node_to_block, BlockPos};

use crate::block::{LocalPos, MapBlock, NodeMetadata};
use crate::content::{
    ContentId, CONTENT_AIR, CONTENT_DIRT, CONTENT_GRASS, CONTENT_IGNORE, CONTENT_STONE,
};
use crate::persist::BlockArchive;

/// Access to map blocks for the simulation.
///
/// Reads never block the tick: a block that is not resident reads as `None`
/// (nodes as `CONTENT_IGNORE`). `emerge_block` loads or creates synchronously and
/// is reserved for storing entities; everything else goes through `request_block`.
pub trait BlockStore {
    fn get_block(&self, pos: BlockPos) -> Option<&MapBlock>;

    fn get_block_mut(&mut self, pos: BlockPos) -> Option<&mut MapBlock>;

    /// Load or create a block. `None` only when the block lies beyond the world edge.
    fn emerge_block(&mut self, pos: BlockPos) -> Option<&mut MapBlock>;

    /// Queue an asynchronous load of a block.
    fn request_block(&mut self, pos: BlockPos);

    /// Serve up to `budget` queued requests. Returns the blocks that became resident.
    fn process_requests(&mut self, budget: usize) -> Vec<BlockPos>;

    /// Positions of all resident blocks, in sorted order.
    fn resident_blocks(&self) -> Vec<BlockPos>;

    fn get_node(&self, node: IVec3) -> ContentId {
        let block = node_to_block(node);
        match (self.get_block(block), LocalPos::of_node(block, node)) {
            (Some(b), Some(local)) => b.node(local),
            _ => CONTENT_IGNORE,
        }
    }

    /// Set a node. Returns false when the block is not resident.
    fn set_node(&mut self, node: IVec3, content: ContentId) -> bool {
        let block = node_to_block(node);
        let Some(local) = LocalPos::of_node(block, node) else {
            return false;
        };
        match self.get_block_mut(block) {
            Some(b) => {
                b.set_node(local, content);
                true
            }
            None => false,
        }
    }

    fn node_metadata(&self, node: IVec3) -> Option<&NodeMetadata> {
        let block = node_to_block(node);
        let local = LocalPos::of_node(block, node)?;
        self.get_block(block)?.metadata(local)
    }

    fn node_metadata_mut(&mut self, node: IVec3) -> Option<&mut NodeMetadata> {
        let block = node_to_block(node);
        let local = LocalPos::of_node(block, node)?;
        self.get_block_mut(block)?.metadata_mut(local)
    }

    fn set_node_metadata(&mut self, node: IVec3, meta: Option<NodeMetadata>) -> bool {
        let block = node_to_block(node);
        let Some(local) = LocalPos::of_node(block, node) else {
            return false;
        };
        match self.get_block_mut(block) {
            Some(b) => {
                b.set_metadata(local, meta);
                true
            }
            None => false,
        }
    }
}

/// Producer of blocks that have never been seen before.
pub trait BlockSource: Send {
    fn generate(&self, pos: BlockPos) -> MapBlock;
}

/// Flat terrain: grass surface at `ground_level - 1`, dirt and stone below, air above.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    pub ground_level: i32,
}

impl BlockSource for FlatTerrain {
    fn generate(&self, pos: BlockPos) -> MapBlock {
        let mut block = MapBlock::new(pos);
        for idx in 0..crate::block::BLOCK_VOLUME {
            let local = LocalPos::from_index(idx);
            let y = local.to_node(pos).y;
            let content = if y >= self.ground_level {
                CONTENT_AIR
            } else if y == self.ground_level - 1 {
                CONTENT_GRASS
            } else if y >= self.ground_level - 4 {
                CONTENT_DIRT
            } else {
                CONTENT_STONE
            };
            block.set_node(local, content);
        }
        block
    }
}

/// Resident block arena with an LRU eviction policy.
/// Uses BTreeMap for deterministic iteration order; evicted blocks go to the archive.
pub struct MemoryBlockStore {
    blocks: BTreeMap<BlockPos, MapBlock>,
    lru: LruCache<BlockPos, ()>,
    capacity: usize,
    archive: BlockArchive,
    source: Box<dyn BlockSource>,
    queue: VecDeque<BlockPos>,
    queued: BTreeSet<BlockPos>,
}

impl MemoryBlockStore {
    /// Create a store holding at most `capacity` resident blocks.
    pub fn new(capacity: usize, source: Box<dyn BlockSource>) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            blocks: BTreeMap::new(),
            lru: LruCache::new(cap),
            capacity: capacity.max(1),
            archive: BlockArchive::new(),
            source,
            queue: VecDeque::new(),
            queued: BTreeSet::new(),
        }
    }

    /// Store over [`FlatTerrain`].
    pub fn flat(capacity: usize, ground_level: i32) -> Self {
        Self::new(capacity, Box::new(FlatTerrain { ground_level }))
    }

    /// Number of resident blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Insert a block directly, replacing any resident copy.
    pub fn insert_block(&mut self, block: MapBlock) {
        let pos = block.position();
        if !self.blocks.contains_key(&pos) {
            self.evict_if_needed();
        }
        self.blocks.insert(pos, block);
        self.touch(pos);
    }

    /// Archive a resident block and drop it from memory.
    pub fn unload_block(&mut self, pos: BlockPos) -> Result<bool> {
        let Some(mut block) = self.blocks.remove(&pos) else {
            return Ok(false);
        };
        self.lru.pop(&pos);
        block.take_modified_flags();
        self.archive.save_block(&block)?;
        Ok(true)
    }

    /// Archive every resident block that has unsaved changes, stamping it with `game_time`.
    pub fn flush(&mut self, game_time: f64) -> Result<usize> {
        let mut saved = 0;
        for block in self.blocks.values_mut() {
            if block.modified().is_empty() {
                continue;
            }
            block.set_timestamp(game_time);
            self.archive.save_block(block)?;
            block.take_modified_flags();
            saved += 1;
        }
        Ok(saved)
    }

    pub fn archive(&self) -> &BlockArchive {
        &self.archive
    }

    /// Number of block loads still queued.
    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    fn load_or_generate(&mut self, pos: BlockPos) -> bool {
        if self.blocks.contains_key(&pos) {
            return true;
        }
        if !pos.within_limit() {
            return false;
        }
        let block = match self.archive.load_block(pos) {
            Ok(Some(block)) => block,
            Ok(None) => self.source.generate(pos),
            Err(err) => {
                warn!(block = %pos, "Archived block unreadable, regenerating: {err:#}");
                self.source.generate(pos)
            }
        };
        self.insert_block(block);
        true
    }

    fn touch(&mut self, pos: BlockPos) {
        self.lru.put(pos, ());
    }

    fn evict_if_needed(&mut self) {
        while self.blocks.len() >= self.capacity {
            let Some((oldest, _)) = self.lru.pop_lru() else {
                break;
            };
            if let Some(mut block) = self.blocks.remove(&oldest) {
                let flags = block.take_modified_flags();
                debug!(block = %oldest, ?flags, "Evicting block");
                if let Err(err) = self.archive.save_block(&block) {
                    warn!(block = %oldest, "Failed to archive evicted block: {err:#}");
                }
            }
        }
    }
}

impl BlockStore for MemoryBlockStore {
    fn get_block(&self, pos: BlockPos) -> Option<&MapBlock> {
        self.blocks.get(&pos)
    }

    fn get_block_mut(&mut self, pos: BlockPos) -> Option<&mut MapBlock> {
        if self.blocks.contains_key(&pos) {
            self.touch(pos);
        }
        self.blocks.get_mut(&pos)
    }

    fn emerge_block(&mut self, pos: BlockPos) -> Option<&mut MapBlock> {
        if !self.load_or_generate(pos) {
            return None;
        }
        self.get_block_mut(pos)
    }

    fn request_block(&mut self, pos: BlockPos) {
        if self.blocks.contains_key(&pos) || !pos.within_limit() {
            return;
        }
        if self.queued.insert(pos) {
            self.queue.push_back(pos);
        }
    }

    fn process_requests(&mut self, budget: usize) -> Vec<BlockPos> {
        let mut loaded = Vec::new();
        while loaded.len() < budget {
            let Some(pos) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&pos);
            if self.load_or_generate(pos) {
                loaded.push(pos);
            }
        }
        loaded
    }

    fn resident_blocks(&self) -> Vec<BlockPos> {
        self.blocks.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_object::{EntityKind, StaticObject};
    use glam::Vec3;

    #[test]
    fn storage_evicts_old_blocks_into_archive() {
        let mut store = MemoryBlockStore::flat(2, 0);
        let a = BlockPos::new(0, 0, 0);
        let b = BlockPos::new(1, 0, 0);
        let c = BlockPos::new(2, 0, 0);
        store.emerge_block(a);
        store.emerge_block(b);
        assert_eq!(store.len(), 2);
        store.emerge_block(c);
        assert_eq!(store.len(), 2);
        // `a` should have been evicted (least recently used).
        assert!(store.get_block(a).is_none());
        assert!(store.archive().contains(a));
        assert!(store.get_block(b).is_some());
        assert!(store.get_block(c).is_some());
    }

    #[test]
    fn evicted_block_comes_back_with_static_objects() {
        let mut store = MemoryBlockStore::flat(1, 0);
        let a = BlockPos::new(0, 0, 0);
        store
            .emerge_block(a)
            .unwrap()
            .static_objects_mut()
            .stored
            .push(StaticObject::new(EntityKind::Item, Vec3::ONE, vec![0]));
        store.emerge_block(BlockPos::new(5, 0, 0));
        assert!(store.get_block(a).is_none());
        let back = store.emerge_block(a).unwrap();
        assert_eq!(back.static_objects().stored_count(), 1);
    }

    #[test]
    fn world_edge_cannot_emerge() {
        let mut store = MemoryBlockStore::flat(4, 0);
        let edge = BlockPos::new(voxsim_core::MAP_BLOCK_LIMIT + 1, 0, 0);
        assert!(store.emerge_block(edge).is_none());
        store.request_block(edge);
        assert_eq!(store.pending_requests(), 0);
    }

    #[test]
    fn requests_load_within_budget() {
        let mut store = MemoryBlockStore::flat(16, 0);
        for x in 0..3 {
            store.request_block(BlockPos::new(x, 0, 0));
        }
        store.request_block(BlockPos::new(0, 0, 0));
        assert_eq!(store.pending_requests(), 3);
        assert_eq!(store.process_requests(2).len(), 2);
        assert!(store.get_block(BlockPos::new(2, 0, 0)).is_none());
        assert_eq!(store.process_requests(2), vec![BlockPos::new(2, 0, 0)]);
    }

    #[test]
    fn unloaded_nodes_read_as_ignore() {
        let store = MemoryBlockStore::flat(4, 0);
        assert_eq!(store.get_node(IVec3::new(0, 0, 0)), CONTENT_IGNORE);
    }

    #[test]
    fn flat_terrain_layers() {
        let mut store = MemoryBlockStore::flat(4, 0);
        store.emerge_block(BlockPos::new(0, -1, 0));
        store.emerge_block(BlockPos::new(0, 0, 0));
        assert_eq!(store.get_node(IVec3::new(3, 0, 3)), CONTENT_AIR);
        assert_eq!(store.get_node(IVec3::new(3, -1, 3)), CONTENT_GRASS);
        assert_eq!(store.get_node(IVec3::new(3, -3, 3)), CONTENT_DIRT);
        assert_eq!(store.get_node(IVec3::new(3, -10, 3)), CONTENT_STONE);
    }

    #[test]
    fn flush_saves_only_modified_blocks() {
        let mut store = MemoryBlockStore::flat(4, 0);
        store.emerge_block(BlockPos::new(0, 0, 0));
        assert_eq!(store.flush(1.0).unwrap(), 1);
        assert_eq!(store.flush(2.0).unwrap(), 0);
        store.set_node(IVec3::new(1, 1, 1), CONTENT_STONE);
        assert_eq!(store.flush(3.0).unwrap(), 1);
    }
}
