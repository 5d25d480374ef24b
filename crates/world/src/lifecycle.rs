//! Conversion of entities between the registry and block static lists.
//!
//! An entity of a loaded block lives in exactly one place: registered and
//! simulated, or stored in its block's static list. Entities still known to a
//! client are never stored; they wait in the registry flagged pending until the
//! last client forgets them.

use tracing::{debug, info, instrument, warn};

use voxsim_core::BlockPos;

use crate::active_blocks::ActiveBlockSet;
use crate::block::ModifiedFlags;
use crate::entity::{EntityId, ServerEntity};
use crate::error::EntityError;
use crate::registry::EntityRegistry;
use crate::species::SpeciesTable;
use crate::storage::BlockStore;

/// Blocks holding more stored entities than this are treated as corrupt.
pub const MAX_STORED_PER_BLOCK: usize = 49;
/// Movement that forces a save even when the payload is otherwise unchanged.
pub const STORE_MOVE_THRESHOLD: f32 = 2.0;

/// Result of activating one block.
#[derive(Debug, Default)]
pub struct BlockActivation {
    /// Ids registered from the static list.
    pub activated: Vec<EntityId>,
    /// Entities flagged pending that were kept active again.
    pub revived: Vec<EntityId>,
    /// Recoverable problems met along the way.
    pub diagnostics: Vec<EntityError>,
}

/// Counts from one deactivation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeactivationReport {
    pub stored: usize,
    /// Entities left pending because a client still knows them.
    pub deferred: usize,
    pub orphaned: usize,
    pub dropped: usize,
}

/// Cumulative lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub activated: u64,
    pub stored: u64,
    pub deferred: u64,
    pub reconstruction_failures: u64,
    pub purged_blocks: u64,
    pub orphaned: u64,
}

/// What happened to an entity handed to [`store_static`].
#[derive(Debug)]
pub(crate) enum StoreOutcome {
    Stored,
    /// Lost on purpose: unserializable or the target block is full.
    Dropped,
    /// No block can take it; handed back flagged removed.
    Orphaned(Box<ServerEntity>, EntityError),
}

/// Serialize an unregistered entity into the static list of the block at its
/// current position, replacing its bookkeeping.
pub(crate) fn store_static(mut entity: ServerEntity, map: &mut dyn BlockStore) -> StoreOutcome {
    let id = entity.base.id;

    let mut previous = None;
    if entity.base.static_exists {
        if let Some(block) = map.emerge_block(entity.base.static_block) {
            previous = block.static_objects_mut().remove_active(id);
        }
        entity.base.static_exists = false;
    }

    let object = match entity.to_static() {
        Ok(object) => object,
        Err(err) => {
            warn!(id, "Entity could not be serialized; dropping it: {err}");
            return StoreOutcome::Dropped;
        }
    };

    let target = entity.base.block();
    let Some(block) = map.emerge_block(target) else {
        warn!(id, block = %target, "No block can store entity; removing it");
        entity.base.removed = true;
        return StoreOutcome::Orphaned(
            Box::new(entity),
            EntityError::OrphanedEntity { id, block: target },
        );
    };

    if block.static_objects().stored_count() >= MAX_STORED_PER_BLOCK {
        warn!(id, block = %target, "Block static list is full; dropping entity");
        return StoreOutcome::Dropped;
    }

    let changed = match &previous {
        None => true,
        Some(old) => {
            entity.base.static_block != target
                || old.data != object.data
                || old.pos.distance(object.pos) >= STORE_MOVE_THRESHOLD
        }
    };
    block.static_objects_mut().stored.push(object);
    if changed {
        block.raise_modified(ModifiedFlags::STATIC_OBJECTS);
    }
    debug!(id, block = %target, changed, "Entity stored");
    StoreOutcome::Stored
}

/// Moves entities in and out of the registry as blocks change activity.
#[derive(Debug, Default)]
pub struct EntityLifecycle {
    stats: LifecycleStats,
}

impl EntityLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> LifecycleStats {
        self.stats
    }

    /// Register every entity stored in a block that just became active.
    ///
    /// Records that fail to reconstruct stay in the block untouched. A block over
    /// the sanity cap has its whole stored list purged. The block is not marked
    /// modified for successful activations.
    #[instrument(skip(self, registry, map, species), fields(block = %pos))]
    pub fn activate_block(
        &mut self,
        pos: BlockPos,
        registry: &mut EntityRegistry,
        map: &mut dyn BlockStore,
        species: &SpeciesTable,
    ) -> BlockActivation {
        let mut report = BlockActivation::default();

        for entity in registry.iter_mut() {
            if entity.base.pending_deactivation && entity.base.block() == pos {
                entity.base.pending_deactivation = false;
                report.revived.push(entity.base.id);
            }
        }

        let Some(block) = map.get_block_mut(pos) else {
            return report;
        };

        let count = block.static_objects().stored_count();
        if count > MAX_STORED_PER_BLOCK {
            warn!(block = %pos, count, "Suspiciously many static objects; purging list");
            block.static_objects_mut().stored.clear();
            block.raise_modified(ModifiedFlags::STATIC_OBJECTS);
            self.stats.purged_blocks += 1;
            report
                .diagnostics
                .push(EntityError::CorruptRegion { block: pos, count });
            return report;
        }

        let mut rebuilt = Vec::new();
        let mut kept = Vec::new();
        for object in block.static_objects_mut().take_stored() {
            match ServerEntity::from_static(&object, species) {
                Ok(entity) => rebuilt.push((object, entity)),
                Err(err) => {
                    warn!(block = %pos, kind = ?object.kind, "Static object kept; reconstruction failed: {err}");
                    self.stats.reconstruction_failures += 1;
                    report.diagnostics.push(EntityError::ReconstructionFailure {
                        kind: object.kind,
                        block: pos,
                        reason: err.to_string(),
                    });
                    kept.push(object);
                }
            }
        }
        block.static_objects_mut().stored = kept;

        for (object, entity) in rebuilt {
            match registry.add_activated(entity, map) {
                Ok(id) => report.activated.push(id),
                Err(err) => {
                    warn!(block = %pos, "Activated entity could not be registered: {err}");
                    if let Some(block) = map.get_block_mut(pos) {
                        block.static_objects_mut().stored.push(object);
                    }
                    report.diagnostics.push(err);
                }
            }
        }

        self.stats.activated += report.activated.len() as u64;
        if !report.activated.is_empty() {
            debug!(block = %pos, count = report.activated.len(), "Block entities activated");
        }
        report
    }

    /// Store every entity whose block left the active set.
    ///
    /// Entities still known to clients are flagged pending instead. `force_all`
    /// ignores activity and client knowledge and stores everything live.
    #[instrument(skip(self, registry, map, active), fields(entities = registry.len()))]
    pub fn deactivate_far(
        &mut self,
        registry: &mut EntityRegistry,
        map: &mut dyn BlockStore,
        active: &ActiveBlockSet,
        force_all: bool,
    ) -> DeactivationReport {
        let mut report = DeactivationReport::default();
        for id in registry.ids() {
            let Some(entity) = registry.get_mut(id) else {
                continue;
            };
            if entity.base.removed {
                continue;
            }
            if entity.base.pending_deactivation && !force_all {
                continue;
            }
            if !force_all && active.contains(entity.base.block()) {
                continue;
            }
            if !force_all && entity.base.known_by_count() > 0 {
                entity.base.pending_deactivation = true;
                report.deferred += 1;
                continue;
            }

            let Some(entity) = registry.take(id) else {
                continue;
            };
            match store_static(entity, map) {
                StoreOutcome::Stored => report.stored += 1,
                StoreOutcome::Dropped => report.dropped += 1,
                StoreOutcome::Orphaned(entity, _) => {
                    registry.restore(*entity);
                    report.orphaned += 1;
                }
            }
        }

        self.stats.stored += report.stored as u64;
        self.stats.deferred += report.deferred as u64;
        self.stats.orphaned += report.orphaned as u64;
        if report != DeactivationReport::default() {
            debug!(?report, "Deactivation pass finished");
        }
        report
    }

    /// Drop every registered entity and every stored record of resident blocks.
    ///
    /// Entities still known to a client are only flagged removed; the next sweep
    /// destroys them once forgotten.
    pub fn clear_all(&mut self, registry: &mut EntityRegistry, map: &mut dyn BlockStore) -> usize {
        let mut cleared = 0;
        for id in registry.ids() {
            if let Some(entity) = registry.get_mut(id) {
                if entity.base.known_by_count() > 0 {
                    entity.base.removed = true;
                    cleared += 1;
                    continue;
                }
            }
            let Some(entity) = registry.take(id) else {
                continue;
            };
            if entity.base.static_exists {
                if let Some(block) = map.get_block_mut(entity.base.static_block) {
                    block.static_objects_mut().remove_active(id);
                }
            }
            cleared += 1;
        }
        for pos in map.resident_blocks() {
            if let Some(block) = map.get_block_mut(pos) {
                let stored = block.static_objects().stored_count();
                if stored > 0 {
                    block.static_objects_mut().clear();
                    block.raise_modified(ModifiedFlags::STATIC_OBJECTS);
                    cleared += stored;
                }
            }
        }
        info!(cleared, "Cleared all entities");
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::species::SpeciesId;
    use crate::static_object::{EntityKind, StaticObject};
    use crate::storage::MemoryBlockStore;
    use glam::Vec3;
    use voxsim_core::InventoryItem;

    fn setup() -> (MemoryBlockStore, EntityRegistry, EntityLifecycle, SpeciesTable) {
        let mut map = MemoryBlockStore::flat(16, 0);
        map.emerge_block(BlockPos::new(0, 0, 0));
        (map, EntityRegistry::new(), EntityLifecycle::new(), SpeciesTable::builtin())
    }

    #[test]
    fn inactive_entity_is_stored_and_unregistered() {
        let (mut map, mut registry, mut lifecycle, _) = setup();
        let id = registry
            .add(ServerEntity::item(Vec3::splat(3.0), InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &ActiveBlockSet::new(), false);
        assert_eq!(report.stored, 1);
        assert!(!registry.contains(id));
        let block = map.get_block(BlockPos::new(0, 0, 0)).unwrap();
        assert_eq!(block.static_objects().stored_count(), 1);
        assert!(block.static_objects().active.is_empty());
    }

    #[test]
    fn known_entity_is_deferred() {
        let (mut map, mut registry, mut lifecycle, _) = setup();
        let id = registry
            .add(ServerEntity::item(Vec3::splat(3.0), InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        registry.mark_known(id);
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &ActiveBlockSet::new(), false);
        assert_eq!(report.deferred, 1);
        assert!(registry.get(id).unwrap().base.pending_deactivation);
        let block = map.get_block(BlockPos::new(0, 0, 0)).unwrap();
        assert_eq!(block.static_objects().stored_count(), 0);
    }

    #[test]
    fn deferred_entity_falling_into_active_block_is_not_stored() {
        let (mut map, mut registry, mut lifecycle, _) = setup();
        let home = BlockPos::new(0, 0, 0);
        let mut active = ActiveBlockSet::new();
        active.update(&[home], 0);
        let id = registry
            .add(ServerEntity::item(Vec3::new(3.0, 20.0, 3.0), InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        registry.mark_known(id);
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &active, false);
        assert_eq!(report.deferred, 1);

        registry.get_mut(id).unwrap().base.pos = Vec3::new(3.0, 10.0, 3.0);
        registry.forget(id);
        let sweep = registry.sweep(&mut map, &active);
        assert_eq!(sweep.revived, 1);
        assert!(registry.contains(id));
        assert_eq!(map.get_block(home).unwrap().static_objects().stored_count(), 0);

        // Later passes leave it alone while its block stays active.
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &active, false);
        assert_eq!(report, DeactivationReport::default());
    }

    #[test]
    fn full_block_drops_further_entities() {
        let (mut map, mut registry, mut lifecycle, _) = setup();
        let pos = BlockPos::new(0, 0, 0);
        let block = map.get_block_mut(pos).unwrap();
        for i in 0..MAX_STORED_PER_BLOCK - 1 {
            block.static_objects_mut().stored.push(StaticObject::new(
                EntityKind::Item,
                Vec3::new(1.0 + i as f32 * 0.2, 1.0, 1.0),
                vec![0],
            ));
        }

        let last = registry
            .add(ServerEntity::item(Vec3::splat(3.0), InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &ActiveBlockSet::new(), false);
        assert_eq!(report.stored, 1);
        assert!(!registry.contains(last));
        assert_eq!(
            map.get_block(pos).unwrap().static_objects().stored_count(),
            MAX_STORED_PER_BLOCK
        );

        let extra = registry
            .add(ServerEntity::item(Vec3::splat(5.0), InventoryItem::craft("stick", 1)), &mut map)
            .unwrap();
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &ActiveBlockSet::new(), false);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.stored, 0);
        assert!(!registry.contains(extra));
        let block = map.get_block(pos).unwrap();
        assert_eq!(block.static_objects().stored_count(), MAX_STORED_PER_BLOCK);
        assert!(block.static_objects().active.is_empty());
    }

    #[test]
    fn force_all_ignores_clients() {
        let (mut map, mut registry, mut lifecycle, _) = setup();
        let id = registry
            .add(ServerEntity::item(Vec3::splat(3.0), InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        registry.mark_known(id);
        let report = lifecycle.deactivate_far(&mut registry, &mut map, &ActiveBlockSet::new(), true);
        assert_eq!(report.stored, 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_all_flags_known_entities() {
        let (mut map, mut registry, mut lifecycle, _) = setup();
        let known = registry
            .add(ServerEntity::item(Vec3::splat(3.0), InventoryItem::craft("apple", 1)), &mut map)
            .unwrap();
        let unknown = registry
            .add(ServerEntity::item(Vec3::splat(5.0), InventoryItem::craft("stick", 1)), &mut map)
            .unwrap();
        registry.mark_known(known);
        map.get_block_mut(BlockPos::new(0, 0, 0))
            .unwrap()
            .static_objects_mut()
            .stored
            .push(StaticObject::new(EntityKind::Item, Vec3::ONE, vec![0]));

        assert_eq!(lifecycle.clear_all(&mut registry, &mut map), 3);
        assert!(!registry.contains(unknown));
        assert!(registry.get(known).unwrap().base.removed);
        let block = map.get_block(BlockPos::new(0, 0, 0)).unwrap();
        assert_eq!(block.static_objects().stored_count(), 0);
    }

    #[test]
    fn undecodable_record_is_kept() {
        let (mut map, mut registry, mut lifecycle, species) = setup();
        let pos = BlockPos::new(0, 0, 0);
        map.get_block_mut(pos)
            .unwrap()
            .static_objects_mut()
            .stored
            .push(StaticObject::new(EntityKind::Mob, Vec3::ONE, vec![0, 1]));
        let activation = lifecycle.activate_block(pos, &mut registry, &mut map, &species);
        assert!(activation.activated.is_empty());
        assert!(matches!(
            activation.diagnostics[0],
            EntityError::ReconstructionFailure { kind: EntityKind::Mob, .. }
        ));
        assert_eq!(map.get_block(pos).unwrap().static_objects().stored_count(), 1);
        assert_eq!(lifecycle.stats().reconstruction_failures, 1);
    }

    #[test]
    fn activation_does_not_mark_block_modified() {
        let (mut map, mut registry, mut lifecycle, species) = setup();
        let pos = BlockPos::new(0, 0, 0);
        let rat = ServerEntity::mob(Vec3::splat(4.0), species.get(SpeciesId::RAT));
        let object = rat.to_static().unwrap();
        let block = map.get_block_mut(pos).unwrap();
        block.static_objects_mut().stored.push(object);
        block.take_modified_flags();

        let activation = lifecycle.activate_block(pos, &mut registry, &mut map, &species);
        assert_eq!(activation.activated.len(), 1);
        let block = map.get_block(pos).unwrap();
        assert!(block.modified().is_empty());
        assert_eq!(block.static_objects().stored_count(), 0);
        assert_eq!(block.static_objects().active.len(), 1);
    }
}
