//! Authoritative table of live entities.
//!
//! The registry owns every active entity exclusively. Ids are reused: a new
//! entity takes the next free id after the last one handed out, wrapping around
//! and skipping zero.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use rand::rngs::StdRng;
use tracing::{debug, instrument, warn};

use voxsim_core::BlockPos;

use crate::active_blocks::ActiveBlockSet;
use crate::block::ModifiedFlags;
use crate::entity::{AmbientEvent, EntityId, Observer, ServerEntity, StepContext};
use crate::error::EntityError;
use crate::lifecycle::{store_static, StoreOutcome};
use crate::species::SpeciesTable;
use crate::storage::BlockStore;

/// Counts from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Removed entities destroyed.
    pub destroyed: usize,
    /// Pending entities stored and destroyed.
    pub deactivated: usize,
    /// Pending entities that moved into an active block and stay simulated.
    pub revived: usize,
    /// Bookkeeping entries moved to a new block.
    pub migrated: usize,
}

/// Inputs for one entity step pass.
pub struct StepParams<'a> {
    pub dtime: f32,
    pub send_recommended: bool,
    pub species: &'a SpeciesTable,
    pub observers: &'a [Observer],
    pub rng: &'a mut StdRng,
    pub events: &'a mut Vec<AmbientEvent>,
}

/// Arena of live entities keyed by id.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<EntityId, ServerEntity>,
    last_used_id: EntityId,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn allocate_id(&mut self) -> Result<EntityId, EntityError> {
        let mut candidate = self.last_used_id;
        for _ in 0..EntityId::MAX {
            candidate = candidate.wrapping_add(1);
            if candidate == 0 {
                candidate = 1;
            }
            if !self.entities.contains_key(&candidate) {
                self.last_used_id = candidate;
                return Ok(candidate);
            }
        }
        Err(EntityError::AllocationExhausted)
    }

    /// Register an entity, assigning an id if it has none.
    ///
    /// If the entity's block is resident its bookkeeping is recorded there and
    /// the block is marked modified. On error the entity is dropped.
    pub fn add(
        &mut self,
        entity: ServerEntity,
        map: &mut dyn BlockStore,
    ) -> Result<EntityId, EntityError> {
        self.insert(entity, map, true)
    }

    /// Register an entity reconstructed from its block's static list. The block
    /// is not marked modified since its persisted content does not change.
    pub(crate) fn add_activated(
        &mut self,
        entity: ServerEntity,
        map: &mut dyn BlockStore,
    ) -> Result<EntityId, EntityError> {
        self.insert(entity, map, false)
    }

    fn insert(
        &mut self,
        mut entity: ServerEntity,
        map: &mut dyn BlockStore,
        mark_modified: bool,
    ) -> Result<EntityId, EntityError> {
        let id = match entity.base.id {
            0 => self.allocate_id()?,
            requested if self.entities.contains_key(&requested) => {
                warn!(id = requested, "Requested entity id already in use");
                return Err(EntityError::IdInUse(requested));
            }
            requested => requested,
        };
        entity.base.id = id;

        let block_pos = entity.base.block();
        if let Some(block) = map.get_block_mut(block_pos) {
            match entity.to_static() {
                Ok(object) => {
                    block.static_objects_mut().insert_active(id, object);
                    if mark_modified {
                        block.raise_modified(ModifiedFlags::STATIC_OBJECTS);
                    }
                    entity.base.static_exists = true;
                    entity.base.static_block = block_pos;
                }
                Err(err) => warn!(id, "Entity could not be serialized for bookkeeping: {err}"),
            }
        }

        debug!(id, kind = ?entity.kind(), block = %block_pos, "Entity registered");
        self.entities.insert(id, entity);
        Ok(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&ServerEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut ServerEntity> {
        self.entities.get_mut(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Temporarily take an entity out, e.g. to step it against the rest.
    pub fn take(&mut self, id: EntityId) -> Option<ServerEntity> {
        self.entities.remove(&id)
    }

    /// Put back an entity previously taken out.
    pub fn restore(&mut self, entity: ServerEntity) {
        self.entities.insert(entity.base.id, entity);
    }

    /// A client was told about the entity.
    pub fn mark_known(&mut self, id: EntityId) -> bool {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                entity.base.add_known();
                true
            }
            None => false,
        }
    }

    /// A client forgot the entity.
    pub fn forget(&mut self, id: EntityId) -> bool {
        self.entities
            .get_mut(&id)
            .is_some_and(|entity| entity.base.forget())
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerEntity> {
        self.entities.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ServerEntity> {
        self.entities.values_mut()
    }

    /// Live entities within `radius` of `pos`, nearest first (ties by id).
    pub fn objects_in_radius(&self, pos: Vec3, radius: f32) -> Vec<(EntityId, f32)> {
        let mut found: Vec<(EntityId, f32)> = self
            .entities
            .values()
            .filter(|e| !e.base.removed)
            .map(|e| (e.base.id, e.base.pos.distance(pos)))
            .filter(|&(_, dist)| dist <= radius)
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    /// Entities a client at `pos` should be told about.
    pub fn added_in_radius(
        &self,
        pos: Vec3,
        radius: f32,
        known: &BTreeSet<EntityId>,
    ) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| !known.contains(&e.base.id))
            .filter(|e| !e.base.removed && !e.base.pending_deactivation)
            .filter(|e| e.base.pos.distance(pos) <= radius)
            .map(|e| e.base.id)
            .collect()
    }

    /// Known entities a client at `pos` should forget.
    pub fn removed_from_radius(
        &self,
        pos: Vec3,
        radius: f32,
        known: &BTreeSet<EntityId>,
    ) -> Vec<EntityId> {
        known
            .iter()
            .copied()
            .filter(|id| match self.entities.get(id) {
                None => true,
                Some(e) => {
                    e.base.removed
                        || e.base.pending_deactivation
                        || e.base.pos.distance(pos) > radius
                }
            })
            .collect()
    }

    /// Step every entity once, in id order. Entities spawned during the pass are
    /// registered after it. Returns the ids of newly registered entities.
    #[instrument(skip_all, fields(entities = self.entities.len(), dtime = params.dtime))]
    pub fn step_all(
        &mut self,
        map: &mut dyn BlockStore,
        params: StepParams<'_>,
    ) -> Vec<EntityId> {
        let StepParams {
            dtime,
            send_recommended,
            species,
            observers,
            rng,
            events,
        } = params;
        let mut spawned = Vec::new();

        for id in self.ids() {
            let Some(mut entity) = self.take(id) else {
                continue;
            };
            let mut ctx = StepContext {
                dtime,
                send_recommended,
                map: &mut *map,
                species,
                observers,
                others: &mut *self,
                rng: &mut *rng,
                spawned: &mut spawned,
                events: &mut *events,
            };
            entity.step(&mut ctx);
            self.restore(entity);
        }

        let mut added = Vec::new();
        for entity in spawned {
            match self.add(entity, map) {
                Ok(id) => added.push(id),
                Err(err) => warn!("Spawned entity dropped: {err}"),
            }
        }
        added
    }

    /// Destroy removed entities nobody knows about, finish pending
    /// deactivations and migrate bookkeeping of entities that changed block.
    ///
    /// A pending entity that has moved into an active block is kept simulated
    /// instead of stored.
    #[instrument(skip_all, fields(entities = self.entities.len()))]
    pub fn sweep(&mut self, map: &mut dyn BlockStore, active: &ActiveBlockSet) -> SweepReport {
        let mut report = SweepReport::default();
        for id in self.ids() {
            let Some(entity) = self.entities.get_mut(&id) else {
                continue;
            };
            let known = entity.base.known_by_count() > 0;

            if entity.base.removed {
                if known {
                    continue;
                }
                if entity.base.static_exists {
                    let block_pos = entity.base.static_block;
                    match map.emerge_block(block_pos) {
                        Some(block) => {
                            block.static_objects_mut().remove_active(id);
                            block.raise_modified(ModifiedFlags::STATIC_OBJECTS);
                        }
                        None => warn!(id, block = %block_pos, "Bookkeeping block unavailable"),
                    }
                }
                debug!(id, "Destroying removed entity");
                self.entities.remove(&id);
                report.destroyed += 1;
                continue;
            }

            if entity.base.pending_deactivation {
                if active.contains(entity.base.block()) {
                    debug!(id, block = %entity.base.block(), "Pending entity entered an active block");
                    entity.base.pending_deactivation = false;
                    report.revived += 1;
                } else {
                    if known {
                        continue;
                    }
                    if let Some(entity) = self.entities.remove(&id) {
                        match store_static(entity, map) {
                            StoreOutcome::Stored | StoreOutcome::Dropped => report.deactivated += 1,
                            StoreOutcome::Orphaned(entity, _) => {
                                self.entities.insert(id, *entity);
                            }
                        }
                    }
                    continue;
                }
            }

            let current = entity.base.block();
            if entity.base.static_exists && entity.base.static_block == current {
                continue;
            }
            if migrate_bookkeeping(entity, current, map) {
                report.migrated += 1;
            }
        }
        if report != SweepReport::default() {
            debug!(?report, "Sweep finished");
        }
        report
    }
}

/// Move an entity's bookkeeping to `target` if that block is resident.
fn migrate_bookkeeping(entity: &mut ServerEntity, target: BlockPos, map: &mut dyn BlockStore) -> bool {
    let Some(block) = map.get_block_mut(target) else {
        return false;
    };
    let object = match entity.to_static() {
        Ok(object) => object,
        Err(err) => {
            warn!(id = entity.base.id, "Entity could not be serialized for bookkeeping: {err}");
            return false;
        }
    };
    block.static_objects_mut().insert_active(entity.base.id, object);
    block.raise_modified(ModifiedFlags::STATIC_OBJECTS);

    if entity.base.static_exists {
        let old = entity.base.static_block;
        if let Some(old_block) = map.get_block_mut(old) {
            old_block.static_objects_mut().remove_active(entity.base.id);
            old_block.raise_modified(ModifiedFlags::STATIC_OBJECTS);
        }
    }
    entity.base.static_exists = true;
    entity.base.static_block = target;
    true
}
