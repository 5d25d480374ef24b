//! Serialized-at-rest entity records stored inside map blocks.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entity::EntityId;

/// Type tag of an entity, used to pick the decoder for a static payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    /// Dropped item.
    Item,
    /// Mob, projectile or other species-driven entity.
    Mob,
}

/// One entity in its serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticObject {
    pub kind: EntityKind,
    pub pos: Vec3,
    /// Opaque, versioned payload produced by the entity itself.
    pub data: Vec<u8>,
}

impl StaticObject {
    pub fn new(kind: EntityKind, pos: Vec3, data: Vec<u8>) -> Self {
        Self { kind, pos, data }
    }
}

/// Static objects of one block.
///
/// `stored` holds entities that are at rest in this block. `active` mirrors the
/// last known static form of registered entities whose bookkeeping lives here;
/// it is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticObjectList {
    pub stored: Vec<StaticObject>,
    #[serde(skip)]
    pub active: BTreeMap<EntityId, StaticObject>,
}

impl StaticObjectList {
    /// Number of entities at rest in the block.
    pub fn stored_count(&self) -> usize {
        self.stored.len()
    }

    /// Record bookkeeping for a registered entity.
    pub fn insert_active(&mut self, id: EntityId, object: StaticObject) {
        self.active.insert(id, object);
    }

    /// Drop bookkeeping for a registered entity.
    pub fn remove_active(&mut self, id: EntityId) -> Option<StaticObject> {
        self.active.remove(&id)
    }

    /// Take every stored record, leaving the stored list empty.
    pub fn take_stored(&mut self) -> Vec<StaticObject> {
        std::mem::take(&mut self.stored)
    }

    /// Remove all records, stored and active.
    pub fn clear(&mut self) {
        self.stored.clear();
        self.active.clear();
    }
}
