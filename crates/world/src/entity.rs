//! Server-side entities: the shared base state, the closed set of entity bodies,
//! and the messages they emit.

use glam::{IVec3, Vec3};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use voxsim_core::{float_to_node, node_to_block, BlockPos, Inventory, InventoryItem};

use crate::drop_item::ItemEntity;
use crate::error::StaticDataError;
use crate::mob::MobEntity;
use crate::registry::EntityRegistry;
use crate::species::{MobLevel, Species, SpeciesTable};
use crate::static_object::{EntityKind, StaticObject};
use crate::storage::BlockStore;

/// Registry key of an entity. Zero means "not yet assigned".
pub type EntityId = u16;

/// Payload of an entity message, as the client understands it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityCommand {
    /// Command 0: new position and heading.
    UpdatePosition { pos: Vec3, yaw: f32 },
    /// Command 1: hit points lost.
    Damage { amount: u16 },
    /// Command 2: shooting animation length in seconds.
    Shooting { duration: f32 },
}

impl EntityCommand {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// One outgoing message from an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMessage {
    pub id: EntityId,
    pub reliable: bool,
    /// Opaque to everything but the client-side entity.
    pub data: Vec<u8>,
}

impl EntityMessage {
    pub fn command(&self) -> Result<EntityCommand, bincode::Error> {
        EntityCommand::decode(&self.data)
    }
}

/// Sound and visual cues that are not tied to an entity's message queue.
#[derive(Debug, Clone, PartialEq)]
pub enum AmbientEvent {
    Sound {
        pos: Vec3,
        name: &'static str,
    },
    Explosion {
        center: IVec3,
        diameter: u8,
        suppressed: bool,
    },
}

/// A connected player as seen by entity behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct Observer {
    pub name: String,
    pub pos: Vec3,
}

impl Observer {
    pub fn new(name: impl Into<String>, pos: Vec3) -> Self {
        Self {
            name: name.into(),
            pos,
        }
    }
}

/// State shared by every server entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBase {
    pub id: EntityId,
    pub pos: Vec3,
    /// Flagged for destruction; destroyed by the sweep once no client knows it.
    pub removed: bool,
    /// Left the active area while clients still knew it.
    pub pending_deactivation: bool,
    known_by_count: u16,
    /// Whether a bookkeeping record exists in `static_block`.
    pub static_exists: bool,
    pub static_block: BlockPos,
    messages: Vec<EntityMessage>,
}

impl EntityBase {
    pub fn new(pos: Vec3) -> Self {
        Self {
            id: 0,
            pos,
            removed: false,
            pending_deactivation: false,
            known_by_count: 0,
            static_exists: false,
            static_block: BlockPos::default(),
            messages: Vec::new(),
        }
    }

    /// Number of clients that were told about this entity and not yet told it is gone.
    pub fn known_by_count(&self) -> u16 {
        self.known_by_count
    }

    pub(crate) fn add_known(&mut self) {
        self.known_by_count = self.known_by_count.saturating_add(1);
    }

    pub(crate) fn forget(&mut self) -> bool {
        match self.known_by_count.checked_sub(1) {
            Some(count) => {
                self.known_by_count = count;
                true
            }
            None => false,
        }
    }

    /// Block containing the entity's current position.
    pub fn block(&self) -> BlockPos {
        node_to_block(float_to_node(self.pos))
    }

    /// Queue a command for clients.
    pub fn send(&mut self, command: EntityCommand, reliable: bool) {
        match command.encode() {
            Ok(data) => self.messages.push(EntityMessage {
                id: self.id,
                reliable,
                data,
            }),
            Err(err) => warn!(id = self.id, "Failed to encode entity command: {err}"),
        }
    }

    pub fn messages(&self) -> &[EntityMessage] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<EntityMessage> {
        std::mem::take(&mut self.messages)
    }

    /// Whether the sweep may destroy this entity.
    pub fn is_destroyable(&self) -> bool {
        self.removed && self.known_by_count == 0
    }
}

/// Type-specific part of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityBody {
    Mob(MobEntity),
    Item(ItemEntity),
}

/// Everything an entity may touch while stepping.
pub struct StepContext<'a> {
    pub dtime: f32,
    /// Position updates may be sent this tick.
    pub send_recommended: bool,
    pub map: &'a mut dyn BlockStore,
    pub species: &'a SpeciesTable,
    pub observers: &'a [Observer],
    /// Every other registered entity; the stepping entity is not in it.
    pub others: &'a mut EntityRegistry,
    pub rng: &'a mut StdRng,
    /// Entities created during the step, registered after the pass.
    pub spawned: &'a mut Vec<ServerEntity>,
    pub events: &'a mut Vec<AmbientEvent>,
}

/// Result of a punch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PunchOutcome {
    /// Wear to add to the punching tool.
    pub wear: u16,
    /// Item handed to the puncher, if any.
    pub item: Option<InventoryItem>,
}

/// A live entity owned by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEntity {
    pub base: EntityBase,
    pub body: EntityBody,
}

impl ServerEntity {
    /// A fresh mob of `species` at `pos`.
    pub fn mob(pos: Vec3, species: &Species) -> Self {
        Self {
            base: EntityBase::new(pos),
            body: EntityBody::Mob(MobEntity::new(species, pos)),
        }
    }

    /// A mob launched with an initial velocity.
    pub fn projectile(pos: Vec3, speed: Vec3, species: &Species) -> Self {
        let mut mob = MobEntity::new(species, pos);
        mob.speed = speed;
        Self {
            base: EntityBase::new(pos),
            body: EntityBody::Mob(mob),
        }
    }

    /// A dropped item at `pos`.
    pub fn item(pos: Vec3, item: InventoryItem) -> Self {
        Self {
            base: EntityBase::new(pos),
            body: EntityBody::Item(ItemEntity::new(&item)),
        }
    }

    pub fn id(&self) -> EntityId {
        self.base.id
    }

    pub fn kind(&self) -> EntityKind {
        match self.body {
            EntityBody::Mob(_) => EntityKind::Mob,
            EntityBody::Item(_) => EntityKind::Item,
        }
    }

    pub fn as_mob(&self) -> Option<&MobEntity> {
        match &self.body {
            EntityBody::Mob(mob) => Some(mob),
            EntityBody::Item(_) => None,
        }
    }

    pub fn as_mob_mut(&mut self) -> Option<&mut MobEntity> {
        match &mut self.body {
            EntityBody::Mob(mob) => Some(mob),
            EntityBody::Item(_) => None,
        }
    }

    pub fn as_item(&self) -> Option<&ItemEntity> {
        match &self.body {
            EntityBody::Item(item) => Some(item),
            EntityBody::Mob(_) => None,
        }
    }

    /// Threat level; items are always passive.
    pub fn level(&self, species: &SpeciesTable) -> MobLevel {
        match &self.body {
            EntityBody::Mob(mob) => species.get(mob.species).level,
            EntityBody::Item(_) => MobLevel::Passive,
        }
    }

    /// Advance by one tick. Removed entities do nothing.
    pub fn step(&mut self, ctx: &mut StepContext<'_>) {
        if self.base.removed {
            return;
        }
        match &mut self.body {
            EntityBody::Mob(mob) => mob.step(&mut self.base, ctx),
            EntityBody::Item(item) => item.step(&mut self.base, ctx),
        }
    }

    /// Apply damage from another entity or the environment.
    pub fn damage(&mut self, amount: u16) {
        match &mut self.body {
            EntityBody::Mob(mob) => mob.do_damage(&mut self.base, amount),
            EntityBody::Item(_) => self.base.removed = true,
        }
    }

    /// React to a player punch.
    pub fn punch(
        &mut self,
        tool: Option<&InventoryItem>,
        dir: Vec3,
        puncher: &str,
        map: &dyn BlockStore,
        species: &SpeciesTable,
    ) -> PunchOutcome {
        match &mut self.body {
            EntityBody::Mob(mob) => {
                let features = tool.map(InventoryItem::tool_features).unwrap_or_default();
                let template = species.get(mob.species);
                mob.punch(&mut self.base, template, features, dir, puncher, map)
            }
            EntityBody::Item(item) => PunchOutcome {
                wear: 0,
                item: item.pick_up(&mut self.base),
            },
        }
    }

    /// React to a player right-click. Returns true when the click was consumed.
    pub fn right_click(
        &mut self,
        inventory: &mut dyn Inventory,
        species: &SpeciesTable,
        rng: &mut StdRng,
        spawned: &mut Vec<ServerEntity>,
    ) -> bool {
        match &mut self.body {
            EntityBody::Mob(mob) => mob.right_click(&mut self.base, inventory, species, rng, spawned),
            EntityBody::Item(_) => false,
        }
    }

    /// Serialize into the opaque, versioned static payload.
    pub fn static_data(&self) -> Result<Vec<u8>, StaticDataError> {
        match &self.body {
            EntityBody::Mob(mob) => mob.static_data(&self.base),
            EntityBody::Item(item) => item.static_data(),
        }
    }

    pub fn to_static(&self) -> Result<StaticObject, StaticDataError> {
        Ok(StaticObject::new(self.kind(), self.base.pos, self.static_data()?))
    }

    /// Reconstruct a live entity from its static form.
    pub fn from_static(
        object: &StaticObject,
        species: &SpeciesTable,
    ) -> Result<Self, StaticDataError> {
        match object.kind {
            EntityKind::Mob => {
                let (mob, pos) = MobEntity::from_static_data(&object.data, species)?;
                Ok(Self {
                    base: EntityBase::new(pos),
                    body: EntityBody::Mob(mob),
                })
            }
            EntityKind::Item => {
                let item = ItemEntity::from_static_data(&object.data)?;
                Ok(Self {
                    base: EntityBase::new(object.pos),
                    body: EntityBody::Item(item),
                })
            }
        }
    }
}
