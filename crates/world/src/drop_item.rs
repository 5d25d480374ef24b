//! Dropped item entities.
//!
//! Items fall under gravity, snap onto walkable ground and despawn after
//! [`ITEM_LIFETIME`] unless durable. Landing can turn them into node changes:
//! a single leaf may take root, and non-edible items are packed into parcels.

use glam::{IVec3, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use voxsim_core::{float_to_node, IntervalLimiter, InventoryItem, ItemParseError};

use crate::block::NodeMetadata;
use crate::content::{
    content_features, CONTENT_LEAVES, CONTENT_PARCEL, CONTENT_SAPLING, CONTENT_WILDGRASS_SHORT,
};
use crate::entity::{EntityBase, EntityCommand, StepContext};
use crate::error::StaticDataError;
use crate::storage::BlockStore;

/// Seconds a non-durable item survives.
pub const ITEM_LIFETIME: f32 = 600.0;
/// Physics runs at this fixed interval.
pub const ITEM_MOVE_INTERVAL: f32 = 0.2;
/// Downward acceleration in nodes per second squared.
pub const ITEM_GRAVITY: f32 = 9.81;
/// Largest distance covered in one physics step.
pub const ITEM_MAX_STEP: f32 = 0.25;

const ITEM_STATIC_VERSION: u8 = 0;

#[derive(Debug, Serialize, Deserialize)]
struct ItemStaticData {
    item: String,
    age: f32,
}

/// An inventory item lying in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEntity {
    /// Item in its string form
    pub item_string: String,
    pub age: f32,
    pub speed: Vec3,
    pub last_sent_position: Vec3,
    /// Resting on walkable ground
    pub on_ground: bool,
    move_timer: IntervalLimiter,
}

impl ItemEntity {
    pub fn new(item: &InventoryItem) -> Self {
        Self {
            item_string: item.to_string(),
            age: 0.0,
            speed: Vec3::ZERO,
            last_sent_position: Vec3::ZERO,
            on_ground: false,
            move_timer: IntervalLimiter::new(),
        }
    }

    /// Parse the carried item.
    pub fn item(&self) -> Result<InventoryItem, ItemParseError> {
        self.item_string.parse()
    }

    pub fn step(&mut self, base: &mut EntityBase, ctx: &mut StepContext<'_>) {
        self.age += ctx.dtime;
        let durable = self.item().is_ok_and(|item| item.is_durable());
        if !durable && self.age >= ITEM_LIFETIME {
            debug!(id = base.id, item = %self.item_string, "Dropped item expired");
            base.removed = true;
            return;
        }

        if !self.move_timer.step(ctx.dtime, ITEM_MOVE_INTERVAL) {
            return;
        }
        let dt = ITEM_MOVE_INTERVAL;

        self.speed.y -= ITEM_GRAVITY * dt;
        let travel = self.speed.length() * dt;
        if travel > ITEM_MAX_STEP {
            self.speed *= ITEM_MAX_STEP / travel;
        }
        let target = base.pos + self.speed * dt;

        let ground = IVec3::new(
            target.x.round() as i32,
            target.y.floor() as i32,
            target.z.round() as i32,
        );
        if content_features(ctx.map.get_node(ground)).walkable {
            base.pos = Vec3::new(target.x, ground.y as f32 + 1.0, target.z);
            self.speed = Vec3::ZERO;
            let landed = !self.on_ground;
            self.on_ground = true;
            if landed {
                self.on_landed(base, ctx);
                if base.removed {
                    return;
                }
            }
        } else {
            base.pos = target;
            self.on_ground = false;
        }

        if ctx.send_recommended && base.pos.distance(self.last_sent_position) > 0.05 {
            self.last_sent_position = base.pos;
            base.send(
                EntityCommand::UpdatePosition {
                    pos: base.pos,
                    yaw: 0.0,
                },
                false,
            );
        }
    }

    fn on_landed(&mut self, base: &mut EntityBase, ctx: &mut StepContext<'_>) {
        let Ok(item) = self.item() else {
            return;
        };
        let cell = float_to_node(base.pos);
        let below = cell - IVec3::Y;
        let here = content_features(ctx.map.get_node(cell));

        if item.material_content() == Some(CONTENT_LEAVES)
            && item.count() == 1
            && here.buildable_to
            && content_features(ctx.map.get_node(below)).soil
        {
            let plant = if ctx.rng.gen_range(0..10) == 0 {
                CONTENT_SAPLING
            } else {
                CONTENT_WILDGRASS_SHORT
            };
            if ctx.map.set_node(cell, plant) {
                debug!(id = base.id, ?cell, plant, "Leaf took root");
                base.removed = true;
            }
            return;
        }

        if !item.is_edible() && absorb_into_parcel(ctx.map, cell, item) {
            debug!(id = base.id, ?cell, "Item packed into parcel");
            base.removed = true;
        }
    }

    /// Hand the item to a picker. `None` once already removed.
    pub fn pick_up(&mut self, base: &mut EntityBase) -> Option<InventoryItem> {
        if base.removed {
            return None;
        }
        let item = self.item().ok()?;
        base.removed = true;
        Some(item)
    }

    pub fn static_data(&self) -> Result<Vec<u8>, StaticDataError> {
        let data = ItemStaticData {
            item: self.item_string.clone(),
            age: self.age,
        };
        let mut out = vec![ITEM_STATIC_VERSION];
        out.extend(bincode::serialize(&data)?);
        Ok(out)
    }

    pub fn from_static_data(data: &[u8]) -> Result<Self, StaticDataError> {
        let (&version, body) = data.split_first().ok_or(StaticDataError::Empty)?;
        if version != ITEM_STATIC_VERSION {
            return Err(StaticDataError::UnsupportedVersion(version));
        }
        let data: ItemStaticData = bincode::deserialize(body)?;
        let item: InventoryItem = data.item.parse()?;
        let mut entity = Self::new(&item);
        entity.age = data.age;
        Ok(entity)
    }
}

/// Put `item` into a parcel at `cell` or a horizontal neighbour, placing a new
/// parcel at `cell` when none exists. Returns false when nothing could take it.
fn absorb_into_parcel(map: &mut dyn BlockStore, cell: IVec3, item: InventoryItem) -> bool {
    let neighbours = [
        cell,
        cell + IVec3::X,
        cell - IVec3::X,
        cell + IVec3::Z,
        cell - IVec3::Z,
    ];
    for pos in neighbours {
        if map.get_node(pos) != CONTENT_PARCEL {
            continue;
        }
        if let Some(NodeMetadata::Parcel { items }) = map.node_metadata_mut(pos) {
            items.push(item);
            return true;
        }
    }

    if !content_features(map.get_node(cell)).buildable_to {
        return false;
    }
    if !map.set_node(cell, CONTENT_PARCEL) {
        return false;
    }
    map.set_node_metadata(cell, Some(NodeMetadata::Parcel { items: vec![item] }))
}
