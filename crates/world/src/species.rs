//! Species templates for mobs and projectiles.
//!
//! The table is built once at startup and passed by reference into the behavior
//! code. Lookups of unknown ids resolve to an inert record instead of failing.

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use voxsim_core::{InventoryItem, ToolType};

use crate::content::{
    ContentId, CONTENT_GRASS, CONTENT_IGNORE, CONTENT_SNOW, CONTENT_STONE, CONTENT_TREE,
    CONTENT_WATERSOURCE, CONTENT_WOOL,
};

/// Identifier of a species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpeciesId(pub u16);

impl SpeciesId {
    pub const IGNORE: Self = Self(CONTENT_IGNORE);
    pub const RAT: Self = Self(0x2000);
    pub const FIREFLY: Self = Self(0x2001);
    pub const OERKKI: Self = Self(0x2002);
    pub const DUNGEON_MASTER: Self = Self(0x2003);
    pub const FIREBALL: Self = Self(0x2004);
    pub const DEER: Self = Self(0x2005);
    pub const SHEEP: Self = Self(0x2006);
    pub const FISH: Self = Self(0x2007);
    pub const SHARK: Self = Self(0x2008);
    pub const WOLF: Self = Self(0x2009);
    pub const TAMED_WOLF: Self = Self(0x200a);
    pub const ARROW: Self = Self(0x200b);
    pub const SNOWBALL: Self = Self(0x200c);
}

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Threat level; servers may cap the highest level allowed to exist.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MobLevel {
    #[default]
    Passive,
    Aggressive,
    Destructive,
}

/// Reaction to being punched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchAction {
    Ignore,
    Die,
    Harm,
    /// The mob is picked up and becomes an item.
    Pickup,
}

/// Movement strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Static,
    Wander,
    Seeker,
    Sentry,
    Thrown,
    Constant,
    Follow,
}

/// Medium the species moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionType {
    Walk,
    Fly,
    FlyLow,
    Swim,
}

/// Extra item a living mob yields when punched with the right tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialDrop {
    pub item: InventoryItem,
    /// Accrued drops consumed per harvest.
    pub count: u16,
    /// Cap on accrued drops.
    pub max: u16,
    /// Tool required; `ToolType::None` accepts anything.
    pub tool: ToolType,
}

/// Ambient spawn rule evaluated on active blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnRule {
    /// Content the mob spawns on top of.
    pub ground: ContentId,
    /// Content that must be horizontally adjacent to the ground node.
    pub near: Option<ContentId>,
    pub night_only: bool,
    /// One in `chance` per candidate node.
    pub chance: u32,
}

/// Axis-aligned collision box relative to the entity position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl CollisionBox {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Size in whole nodes, at least one per axis.
    pub fn size_nodes(&self) -> IVec3 {
        let extent = (self.max - self.min).ceil().as_ivec3();
        extent.max(IVec3::ONE)
    }
}

/// Immutable behavior parameters shared by every mob of a species.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub id: SpeciesId,
    pub name: &'static str,
    pub level: MobLevel,
    pub punch_action: PunchAction,
    pub motion: Motion,
    /// Motion used while angry.
    pub angry_motion: Motion,
    pub motion_type: MotionType,
    pub hp: u8,
    /// Seconds until despawn; zero lives forever.
    pub lifetime: f32,
    pub notices_player: bool,
    pub tamed_mob: Option<SpeciesId>,
    /// Initial taming-attempt counter; success chance is one in the counter.
    pub taming_difficulty: u8,
    pub attack_throw_object: Option<SpeciesId>,
    pub attack_throw_offset: Vec3,
    pub attack_mob_damage: u8,
    pub attack_mob_range: f32,
    /// Item handed out when the mob itself is picked up.
    pub dropped_item: Option<InventoryItem>,
    pub special_drop: Option<SpecialDrop>,
    pub contact_explosion_diameter: u8,
    pub contact_place_node: Option<ContentId>,
    pub contact_drop_item: Option<InventoryItem>,
    pub collision_box: CollisionBox,
    pub sound: Option<&'static str>,
    pub spawn: Option<SpawnRule>,
}

const SMALL_BOX: CollisionBox = CollisionBox::new(
    Vec3::new(-1.0 / 3.0, 0.0, -1.0 / 3.0),
    Vec3::new(1.0 / 3.0, 0.5, 1.0 / 3.0),
);

impl Species {
    /// A record that does nothing: static, unpunchable, no drops.
    pub fn inert(id: SpeciesId) -> Self {
        Self {
            id,
            name: "ignore",
            level: MobLevel::Passive,
            punch_action: PunchAction::Ignore,
            motion: Motion::Static,
            angry_motion: Motion::Static,
            motion_type: MotionType::Walk,
            hp: 10,
            lifetime: 0.0,
            notices_player: false,
            tamed_mob: None,
            taming_difficulty: 1,
            attack_throw_object: None,
            attack_throw_offset: Vec3::ZERO,
            attack_mob_damage: 0,
            attack_mob_range: 0.0,
            dropped_item: None,
            special_drop: None,
            contact_explosion_diameter: 0,
            contact_place_node: None,
            contact_drop_item: None,
            collision_box: SMALL_BOX,
            sound: None,
            spawn: None,
        }
    }

    pub fn size_nodes(&self) -> IVec3 {
        self.collision_box.size_nodes()
    }

    /// Thrown and constant-motion species are projectiles.
    pub fn is_projectile(&self) -> bool {
        matches!(self.motion, Motion::Thrown | Motion::Constant)
    }
}

fn builtin_species() -> Vec<Species> {
    let base = Species::inert;
    vec![
        Species {
            name: "rat",
            punch_action: PunchAction::Pickup,
            motion: Motion::Wander,
            angry_motion: Motion::Wander,
            hp: 5,
            dropped_item: Some(InventoryItem::craft("rat", 1)),
            sound: Some("mob-rat-env"),
            spawn: Some(SpawnRule {
                ground: CONTENT_GRASS,
                near: Some(CONTENT_TREE),
                night_only: false,
                chance: 200,
            }),
            ..base(SpeciesId::RAT)
        },
        Species {
            name: "firefly",
            punch_action: PunchAction::Pickup,
            motion: Motion::Wander,
            angry_motion: Motion::Wander,
            motion_type: MotionType::FlyLow,
            hp: 5,
            lifetime: 300.0,
            dropped_item: Some(InventoryItem::craft("firefly", 1)),
            spawn: Some(SpawnRule {
                ground: CONTENT_GRASS,
                near: None,
                night_only: true,
                chance: 400,
            }),
            ..base(SpeciesId::FIREFLY)
        },
        Species {
            name: "oerkki",
            level: MobLevel::Aggressive,
            punch_action: PunchAction::Harm,
            motion: Motion::Seeker,
            angry_motion: Motion::Seeker,
            hp: 20,
            lifetime: 900.0,
            notices_player: true,
            collision_box: CollisionBox::new(
                Vec3::new(-1.0 / 3.0, 0.0, -1.0 / 3.0),
                Vec3::new(1.0 / 3.0, 2.0, 1.0 / 3.0),
            ),
            sound: Some("mob-oerkki-env"),
            spawn: Some(SpawnRule {
                ground: CONTENT_STONE,
                near: None,
                night_only: true,
                chance: 2000,
            }),
            ..base(SpeciesId::OERKKI)
        },
        Species {
            name: "dungeon_master",
            level: MobLevel::Destructive,
            punch_action: PunchAction::Harm,
            motion: Motion::Sentry,
            angry_motion: Motion::Sentry,
            hp: 30,
            notices_player: true,
            attack_throw_object: Some(SpeciesId::FIREBALL),
            attack_throw_offset: Vec3::new(0.0, 1.0, 0.0),
            collision_box: CollisionBox::new(Vec3::splat(-0.4), Vec3::new(0.4, 0.8, 0.4)),
            sound: Some("mob-dungeonmaster-env"),
            ..base(SpeciesId::DUNGEON_MASTER)
        },
        Species {
            name: "fireball",
            level: MobLevel::Destructive,
            motion: Motion::Constant,
            angry_motion: Motion::Constant,
            motion_type: MotionType::Fly,
            hp: 1,
            lifetime: 10.0,
            contact_explosion_diameter: 3,
            ..base(SpeciesId::FIREBALL)
        },
        Species {
            name: "arrow",
            motion: Motion::Thrown,
            angry_motion: Motion::Thrown,
            motion_type: MotionType::Fly,
            hp: 1,
            lifetime: 20.0,
            attack_mob_damage: 5,
            attack_mob_range: 1.0,
            contact_drop_item: Some(InventoryItem::craft("arrow", 1)),
            ..base(SpeciesId::ARROW)
        },
        Species {
            name: "snowball",
            motion: Motion::Thrown,
            angry_motion: Motion::Thrown,
            motion_type: MotionType::Fly,
            hp: 1,
            lifetime: 20.0,
            contact_place_node: Some(CONTENT_SNOW),
            ..base(SpeciesId::SNOWBALL)
        },
        Species {
            name: "deer",
            punch_action: PunchAction::Harm,
            motion: Motion::Wander,
            angry_motion: Motion::Wander,
            hp: 15,
            notices_player: true,
            dropped_item: Some(InventoryItem::craft("meat", 1)),
            collision_box: CollisionBox::new(Vec3::new(-0.4, 0.0, -0.4), Vec3::new(0.4, 1.4, 0.4)),
            spawn: Some(SpawnRule {
                ground: CONTENT_GRASS,
                near: None,
                night_only: false,
                chance: 3000,
            }),
            ..base(SpeciesId::DEER)
        },
        Species {
            name: "sheep",
            punch_action: PunchAction::Harm,
            motion: Motion::Wander,
            angry_motion: Motion::Wander,
            hp: 10,
            special_drop: Some(SpecialDrop {
                item: InventoryItem::Material {
                    content: CONTENT_WOOL,
                    count: 1,
                },
                count: 1,
                max: 3,
                tool: ToolType::Shear,
            }),
            sound: Some("mob-sheep-env"),
            spawn: Some(SpawnRule {
                ground: CONTENT_GRASS,
                near: None,
                night_only: false,
                chance: 2000,
            }),
            ..base(SpeciesId::SHEEP)
        },
        Species {
            name: "fish",
            punch_action: PunchAction::Pickup,
            motion: Motion::Wander,
            angry_motion: Motion::Wander,
            motion_type: MotionType::Swim,
            hp: 5,
            dropped_item: Some(InventoryItem::craft("fish", 1)),
            spawn: Some(SpawnRule {
                ground: CONTENT_WATERSOURCE,
                near: None,
                night_only: false,
                chance: 1000,
            }),
            ..base(SpeciesId::FISH)
        },
        Species {
            name: "shark",
            level: MobLevel::Aggressive,
            punch_action: PunchAction::Harm,
            motion: Motion::Wander,
            angry_motion: Motion::Seeker,
            motion_type: MotionType::Swim,
            hp: 20,
            notices_player: true,
            ..base(SpeciesId::SHARK)
        },
        Species {
            name: "wolf",
            level: MobLevel::Aggressive,
            punch_action: PunchAction::Harm,
            motion: Motion::Wander,
            angry_motion: Motion::Seeker,
            hp: 20,
            notices_player: true,
            tamed_mob: Some(SpeciesId::TAMED_WOLF),
            taming_difficulty: 4,
            sound: Some("mob-wolf-env"),
            ..base(SpeciesId::WOLF)
        },
        Species {
            name: "tamed_wolf",
            punch_action: PunchAction::Harm,
            motion: Motion::Follow,
            angry_motion: Motion::Follow,
            hp: 20,
            ..base(SpeciesId::TAMED_WOLF)
        },
    ]
}

/// Immutable lookup from species id to its template.
#[derive(Debug, Clone)]
pub struct SpeciesTable {
    species: BTreeMap<SpeciesId, Species>,
    fallback: Species,
}

impl SpeciesTable {
    /// Table with every built-in species.
    pub fn builtin() -> Self {
        Self::from_species(builtin_species())
    }

    pub fn from_species(species: impl IntoIterator<Item = Species>) -> Self {
        Self {
            species: species.into_iter().map(|s| (s.id, s)).collect(),
            fallback: Species::inert(SpeciesId::IGNORE),
        }
    }

    /// Template for `id`, or the inert fallback when unknown.
    pub fn get(&self, id: SpeciesId) -> &Species {
        self.species.get(&id).unwrap_or(&self.fallback)
    }

    pub fn contains(&self, id: SpeciesId) -> bool {
        self.species.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Species> {
        self.species.values()
    }

    /// Species carrying an ambient spawn rule, in id order.
    pub fn spawnable(&self) -> impl Iterator<Item = (&Species, SpawnRule)> {
        self.species
            .values()
            .filter_map(|s| s.spawn.map(|rule| (s, rule)))
    }
}

impl Default for SpeciesTable {
    fn default() -> Self {
        Self::builtin()
    }
}
