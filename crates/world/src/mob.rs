//! Mob behavior engine.
//!
//! Per-tick behavior of species-driven entities: lifetime, idle suppression,
//! environment damage, disturbance tracking, ranged and melee attacks,
//! grid pathing and projectile flight. Everything random goes through the
//! caller's RNG so a seeded run replays exactly.

use glam::{IVec3, Vec3};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use voxsim_core::{float_to_node, node_center, Inventory, InventoryItem, ToolFeatures, ToolType};

use crate::content::{
    content_features, CONTENT_AIR, CONTENT_BORDERSTONE, CONTENT_IGNORE, CONTENT_WATERSOURCE,
};
use crate::entity::{
    AmbientEvent, EntityBase, EntityCommand, Observer, PunchOutcome,
    ServerEntity, StepContext,
};
use crate::error::StaticDataError;
use crate::species::{
    Motion, MobLevel, MotionType, PunchAction, SpecialDrop, Species, SpeciesId, SpeciesTable,
};
use crate::storage::BlockStore;

/// Observers farther than this leave a mob completely idle.
pub const IDLE_SKIP_DISTANCE: f32 = 32.0;
/// Between this and [`IDLE_SKIP_DISTANCE`] movement runs one tick in five.
pub const IDLE_THROTTLE_DISTANCE: f32 = 16.0;
/// Interval between environment damage checks.
pub const ENV_DAMAGE_INTERVAL: f32 = 1.0;
/// Base delay between ambient sounds.
pub const SOUND_COOLDOWN: f32 = 30.0;
/// Interval between disturbance rescans.
pub const DISTURB_RESCAN_INTERVAL: f32 = 5.0;
/// Observers within this distance always disturb.
pub const DISTURB_CERTAIN_DISTANCE: f32 = 8.0;
/// Observers within this distance may disturb; beyond it a disturber is dropped.
pub const DISTURB_DISTANCE: f32 = 16.0;
/// Projectile launch speed in nodes per second.
pub const PROJECTILE_SPEED: f32 = 10.0;
/// Length of the shooting animation.
pub const SHOOT_DURATION: f32 = 1.5;
/// Constant sink rate of thrown projectiles in nodes per second.
pub const THROWN_SINK_SPEED: f32 = 0.1;
/// Sentries stay within this distance of where they were created.
pub const SENTRY_RADIUS: f32 = 10.0;
/// Followers stop once this close to their observer.
pub const FOLLOW_STOP_DISTANCE: f32 = 2.0;
/// Blast protection margin around an explosion cuboid.
pub const BORDERSTONE_MARGIN: i32 = 5;
/// Wear added to a tool by punching a mob.
pub const PUNCH_WEAR: u16 = 655;
/// Minimum movement before a position update is sent.
pub const POSITION_SEND_THRESHOLD: f32 = 0.05;

const MOB_STATIC_VERSION: u8 = 0;
const INITIAL_DISTURB_TIMER: f32 = 100_000.0;

#[derive(Debug, Serialize, Deserialize)]
struct MobStaticData {
    pos: Vec3,
    species: SpeciesId,
    yaw: f32,
    speed: Vec3,
    age: f32,
    hp: u8,
    shooting: bool,
}

/// Vertical preference chosen before candidate cells are filtered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vertical {
    Any,
    Down,
    Up,
}

/// Relative position of the disturbing observer.
#[derive(Debug, Clone, Copy)]
struct Disturber {
    target: Vec3,
    distance: f32,
    norm: Vec3,
    yaw_deg: f32,
}

impl Disturber {
    fn new(from: Vec3, target: Vec3) -> Self {
        let offset = target - from;
        let norm = offset.try_normalize().unwrap_or(Vec3::Y);
        Self {
            target,
            distance: offset.length(),
            norm,
            yaw_deg: yaw_degrees(norm),
        }
    }
}

/// Per-instance state of a mob or projectile.
#[derive(Debug, Clone, PartialEq)]
pub struct MobEntity {
    /// Species template key
    pub species: SpeciesId,
    /// Velocity for projectiles, in nodes per second
    pub speed: Vec3,
    /// Position last broadcast to clients
    pub last_sent_position: Vec3,
    /// Position the mob moved away from last
    pub old_pos: Vec3,
    /// Position at creation; sentries stay near it
    pub initial_pos: Vec3,
    /// Heading in degrees, wrapped to [-180, 180)
    pub yaw: f32,
    pub falling: bool,
    /// Grid cell the mob is currently walking to
    pub next_pos: Option<IVec3>,
    pub age: f32,
    pub hp: u8,
    pub angry: bool,
    /// Accrued special drops
    pub special_count: u16,
    /// Name of the observer the mob reacts to
    pub disturbing_observer: Option<String>,
    /// Seconds since the last disturbance
    pub disturb_timer: f32,
    pub random_disturb_timer: f32,
    pub walk_around: bool,
    pub walk_around_timer: f32,
    pub shoot_reload_timer: f32,
    pub shooting: bool,
    pub shooting_timer: f32,
    pub shoot_y: f32,
    pub sound_timer: f32,
    pub env_damage_timer: f32,
    /// Remaining taming attempts bound; success is one in this
    pub taming_counter: u8,
}

impl MobEntity {
    /// Fresh mob of `species` created at `pos`.
    pub fn new(species: &Species, pos: Vec3) -> Self {
        Self {
            species: species.id,
            speed: Vec3::ZERO,
            last_sent_position: pos,
            old_pos: pos,
            initial_pos: pos,
            yaw: 0.0,
            falling: false,
            next_pos: None,
            age: 0.0,
            hp: species.hp,
            angry: false,
            special_count: species.special_drop.as_ref().map_or(0, |d| d.max),
            disturbing_observer: None,
            disturb_timer: INITIAL_DISTURB_TIMER,
            random_disturb_timer: 0.0,
            walk_around: false,
            walk_around_timer: 0.0,
            shoot_reload_timer: 0.0,
            shooting: false,
            shooting_timer: 0.0,
            shoot_y: 0.0,
            sound_timer: SOUND_COOLDOWN,
            env_damage_timer: 0.0,
            taming_counter: species.taming_difficulty.max(1),
        }
    }

    /// Motion strategy currently in effect.
    pub fn motion(&self, species: &Species) -> Motion {
        if self.angry {
            species.angry_motion
        } else {
            species.motion
        }
    }

    /// Advance one tick.
    pub fn step(&mut self, base: &mut EntityBase, ctx: &mut StepContext<'_>) {
        let table = ctx.species;
        let species = table.get(self.species);
        let dtime = ctx.dtime;

        self.age += dtime;
        if species.lifetime > 0.0
            && self.age >= species.lifetime
            && (!species.notices_player || self.disturbing_observer.is_none())
        {
            debug!(id = base.id, species = species.name, age = self.age, "Mob expired");
            base.removed = true;
            return;
        }

        let mut skip_movement = false;
        if !species.is_projectile() && self.disturbing_observer.is_none() {
            match nearest_observer(base.pos, ctx.observers) {
                None => return,
                Some((_, dist)) if dist > IDLE_SKIP_DISTANCE => return,
                Some((_, dist)) if dist > IDLE_THROTTLE_DISTANCE => {
                    skip_movement = ctx.rng.gen_range(0..5) != 0;
                }
                Some(_) => {}
            }
        }

        if !species.is_projectile() {
            self.step_environment(base, species, ctx);
            if base.removed {
                return;
            }
            self.step_sound(base, species, ctx);
        }

        if let Some(drop) = &species.special_drop {
            if self.special_count < drop.max && ctx.rng.gen_range(0..=50) == 0 {
                self.special_count += 1;
            }
        }

        let disturber = if species.notices_player {
            self.step_disturbance(base, ctx)
        } else {
            None
        };

        if species.notices_player && !self.falling {
            self.step_ranged_attack(base, species, disturber.as_ref(), ctx);
        }

        if species.attack_mob_damage > 0 && self.step_melee(base, species, ctx) {
            base.removed = true;
            return;
        }

        if !skip_movement {
            self.step_motion(base, species, disturber.as_ref(), ctx);
            if base.removed {
                return;
            }
        }

        if ctx.send_recommended
            && base.pos.distance(self.last_sent_position) > POSITION_SEND_THRESHOLD
        {
            self.send_position(base);
        }
    }

    fn step_environment(&mut self, base: &mut EntityBase, species: &Species, ctx: &mut StepContext<'_>) {
        self.env_damage_timer += ctx.dtime;
        if self.env_damage_timer < ENV_DAMAGE_INTERVAL {
            return;
        }
        self.env_damage_timer -= ENV_DAMAGE_INTERVAL;
        let content = ctx.map.get_node(float_to_node(base.pos));
        if content == CONTENT_IGNORE {
            return;
        }
        let in_liquid = content_features(content).liquid;
        let swimmer = species.motion_type == MotionType::Swim;
        if swimmer != in_liquid {
            self.do_damage(base, 1);
        }
    }

    fn step_sound(&mut self, base: &EntityBase, species: &Species, ctx: &mut StepContext<'_>) {
        let Some(name) = species.sound else {
            return;
        };
        self.sound_timer -= ctx.dtime;
        if self.sound_timer <= 0.0 {
            ctx.events.push(AmbientEvent::Sound {
                pos: base.pos,
                name,
            });
            self.sound_timer = SOUND_COOLDOWN + ctx.rng.gen_range(0.0..SOUND_COOLDOWN);
        }
    }

    fn step_disturbance(
        &mut self,
        base: &EntityBase,
        ctx: &mut StepContext<'_>,
    ) -> Option<Disturber> {
        self.random_disturb_timer += ctx.dtime;
        if self.random_disturb_timer >= DISTURB_RESCAN_INTERVAL {
            self.random_disturb_timer = 0.0;
            let current_lost = match &self.disturbing_observer {
                None => true,
                Some(name) => ctx
                    .observers
                    .iter()
                    .find(|o| &o.name == name)
                    .map_or(true, |o| o.pos.distance(base.pos) > DISTURB_DISTANCE),
            };
            if current_lost {
                self.disturbing_observer = None;
                for observer in ctx.observers {
                    let dist = observer.pos.distance(base.pos);
                    if dist < DISTURB_DISTANCE
                        && (dist < DISTURB_CERTAIN_DISTANCE || ctx.rng.gen_range(0..3) == 0)
                    {
                        debug!(id = base.id, observer = %observer.name, dist, "Mob disturbed");
                        self.disturbing_observer = Some(observer.name.clone());
                        self.disturb_timer = 0.0;
                        break;
                    }
                }
            }
        }

        let disturber = self.disturbing_observer.as_ref().and_then(|name| {
            ctx.observers
                .iter()
                .find(|o| &o.name == name)
                .map(|o| Disturber::new(base.pos, o.pos))
        });
        if disturber.is_none() {
            self.angry = false;
        }
        self.disturb_timer += ctx.dtime;
        disturber
    }

    fn step_ranged_attack(
        &mut self,
        base: &mut EntityBase,
        species: &Species,
        disturber: Option<&Disturber>,
        ctx: &mut StepContext<'_>,
    ) {
        let Some(projectile) = species.attack_throw_object else {
            return;
        };
        let dtime = ctx.dtime;

        self.shooting_timer -= dtime;
        if self.shooting && self.shooting_timer <= 0.0 {
            self.shooting = false;
            let yaw = self.yaw.to_radians();
            let dir = Vec3::new(yaw.cos(), self.shoot_y, yaw.sin()).normalize_or_zero();
            let pos = base.pos + species.attack_throw_offset;
            debug!(id = base.id, projectile = %projectile, "Mob fires projectile");
            ctx.spawned.push(ServerEntity::projectile(
                pos,
                dir * PROJECTILE_SPEED,
                ctx.species.get(projectile),
            ));
        }

        self.shoot_reload_timer += dtime;
        let reload = if self.disturb_timer <= 15.0 { 3.0 } else { 15.0 };
        if !self.shooting
            && self.shoot_reload_timer >= reload
            && self.next_pos.is_none()
            && self.disturb_timer <= 60.0
        {
            self.shoot_y = 0.0;
            match disturber {
                Some(d)
                    if self.disturb_timer < 60.0
                        && d.distance < DISTURB_DISTANCE
                        && d.norm.y.abs() < 0.8 =>
                {
                    self.yaw = d.yaw_deg;
                    self.send_position(base);
                    self.shoot_y += d.norm.y;
                }
                _ => {
                    self.shoot_y = 0.01 * ctx.rng.gen_range(-30..=10) as f32;
                }
            }
            self.shoot_reload_timer = 0.0;
            self.shooting = true;
            self.shooting_timer = SHOOT_DURATION;
            base.send(
                EntityCommand::Shooting {
                    duration: self.shooting_timer + 0.1,
                },
                false,
            );
        }
    }

    /// Hit the nearest eligible entity in range. Returns true on a hit.
    fn step_melee(&mut self, base: &EntityBase, species: &Species, ctx: &mut StepContext<'_>) -> bool {
        let table = ctx.species;
        let targets = ctx
            .others
            .objects_in_radius(base.pos, species.attack_mob_range);
        for (id, _) in targets {
            let Some(target) = ctx.others.get_mut(id) else {
                continue;
            };
            let eligible = match target.as_mob() {
                Some(mob) => mob.species != self.species && !table.get(mob.species).is_projectile(),
                None => true,
            };
            if !eligible {
                continue;
            }
            debug!(id = base.id, target = id, damage = species.attack_mob_damage, "Melee hit");
            target.damage(u16::from(species.attack_mob_damage));
            return true;
        }
        false
    }

    fn step_motion(
        &mut self,
        base: &mut EntityBase,
        species: &Species,
        disturber: Option<&Disturber>,
        ctx: &mut StepContext<'_>,
    ) {
        let motion = self.motion(species);
        if !matches!(motion, Motion::Static | Motion::Thrown | Motion::Constant) {
            self.step_walk_around(species, motion, disturber.is_some(), ctx.rng, ctx.dtime);
            self.step_interpolation(base, species, motion, disturber.is_some(), ctx.dtime);
        }

        let pos = base.pos;
        match motion {
            Motion::Static => {}
            Motion::Wander => self.select_path(pos, species, &*ctx.map, ctx.rng, |_| true),
            Motion::Seeker => match disturber {
                Some(d) => self.path_toward(pos, d.target, species, ctx),
                None => self.select_path(pos, species, &*ctx.map, ctx.rng, |_| true),
            },
            Motion::Sentry => {
                let home = self.initial_pos;
                let inside = pos.distance(home) <= SENTRY_RADIUS;
                let current = pos.distance(home);
                self.select_path(pos, species, &*ctx.map, ctx.rng, move |delta| {
                    let next = pos + delta.as_vec3();
                    if inside {
                        next.distance(home) <= SENTRY_RADIUS
                    } else {
                        next.distance(home) < current
                    }
                });
            }
            Motion::Follow => match nearest_observer(pos, ctx.observers) {
                Some((_, dist)) if dist <= FOLLOW_STOP_DISTANCE => self.next_pos = None,
                Some((target, _)) => self.path_toward(pos, target, species, ctx),
                None => {}
            },
            Motion::Thrown => {
                let before = base.pos;
                base.pos += self.speed * ctx.dtime;
                base.pos.y -= THROWN_SINK_SPEED * ctx.dtime;
                self.projectile_contact(base, before, species, ctx);
            }
            Motion::Constant => {
                let before = base.pos;
                base.pos += self.speed * ctx.dtime;
                self.projectile_contact(base, before, species, ctx);
            }
        }
    }

    fn path_toward(&mut self, pos: Vec3, target: Vec3, species: &Species, ctx: &mut StepContext<'_>) {
        let current = pos.distance(target);
        self.select_path(pos, species, &*ctx.map, ctx.rng, move |delta| {
            (pos + delta.as_vec3()).distance(target) <= current
        });
    }

    fn step_walk_around(
        &mut self,
        species: &Species,
        motion: Motion,
        disturbed: bool,
        rng: &mut StdRng,
        dtime: f32,
    ) {
        let chasing = disturbed && motion == Motion::Seeker;
        self.walk_around_timer -= dtime;
        if self.walk_around_timer <= 0.0 {
            if species.motion_type == MotionType::Fly || chasing {
                if !self.walk_around {
                    self.walk_around_timer = 0.2;
                    self.walk_around = true;
                }
            } else {
                self.walk_around = !self.walk_around;
                if self.walk_around {
                    self.walk_around_timer = 0.1 * rng.gen_range(5..=15) as f32;
                } else {
                    self.walk_around_timer = 0.1 * rng.gen_range(20..=40) as f32;
                }
            }
        } else if self.walk_around_timer > 10.0 {
            self.walk_around_timer = 0.2;
            self.walk_around = true;
        }
    }

    fn step_interpolation(
        &mut self,
        base: &mut EntityBase,
        species: &Species,
        motion: Motion,
        disturbed: bool,
        dtime: f32,
    ) {
        let Some(next) = self.next_pos else {
            return;
        };
        let target = node_center(next);
        let diff = target - base.pos;

        let mut speed = 1.0;
        if motion == Motion::Seeker && species.level >= MobLevel::Aggressive && disturbed {
            speed = 2.0;
        }
        if self.falling {
            speed = 3.0;
        }

        let mut step = diff.normalize_or_zero() * dtime * speed;
        let mut arrived = false;
        if step.length() >= diff.length() {
            step = diff;
            arrived = true;
        }
        base.pos += step;
        if step.x != 0.0 || step.z != 0.0 {
            self.yaw = yaw_degrees(step);
        }
        if arrived || base.pos.distance(target) < 0.1 {
            self.next_pos = None;
        }
    }

    /// Choose the next grid cell. `accept` filters candidate offsets.
    fn select_path(
        &mut self,
        pos: Vec3,
        species: &Species,
        map: &dyn BlockStore,
        rng: &mut StdRng,
        accept: impl Fn(IVec3) -> bool,
    ) {
        let here = float_to_node(pos);
        let mut vertical = Vertical::Any;
        match species.motion_type {
            MotionType::Walk => {
                if self.next_pos.is_none() {
                    let below = here - IVec3::Y;
                    self.falling = check_free(map, species, below);
                    if self.falling {
                        self.old_pos = pos;
                        self.next_pos = Some(below);
                    }
                }
            }
            MotionType::Fly | MotionType::FlyLow | MotionType::Swim => {
                if self.next_pos.is_none() {
                    let (scan, too_high, too_low) = if species.motion_type == MotionType::Fly {
                        (14, 12, 8)
                    } else {
                        (6, 5, 2)
                    };
                    let mut free_below = 0;
                    let mut probe = here;
                    while free_below < scan {
                        probe.y -= 1;
                        if !check_free(map, species, probe) {
                            break;
                        }
                        free_below += 1;
                    }
                    if free_below > too_high && check_free(map, species, here - IVec3::Y) {
                        vertical = Vertical::Down;
                    } else if free_below < too_low && check_free(map, species, here + IVec3::Y) {
                        vertical = Vertical::Up;
                    }
                }
            }
        }

        if !self.walk_around || self.next_pos.is_some() {
            return;
        }

        let mut candidates: Vec<IVec3> = neighbour_offsets()
            .filter(|d| match vertical {
                Vertical::Any => true,
                Vertical::Down => d.y <= 0,
                Vertical::Up => d.y >= 0,
            })
            .filter(|d| accept(*d))
            .collect();
        candidates.shuffle(rng);

        let previous = float_to_node(self.old_pos);
        let walker = species.motion_type == MotionType::Walk;
        for delta in candidates {
            let cell = here + delta;
            if cell == previous {
                continue;
            }
            let usable = if walker {
                check_free(map, species, cell) && check_walkable(map, cell)
            } else {
                check_free(map, species, cell)
            };
            if usable {
                self.old_pos = pos;
                self.next_pos = Some(cell);
                return;
            }
        }
    }

    fn projectile_contact(
        &mut self,
        base: &mut EntityBase,
        before: Vec3,
        species: &Species,
        ctx: &mut StepContext<'_>,
    ) {
        let cell = float_to_node(base.pos);
        if check_free(&*ctx.map, species, cell) {
            return;
        }
        debug!(id = base.id, species = species.name, ?cell, "Projectile contact");
        if species.contact_explosion_diameter > 0 {
            explode(ctx.map, cell, species.contact_explosion_diameter, ctx.events);
        }
        let last_free = float_to_node(before);
        if let Some(node) = species.contact_place_node {
            if content_features(ctx.map.get_node(last_free)).buildable_to {
                ctx.map.set_node(last_free, node);
            }
        }
        if let Some(item) = &species.contact_drop_item {
            ctx.spawned
                .push(ServerEntity::item(node_center(last_free), item.clone()));
        }
        base.removed = true;
    }

    /// Queue a position update and remember what was sent.
    pub fn send_position(&mut self, base: &mut EntityBase) {
        self.last_sent_position = base.pos;
        base.send(
            EntityCommand::UpdatePosition {
                pos: base.pos,
                yaw: self.yaw,
            },
            false,
        );
    }

    /// Subtract hit points; the mob is removed when they run out.
    pub fn do_damage(&mut self, base: &mut EntityBase, amount: u16) {
        if amount >= u16::from(self.hp) {
            debug!(id = base.id, amount, "Mob killed");
            self.hp = 0;
            base.removed = true;
        } else {
            self.hp -= amount as u8;
        }
        base.send(EntityCommand::Damage { amount }, false);
    }

    /// React to a punch from `puncher` along `dir`.
    pub fn punch(
        &mut self,
        base: &mut EntityBase,
        species: &Species,
        tool: ToolFeatures,
        dir: Vec3,
        puncher: &str,
        map: &dyn BlockStore,
    ) -> PunchOutcome {
        if species.punch_action == PunchAction::Ignore {
            return PunchOutcome::default();
        }
        debug!(id = base.id, species = species.name, puncher, "Mob punched");

        if let Some(drop) = &species.special_drop {
            if drop.tool == ToolType::None || drop.tool == tool.tool_type {
                return PunchOutcome {
                    wear: 0,
                    item: self.harvest_special(drop),
                };
            }
        }

        match species.punch_action {
            PunchAction::Ignore => {}
            PunchAction::Harm => {
                self.next_pos = None;
                self.angry = true;
                self.disturbing_observer = Some(puncher.to_string());
                self.disturb_timer = 0.0;
                self.yaw = wrap_degrees(yaw_degrees(dir) + 180.0);
                let knocked = base.pos + dir;
                if check_free(map, species, float_to_node(knocked)) {
                    base.pos = knocked;
                }
                self.send_position(base);
                self.do_damage(base, punch_damage(tool));
            }
            PunchAction::Die => {
                self.hp = 0;
                base.removed = true;
            }
            PunchAction::Pickup => {
                base.removed = true;
            }
        }

        let item = if base.removed {
            species.dropped_item.clone()
        } else {
            None
        };
        PunchOutcome {
            wear: PUNCH_WEAR,
            item,
        }
    }

    fn harvest_special(&mut self, drop: &SpecialDrop) -> Option<InventoryItem> {
        if self.special_count < drop.count {
            return None;
        }
        self.special_count -= drop.count;
        Some(drop.item.clone())
    }

    /// Feed the wielded item to a tameable mob. Returns true once food was consumed.
    pub fn right_click(
        &mut self,
        base: &mut EntityBase,
        inventory: &mut dyn Inventory,
        table: &SpeciesTable,
        rng: &mut StdRng,
        spawned: &mut Vec<ServerEntity>,
    ) -> bool {
        let species = table.get(self.species);
        let Some(tamed) = species.tamed_mob else {
            return false;
        };
        if !inventory.wielded().is_some_and(InventoryItem::is_edible) {
            return false;
        }
        if !inventory.consume_wielded(1) {
            return false;
        }

        let counter = self.taming_counter.max(1);
        if rng.gen_range(0..counter) == 0 {
            debug!(id = base.id, from = species.name, to = %tamed, "Mob tamed");
            let mut replacement = ServerEntity::mob(base.pos, table.get(tamed));
            if let Some(mob) = replacement.as_mob_mut() {
                mob.yaw = self.yaw;
            }
            spawned.push(replacement);
            base.removed = true;
        } else {
            self.taming_counter = (counter - 1).max(1);
        }
        true
    }

    /// Versioned static payload.
    pub fn static_data(&self, base: &EntityBase) -> Result<Vec<u8>, StaticDataError> {
        let data = MobStaticData {
            pos: base.pos,
            species: self.species,
            yaw: self.yaw,
            speed: self.speed,
            age: self.age,
            hp: self.hp,
            shooting: self.shooting,
        };
        let mut out = vec![MOB_STATIC_VERSION];
        out.extend(bincode::serialize(&data)?);
        Ok(out)
    }

    /// Rebuild from a static payload. Returns the mob and its position.
    pub fn from_static_data(
        data: &[u8],
        table: &SpeciesTable,
    ) -> Result<(Self, Vec3), StaticDataError> {
        let (&version, body) = data.split_first().ok_or(StaticDataError::Empty)?;
        if version != MOB_STATIC_VERSION {
            return Err(StaticDataError::UnsupportedVersion(version));
        }
        let data: MobStaticData = bincode::deserialize(body)?;
        if !table.contains(data.species) {
            return Err(StaticDataError::UnknownSpecies(data.species));
        }
        let mut mob = Self::new(table.get(data.species), data.pos);
        mob.yaw = data.yaw;
        mob.speed = data.speed;
        mob.age = data.age;
        mob.hp = data.hp;
        mob.shooting = data.shooting;
        Ok((mob, data.pos))
    }
}

/// Damage dealt by a punch with `tool`.
pub fn punch_damage(tool: ToolFeatures) -> u16 {
    let h = tool.hardness;
    match tool.tool_type {
        ToolType::Sword => 4 * (h / 100 + 1),
        ToolType::Spear => 3 * (h / 100 + 1),
        ToolType::Club => 3 * (h / 150 + 1),
        ToolType::Axe | ToolType::Pick => 2 * (h / 200 + 1),
        _ => 2,
    }
}

/// Whether a mob of `species` fits with its origin at `cell`.
///
/// Every cell of the size box must be open (water source for swimmers) and the
/// node below the origin must be jumpable.
pub fn check_free(map: &dyn BlockStore, species: &Species, cell: IVec3) -> bool {
    let size = species.size_nodes();
    let swimmer = species.motion_type == MotionType::Swim;
    for dy in 0..size.y {
        for dz in 0..size.z {
            for dx in 0..size.x {
                let content = map.get_node(cell + IVec3::new(dx, dy, dz));
                let open = if swimmer {
                    content == CONTENT_WATERSOURCE
                } else {
                    !content_features(content).walkable
                };
                if !open {
                    return false;
                }
            }
        }
    }
    content_features(map.get_node(cell - IVec3::Y)).jumpable
}

/// Whether the node below `cell` can be stood on.
pub fn check_walkable(map: &dyn BlockStore, cell: IVec3) -> bool {
    let content = map.get_node(cell - IVec3::Y);
    let features = content_features(content);
    content != CONTENT_AIR && !features.liquid && features.walkable
}

/// Blow a cuboid of `diameter` nodes centred on `center` into air.
///
/// A borderstone within the cuboid plus a margin suppresses the whole blast.
/// Returns false when suppressed.
pub fn explode(
    map: &mut dyn BlockStore,
    center: IVec3,
    diameter: u8,
    events: &mut Vec<AmbientEvent>,
) -> bool {
    let size = i32::from(diameter);
    let min = center - IVec3::splat(size / 2);
    let max = min + IVec3::splat(size - 1);

    for x in (min.x - BORDERSTONE_MARGIN)..=(max.x + BORDERSTONE_MARGIN) {
        for y in (min.y - BORDERSTONE_MARGIN)..=(max.y + BORDERSTONE_MARGIN) {
            for z in (min.z - BORDERSTONE_MARGIN)..=(max.z + BORDERSTONE_MARGIN) {
                if map.get_node(IVec3::new(x, y, z)) == CONTENT_BORDERSTONE {
                    debug!(?center, "Explosion suppressed by borderstone");
                    events.push(AmbientEvent::Explosion {
                        center,
                        diameter,
                        suppressed: true,
                    });
                    return false;
                }
            }
        }
    }

    for x in min.x..=max.x {
        for y in min.y..=max.y {
            for z in min.z..=max.z {
                let cell = IVec3::new(x, y, z);
                if map.get_node(cell) != CONTENT_IGNORE {
                    map.set_node(cell, CONTENT_AIR);
                }
            }
        }
    }
    events.push(AmbientEvent::Explosion {
        center,
        diameter,
        suppressed: false,
    });
    true
}

/// Nearest observer position and its distance.
fn nearest_observer(pos: Vec3, observers: &[Observer]) -> Option<(Vec3, f32)> {
    observers
        .iter()
        .map(|o| (o.pos, o.pos.distance(pos)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Candidate moves: one step in any direction, excluding pure vertical moves
/// and the eight triple diagonals.
fn neighbour_offsets() -> impl Iterator<Item = IVec3> {
    (-1..=1).flat_map(|dy| {
        (-1..=1).flat_map(move |dz| (-1..=1).map(move |dx| IVec3::new(dx, dy, dz)))
    })
    .filter(|d| !(d.x == 0 && d.z == 0))
    .filter(|d| !(d.x != 0 && d.y != 0 && d.z != 0))
}

fn yaw_degrees(dir: Vec3) -> f32 {
    wrap_degrees(dir.z.atan2(dir.x).to_degrees())
}

/// Wrap an angle into [-180, 180).
pub fn wrap_degrees(deg: f32) -> f32 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::CONTENT_WATER;
    use crate::registry::EntityRegistry;
    use crate::storage::MemoryBlockStore;
    use rand::SeedableRng;
    use voxsim_core::{BlockPos, PlayerInventory};

    fn store() -> MemoryBlockStore {
        let mut store = MemoryBlockStore::flat(16, 1);
        store.emerge_block(BlockPos::new(0, 0, 0));
        store
    }

    #[test]
    fn offsets_exclude_vertical_and_triple_diagonals() {
        let offsets: Vec<_> = neighbour_offsets().collect();
        assert_eq!(offsets.len(), 16);
        assert!(!offsets.contains(&IVec3::Y));
        assert!(!offsets.contains(&IVec3::new(1, 1, 1)));
        assert!(offsets.contains(&IVec3::Z));
        assert!(offsets.contains(&IVec3::new(1, -1, 0)));
    }

    #[test]
    fn wrap_degrees_stays_in_range() {
        assert_eq!(wrap_degrees(180.0), -180.0);
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(45.0), 45.0);
    }

    #[test]
    fn punch_damage_by_tool() {
        let sword = voxsim_core::tool_features("stone_sword");
        assert_eq!(punch_damage(sword), 8);
        assert_eq!(punch_damage(ToolFeatures::HAND), 2);
        let axe = voxsim_core::tool_features("steel_axe");
        assert_eq!(punch_damage(axe), 4);
        let club = voxsim_core::tool_features("flint_club");
        assert_eq!(punch_damage(club), 3);
    }

    #[test]
    fn free_and_walkable_checks() {
        let store = store();
        let table = SpeciesTable::builtin();
        let rat = table.get(SpeciesId::RAT);
        assert!(check_free(&store, rat, IVec3::new(3, 1, 3)));
        assert!(!check_free(&store, rat, IVec3::new(3, 0, 3)));
        assert!(check_walkable(&store, IVec3::new(3, 1, 3)));
        assert!(!check_walkable(&store, IVec3::new(3, 2, 3)));
        let fish = table.get(SpeciesId::FISH);
        assert!(!check_free(&store, fish, IVec3::new(3, 1, 3)));
    }

    #[test]
    fn explosion_clears_cuboid() {
        let mut store = MemoryBlockStore::flat(16, 8);
        store.emerge_block(BlockPos::new(0, 0, 0));
        let mut events = Vec::new();
        assert!(explode(&mut store, IVec3::new(5, 5, 5), 3, &mut events));
        assert_eq!(store.get_node(IVec3::new(4, 4, 4)), CONTENT_AIR);
        assert_eq!(store.get_node(IVec3::new(6, 6, 6)), CONTENT_AIR);
        assert_ne!(store.get_node(IVec3::new(7, 5, 5)), CONTENT_AIR);
        assert!(matches!(
            events[0],
            AmbientEvent::Explosion {
                suppressed: false,
                ..
            }
        ));
    }

    #[test]
    fn borderstone_suppresses_whole_blast() {
        let mut store = MemoryBlockStore::flat(16, 8);
        store.emerge_block(BlockPos::new(0, 0, 0));
        store.set_node(IVec3::new(11, 5, 5), CONTENT_BORDERSTONE);
        let mut events = Vec::new();
        assert!(!explode(&mut store, IVec3::new(5, 5, 5), 3, &mut events));
        assert_ne!(store.get_node(IVec3::new(5, 5, 5)), CONTENT_AIR);
        assert!(matches!(
            events[0],
            AmbientEvent::Explosion {
                suppressed: true,
                ..
            }
        ));
    }

    #[test]
    fn damage_kills_and_reports() {
        let table = SpeciesTable::builtin();
        let mut base = EntityBase::new(Vec3::ZERO);
        let mut mob = MobEntity::new(table.get(SpeciesId::RAT), Vec3::ZERO);
        mob.do_damage(&mut base, 3);
        assert_eq!(mob.hp, 2);
        assert!(!base.removed);
        mob.do_damage(&mut base, 2);
        assert_eq!(mob.hp, 0);
        assert!(base.removed);
        assert_eq!(base.take_messages().len(), 2);
    }

    #[test]
    fn pickup_punch_yields_dropped_item() {
        let table = SpeciesTable::builtin();
        let store = store();
        let rat = table.get(SpeciesId::RAT);
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(rat, base.pos);
        let outcome = mob.punch(&mut base, rat, ToolFeatures::HAND, Vec3::X, "alice", &store);
        assert!(base.removed);
        assert_eq!(outcome.item, Some(InventoryItem::craft("rat", 1)));
        assert_eq!(outcome.wear, PUNCH_WEAR);
    }

    #[test]
    fn special_drop_needs_matching_tool() {
        let table = SpeciesTable::builtin();
        let store = store();
        let sheep = table.get(SpeciesId::SHEEP);
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(sheep, base.pos);
        assert_eq!(mob.special_count, 3);

        let shears = voxsim_core::tool_features("steel_shears");
        let outcome = mob.punch(&mut base, sheep, shears, Vec3::X, "alice", &store);
        assert_eq!(outcome.wear, 0);
        assert!(outcome.item.is_some());
        assert_eq!(mob.special_count, 2);
        assert_eq!(mob.hp, sheep.hp);

        let outcome = mob.punch(&mut base, sheep, ToolFeatures::HAND, Vec3::X, "alice", &store);
        assert_eq!(outcome.wear, PUNCH_WEAR);
        assert!(mob.angry);
    }

    #[test]
    fn taming_consumes_food_until_success() {
        let table = SpeciesTable::builtin();
        let wolf = table.get(SpeciesId::WOLF);
        let mut base = EntityBase::new(Vec3::ZERO);
        let mut mob = MobEntity::new(wolf, Vec3::ZERO);
        let mut inventory = PlayerInventory::new(4);
        inventory.set_slot(0, Some(InventoryItem::craft("meat", 50)));
        let mut rng = StdRng::seed_from_u64(7);
        let mut spawned = Vec::new();

        let mut attempts = 0;
        while !base.removed {
            assert!(mob.right_click(&mut base, &mut inventory, &table, &mut rng, &mut spawned));
            attempts += 1;
            assert!(attempts <= 4, "counter bottoms out at one");
        }
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].as_mob().unwrap().species, SpeciesId::TAMED_WOLF);
        assert_eq!(inventory.slot(0).map(InventoryItem::count), Some(50 - attempts));
    }

    #[test]
    fn taming_rejects_inedible_items() {
        let table = SpeciesTable::builtin();
        let wolf = table.get(SpeciesId::WOLF);
        let mut base = EntityBase::new(Vec3::ZERO);
        let mut mob = MobEntity::new(wolf, Vec3::ZERO);
        let mut inventory = PlayerInventory::new(1);
        inventory.set_slot(0, Some(InventoryItem::craft("stick", 1)));
        let mut rng = StdRng::seed_from_u64(1);
        let mut spawned = Vec::new();
        assert!(!mob.right_click(&mut base, &mut inventory, &table, &mut rng, &mut spawned));
        assert_eq!(inventory.slot(0).map(InventoryItem::count), Some(1));
    }

    #[test]
    fn swimmer_out_of_water_takes_chip_damage() {
        let table = SpeciesTable::builtin();
        let mut store = store();
        let mut registry = EntityRegistry::new();
        let mut rng = StdRng::seed_from_u64(3);
        let mut spawned = Vec::new();
        let mut events = Vec::new();
        let observers = [Observer::new("alice", Vec3::new(4.0, 1.0, 4.0))];
        let fish = table.get(SpeciesId::FISH);
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(fish, base.pos);

        for _ in 0..11 {
            let mut ctx = StepContext {
                dtime: 0.1,
                send_recommended: false,
                map: &mut store,
                species: &table,
                observers: &observers,
                others: &mut registry,
                rng: &mut rng,
                spawned: &mut spawned,
                events: &mut events,
            };
            mob.step(&mut base, &mut ctx);
        }
        assert_eq!(mob.hp, fish.hp - 1);

        store.set_node(IVec3::new(3, 1, 3), CONTENT_WATER);
        mob.env_damage_timer = 0.0;
        for _ in 0..25 {
            let mut ctx = StepContext {
                dtime: 0.1,
                send_recommended: false,
                map: &mut store,
                species: &table,
                observers: &observers,
                others: &mut registry,
                rng: &mut rng,
                spawned: &mut spawned,
                events: &mut events,
            };
            mob.step(&mut base, &mut ctx);
        }
        assert_eq!(mob.hp, fish.hp - 1);
    }

    /// World, registry and RNG for driving single mobs by hand.
    struct Bench {
        store: MemoryBlockStore,
        table: SpeciesTable,
        registry: EntityRegistry,
        observers: Vec<Observer>,
        rng: StdRng,
        spawned: Vec<ServerEntity>,
        events: Vec<AmbientEvent>,
    }

    impl Bench {
        fn new(observers: Vec<Observer>, seed: u64) -> Self {
            Self {
                store: store(),
                table: SpeciesTable::builtin(),
                registry: EntityRegistry::new(),
                observers,
                rng: StdRng::seed_from_u64(seed),
                spawned: Vec::new(),
                events: Vec::new(),
            }
        }

        fn with_ctx<R>(&mut self, f: impl FnOnce(&mut StepContext<'_>) -> R) -> R {
            let mut ctx = StepContext {
                dtime: 0.1,
                send_recommended: false,
                map: &mut self.store,
                species: &self.table,
                observers: &self.observers,
                others: &mut self.registry,
                rng: &mut self.rng,
                spawned: &mut self.spawned,
                events: &mut self.events,
            };
            f(&mut ctx)
        }

        /// Ticks on which the walk-around timer moved, i.e. movement ran.
        fn moving_ticks(&mut self, mob: &mut MobEntity, base: &mut EntityBase, ticks: usize) -> usize {
            let mut moved = 0;
            for _ in 0..ticks {
                let before = mob.walk_around_timer;
                self.with_ctx(|ctx| mob.step(base, ctx));
                if mob.walk_around_timer != before {
                    moved += 1;
                }
            }
            moved
        }
    }

    fn alice(x: f32) -> Vec<Observer> {
        vec![Observer::new("alice", Vec3::new(x, 1.0, 3.0))]
    }

    #[test]
    fn mob_far_from_observers_stays_idle() {
        for observers in [alice(43.0), Vec::new()] {
            let mut bench = Bench::new(observers, 1);
            let rat = bench.table.get(SpeciesId::RAT).clone();
            let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
            let mut mob = MobEntity::new(&rat, base.pos);
            mob.walk_around_timer = 0.5;

            assert_eq!(bench.moving_ticks(&mut mob, &mut base, 30), 0);
            assert_eq!(mob.env_damage_timer, 0.0);
            assert_eq!(mob.sound_timer, SOUND_COOLDOWN);
            assert_eq!(base.pos, Vec3::new(3.0, 1.0, 3.0));
            assert!(mob.next_pos.is_none());
            assert!(mob.age > 2.9, "age still advances");
        }
    }

    #[test]
    fn mid_range_observer_throttles_movement() {
        let mut bench = Bench::new(alice(23.0), 2);
        let rat = bench.table.get(SpeciesId::RAT).clone();
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(&rat, base.pos);
        mob.walk_around_timer = 9.9;

        let moved = bench.moving_ticks(&mut mob, &mut base, 100);
        assert!((5..=40).contains(&moved), "moved on {moved} of 100 ticks");
        assert!(mob.env_damage_timer < ENV_DAMAGE_INTERVAL, "environment still checked");

        let mut bench = Bench::new(alice(10.0), 2);
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(&rat, base.pos);
        mob.walk_around_timer = 9.9;
        assert_eq!(bench.moving_ticks(&mut mob, &mut base, 100), 100);
    }

    /// One disturbance rescan of a fresh deer at (3, 1, 3); returns the disturber.
    fn rescan(observer_x: f32, current: Option<&str>, seed: u64) -> Option<String> {
        let mut bench = Bench::new(alice(observer_x), seed);
        let base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(bench.table.get(SpeciesId::DEER), base.pos);
        mob.disturbing_observer = current.map(str::to_string);
        mob.angry = current.is_some();
        mob.random_disturb_timer = DISTURB_RESCAN_INTERVAL;
        bench.with_ctx(|ctx| mob.step_disturbance(&base, ctx));
        assert_eq!(mob.random_disturb_timer, 0.0);
        if mob.disturbing_observer.is_none() {
            assert!(!mob.angry);
        }
        mob.disturbing_observer
    }

    #[test]
    fn close_observer_always_disturbs() {
        for seed in 0..30 {
            assert_eq!(rescan(8.0, None, seed).as_deref(), Some("alice"));
        }
    }

    #[test]
    fn mid_range_observer_disturbs_one_time_in_three() {
        let hits = (0..60)
            .filter(|&seed| rescan(15.0, None, seed).is_some())
            .count();
        assert!((10..=32).contains(&hits), "disturbed {hits} of 60");
    }

    #[test]
    fn distant_disturber_is_dropped() {
        for seed in 0..10 {
            assert_eq!(rescan(23.0, Some("alice"), seed), None);
            assert_eq!(rescan(23.0, None, seed), None);
            // Still within range: the current disturber is kept without a new roll.
            assert_eq!(rescan(15.0, Some("alice"), seed).as_deref(), Some("alice"));
        }
    }

    /// Cell chosen by one motion step of `species` from (8, 1, 8).
    fn next_cell(
        species: SpeciesId,
        observers: Vec<Observer>,
        seed: u64,
        setup: impl FnOnce(&mut MobEntity),
        disturber: Option<Vec3>,
    ) -> Option<IVec3> {
        let mut bench = Bench::new(observers, seed);
        let pos = Vec3::new(8.0, 1.0, 8.0);
        let mut base = EntityBase::new(pos);
        let mut mob = MobEntity::new(bench.table.get(species), pos);
        mob.walk_around = true;
        mob.walk_around_timer = 5.0;
        setup(&mut mob);
        let disturber = disturber.map(|target| Disturber::new(pos, target));
        bench.with_ctx(|ctx| {
            let table = ctx.species;
            let template = table.get(species);
            mob.step_motion(&mut base, template, disturber.as_ref(), ctx);
        });
        mob.next_pos
    }

    #[test]
    fn seeker_closes_in_on_disturber() {
        let target = Vec3::new(14.0, 1.0, 8.0);
        for seed in 0..20 {
            let cell = next_cell(SpeciesId::OERKKI, Vec::new(), seed, |_| {}, Some(target))
                .expect("open ground has a step toward the target");
            assert_eq!(cell.x, 9, "seed {seed} picked {cell}");
            assert_eq!(cell.y, 1);
        }
    }

    #[test]
    fn sentry_outside_radius_heads_home() {
        for seed in 0..20 {
            let cell = next_cell(
                SpeciesId::DUNGEON_MASTER,
                Vec::new(),
                seed,
                |mob| mob.initial_pos = Vec3::new(-6.0, 1.0, 8.0),
                None,
            )
            .expect("a step toward home exists");
            assert_eq!(cell.x, 7, "seed {seed} picked {cell}");
        }
    }

    #[test]
    fn sentry_inside_radius_roams_within_it() {
        let home = Vec3::new(0.0, 1.0, 8.0);
        let cells: Vec<IVec3> = (0..30)
            .filter_map(|seed| {
                next_cell(SpeciesId::DUNGEON_MASTER, Vec::new(), seed, |mob| mob.initial_pos = home, None)
            })
            .collect();
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|c| c.as_vec3().distance(home) <= SENTRY_RADIUS));
        assert!(cells.iter().any(|c| c.x == 9), "free to step away from home");
    }

    #[test]
    fn follower_approaches_and_stops_near_observer() {
        let far = vec![Observer::new("alice", Vec3::new(12.0, 1.0, 8.0))];
        for seed in 0..20 {
            let cell = next_cell(SpeciesId::TAMED_WOLF, far.clone(), seed, |_| {}, None)
                .expect("a step toward the observer exists");
            assert_eq!(cell.x, 9, "seed {seed} picked {cell}");
        }

        let near = vec![Observer::new("alice", Vec3::new(9.0, 1.0, 8.0))];
        let cell = next_cell(
            SpeciesId::TAMED_WOLF,
            near,
            0,
            |mob| mob.next_pos = Some(IVec3::new(8, 1, 9)),
            None,
        );
        assert_eq!(cell, None);
    }

    /// Offsets a free-roaming mob of `species` picks at `height` over many seeds.
    fn wander_offsets(store: &MemoryBlockStore, species: &Species, height: i32) -> Vec<IVec3> {
        (0..40u64)
            .filter_map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let pos = Vec3::new(8.0, height as f32, 8.0);
                let mut mob = MobEntity::new(species, pos);
                mob.walk_around = true;
                mob.select_path(pos, species, store, &mut rng, |_| true);
                mob.next_pos.map(|cell| cell - float_to_node(pos))
            })
            .collect()
    }

    fn assert_vertical(offsets: &[IVec3], expected: Vertical) {
        assert!(!offsets.is_empty());
        let down = offsets.iter().any(|d| d.y < 0);
        let up = offsets.iter().any(|d| d.y > 0);
        match expected {
            Vertical::Down => assert!(down && !up, "{offsets:?}"),
            Vertical::Up => assert!(up && !down, "{offsets:?}"),
            Vertical::Any => assert!(up && down, "{offsets:?}"),
        }
    }

    fn tall_store() -> MemoryBlockStore {
        let mut store = store();
        store.emerge_block(BlockPos::new(0, 1, 0));
        store
    }

    #[test]
    fn flyers_keep_between_eight_and_twelve_nodes_of_air() {
        let table = SpeciesTable::builtin();
        let flyer = Species {
            motion_type: MotionType::Fly,
            ..table.get(SpeciesId::RAT).clone()
        };
        let store = tall_store();
        assert_vertical(&wander_offsets(&store, &flyer, 15), Vertical::Down);
        assert_vertical(&wander_offsets(&store, &flyer, 10), Vertical::Any);
        assert_vertical(&wander_offsets(&store, &flyer, 5), Vertical::Up);
    }

    #[test]
    fn low_flyers_keep_between_two_and_five_nodes_of_air() {
        let table = SpeciesTable::builtin();
        let firefly = table.get(SpeciesId::FIREFLY);
        assert_eq!(firefly.motion_type, MotionType::FlyLow);
        let store = tall_store();
        assert_vertical(&wander_offsets(&store, firefly, 8), Vertical::Down);
        assert_vertical(&wander_offsets(&store, firefly, 4), Vertical::Any);
        assert_vertical(&wander_offsets(&store, firefly, 2), Vertical::Up);
    }

    #[test]
    fn swimmers_use_the_low_thresholds_in_water() {
        let table = SpeciesTable::builtin();
        let fish = table.get(SpeciesId::FISH);
        let mut store = store();
        for x in 0..16 {
            for z in 0..16 {
                for y in 1..=12 {
                    store.set_node(IVec3::new(x, y, z), CONTENT_WATERSOURCE);
                }
            }
        }
        assert_vertical(&wander_offsets(&store, fish, 10), Vertical::Down);
        assert_vertical(&wander_offsets(&store, fish, 4), Vertical::Any);
        assert_vertical(&wander_offsets(&store, fish, 1), Vertical::Up);
    }

    #[test]
    fn melee_skips_projectiles_and_damages_the_nearest_mob() {
        let mut bench = Bench::new(alice(4.0), 4);
        let rat = ServerEntity::mob(Vec3::new(3.5, 1.0, 3.0), bench.table.get(SpeciesId::RAT));
        let other_arrow = ServerEntity::mob(Vec3::new(3.0, 1.0, 3.3), bench.table.get(SpeciesId::ARROW));
        let rat_id = bench.registry.add(rat, &mut bench.store).unwrap();
        let arrow_id = bench.registry.add(other_arrow, &mut bench.store).unwrap();

        let arrow = bench.table.get(SpeciesId::ARROW).clone();
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(&arrow, base.pos);
        bench.with_ctx(|ctx| mob.step(&mut base, ctx));

        assert!(base.removed, "the arrow is spent on a hit");
        let target = bench.registry.get(rat_id).unwrap();
        assert!(target.base.removed, "five damage kills a rat");
        assert!(!bench.registry.get(arrow_id).unwrap().base.removed);
    }

    #[test]
    fn melee_destroys_items() {
        let mut bench = Bench::new(alice(4.0), 4);
        let apple = ServerEntity::item(Vec3::new(3.5, 1.0, 3.0), InventoryItem::craft("apple", 1));
        let apple_id = bench.registry.add(apple, &mut bench.store).unwrap();
        let arrow = bench.table.get(SpeciesId::ARROW).clone();
        let mut base = EntityBase::new(Vec3::new(3.0, 1.0, 3.0));
        let mut mob = MobEntity::new(&arrow, base.pos);
        bench.with_ctx(|ctx| mob.step(&mut base, ctx));
        assert!(base.removed);
        assert!(bench.registry.get(apple_id).unwrap().base.removed);
    }

    #[test]
    fn thrown_projectiles_sink_slowly() {
        let mut bench = Bench::new(Vec::new(), 5);
        let arrow = bench.table.get(SpeciesId::ARROW).clone();
        let mut base = EntityBase::new(Vec3::new(2.0, 8.0, 8.0));
        let mut mob = MobEntity::new(&arrow, base.pos);
        mob.speed = Vec3::new(10.0, 0.0, 0.0);
        for _ in 0..10 {
            bench.with_ctx(|ctx| mob.step(&mut base, ctx));
        }
        assert!(!base.removed);
        assert!((base.pos.x - 12.0).abs() < 1e-3);
        assert!((base.pos.y - (8.0 - THROWN_SINK_SPEED)).abs() < 1e-3);
    }
}
