//! The per-tick driver.
//!
//! [`Simulation::step`] runs every subsystem in dependency order. Each slow
//! subsystem owns an [`IntervalLimiter`], so a long tick delays them all by the
//! same amount instead of letting them drift apart.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, ensure, Context, Result};
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, instrument, warn};

use voxsim_core::{scoped_rng, BlockPos, Inventory, IntervalLimiter, SimTick};
use voxsim_world::{
    ActiveBlockSet, AmbientEvent, BlockStore, EntityId, EntityLifecycle, EntityMessage,
    EntityRegistry, GameClock, LifecycleStats, MemoryBlockStore, MessageOutbox, Observer,
    PunchOutcome, ServerEntity, SpeciesTable, StepParams, CONTENT_GRASS, CONTENT_GRASS_FOOTSTEPS,
};

use crate::ambient::{clear_empty_parcels, grow_grass, spawn_candidate};
use crate::config::SimulationConfig;
use crate::player::Player;

/// Seconds between activity refreshes.
pub const ACTIVE_REFRESH_INTERVAL: f32 = 2.0;
/// Seconds between node metadata passes.
pub const METADATA_INTERVAL: f32 = 1.0;
/// Seconds between ambient block rule passes.
pub const AMBIENT_INTERVAL: f32 = 10.0;
/// Seconds between registry sweeps.
pub const SWEEP_INTERVAL: f32 = 0.5;
/// Seconds between recommended position broadcasts.
pub const SEND_INTERVAL: f32 = 0.1;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Tick that was simulated.
    pub tick: SimTick,
    /// Entities moved from static lists into the registry.
    pub activated: usize,
    /// Entities moved into static lists.
    pub stored: usize,
    /// Deactivations deferred because a client still knows the entity.
    pub deferred: usize,
    /// Entities registered by behavior or ambient spawning.
    pub spawned: usize,
    /// Entities destroyed by the sweep.
    pub destroyed: usize,
    /// Messages moved into the outbox.
    pub messages: usize,
    /// Ambient events raised.
    pub events: usize,
}

/// Authoritative server-side world simulation.
pub struct Simulation {
    config: SimulationConfig,
    map: MemoryBlockStore,
    registry: EntityRegistry,
    active: ActiveBlockSet,
    lifecycle: EntityLifecycle,
    species: SpeciesTable,
    clock: GameClock,
    players: BTreeMap<String, Player>,
    outbox: MessageOutbox,
    events: VecDeque<AmbientEvent>,
    rng: StdRng,
    active_refresh: IntervalLimiter,
    metadata_timer: IntervalLimiter,
    ambient_timer: IntervalLimiter,
    send_timer: IntervalLimiter,
    sweep_timer: IntervalLimiter,
    pending_activation: BTreeSet<BlockPos>,
    tick: SimTick,
}

impl Simulation {
    /// Simulation over flat terrain with the built-in species.
    pub fn new(config: SimulationConfig) -> Self {
        let map = MemoryBlockStore::flat(config.block_cache_capacity, config.ground_level);
        Self::with_parts(config, map, SpeciesTable::builtin())
    }

    /// Simulation over a caller-supplied block store and species table.
    pub fn with_parts(
        config: SimulationConfig,
        map: MemoryBlockStore,
        species: SpeciesTable,
    ) -> Self {
        let clock = GameClock::new(GameClock::default().time_of_day(), config.time_speed);
        let rng = StdRng::seed_from_u64(config.world_seed);
        Self {
            config,
            map,
            registry: EntityRegistry::new(),
            active: ActiveBlockSet::new(),
            lifecycle: EntityLifecycle::new(),
            species,
            clock,
            players: BTreeMap::new(),
            outbox: MessageOutbox::new(),
            events: VecDeque::new(),
            rng,
            active_refresh: IntervalLimiter::new(),
            metadata_timer: IntervalLimiter::new(),
            ambient_timer: IntervalLimiter::new(),
            send_timer: IntervalLimiter::new(),
            sweep_timer: IntervalLimiter::new(),
            pending_activation: BTreeSet::new(),
            tick: SimTick::ZERO,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Next tick to be simulated.
    pub fn tick(&self) -> SimTick {
        self.tick
    }

    /// Game clock.
    pub fn clock(&self) -> &GameClock {
        &self.clock
    }

    /// Mutable game clock, for setting the time of day.
    pub fn clock_mut(&mut self) -> &mut GameClock {
        &mut self.clock
    }

    /// Live entities.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Block store.
    pub fn map(&self) -> &MemoryBlockStore {
        &self.map
    }

    /// Mutable block store.
    pub fn map_mut(&mut self) -> &mut MemoryBlockStore {
        &mut self.map
    }

    /// Blocks currently simulated.
    pub fn active_blocks(&self) -> &ActiveBlockSet {
        &self.active
    }

    /// Species templates.
    pub fn species(&self) -> &SpeciesTable {
        &self.species
    }

    /// Cumulative activation counters.
    pub fn lifecycle_stats(&self) -> LifecycleStats {
        self.lifecycle.stats()
    }

    /// Blocks waiting for a load before their entities can activate.
    pub fn pending_activations(&self) -> usize {
        self.pending_activation.len()
    }

    /// Connect a player. Returns false if the name is taken.
    pub fn add_player(&mut self, name: &str, pos: Vec3) -> bool {
        if self.players.contains_key(name) {
            return false;
        }
        info!(player = name, ?pos, "Player joined");
        self.players.insert(name.to_string(), Player::new(name, pos));
        true
    }

    /// Disconnect a player; its client forgets everything it knew.
    pub fn remove_player(&mut self, name: &str) -> Option<Player> {
        let mut player = self.players.remove(name)?;
        for id in std::mem::take(player.known_mut()) {
            self.registry.forget(id);
        }
        info!(player = name, "Player left");
        Some(player)
    }

    /// Move a player. Returns false for unknown players.
    pub fn move_player(&mut self, name: &str, pos: Vec3) -> bool {
        match self.players.get_mut(name) {
            Some(player) => {
                player.pos = pos;
                true
            }
            None => false,
        }
    }

    /// Look up a player.
    pub fn player(&self, name: &str) -> Option<&Player> {
        self.players.get(name)
    }

    /// Mutable player access, for inventory setup.
    pub fn player_mut(&mut self, name: &str) -> Option<&mut Player> {
        self.players.get_mut(name)
    }

    /// Connected players in name order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Register an entity.
    pub fn spawn_entity(&mut self, entity: ServerEntity) -> Result<EntityId> {
        let id = self
            .registry
            .add(entity, &mut self.map)
            .context("registering entity")?;
        Ok(id)
    }

    /// Take every message collected so far, oldest first.
    pub fn drain_messages(&mut self) -> Vec<EntityMessage> {
        self.outbox.drain()
    }

    /// Take every ambient event raised so far, oldest first.
    pub fn drain_events(&mut self) -> Vec<AmbientEvent> {
        self.events.drain(..).collect()
    }

    /// Advance the world by `dtime` seconds.
    #[instrument(skip(self), fields(tick = self.tick.0))]
    pub fn step(&mut self, dtime: f32) -> Result<TickSummary> {
        ensure!(
            dtime.is_finite() && dtime >= 0.0,
            "invalid tick length {dtime}"
        );
        let mut summary = TickSummary {
            tick: self.tick,
            ..TickSummary::default()
        };

        self.clock.step(dtime);
        self.finish_pending_loads(&mut summary);
        self.step_players();

        let first_tick = self.tick == SimTick::ZERO;
        if self.active_refresh.step(dtime, ACTIVE_REFRESH_INTERVAL) || first_tick {
            self.refresh_active_blocks(&mut summary);
        }
        if self.metadata_timer.step(dtime, METADATA_INTERVAL) {
            self.step_node_metadata();
        }
        if self.ambient_timer.step(dtime, AMBIENT_INTERVAL) {
            summary.spawned += self.step_ambient();
        }

        self.enforce_max_mob_level();
        let send_recommended = self.send_timer.step(dtime, SEND_INTERVAL);
        let observers: Vec<Observer> = self.players.values().map(Player::observer).collect();
        let mut events = Vec::new();
        let added = self.registry.step_all(
            &mut self.map,
            StepParams {
                dtime,
                send_recommended,
                species: &self.species,
                observers: &observers,
                rng: &mut self.rng,
                events: &mut events,
            },
        );
        summary.spawned += added.len();
        summary.events = events.len();
        self.events.extend(events);

        summary.messages = self.outbox.collect_from(&mut self.registry);
        self.sync_client_views();

        if self.sweep_timer.step(dtime, SWEEP_INTERVAL) {
            let report = self.registry.sweep(&mut self.map, &self.active);
            summary.destroyed = report.destroyed;
            summary.stored += report.deactivated;
        }

        self.tick = self.tick.advance(1);
        Ok(summary)
    }

    fn finish_pending_loads(&mut self, summary: &mut TickSummary) {
        let loaded = self.map.process_requests(self.config.block_loads_per_tick);
        for pos in loaded {
            if !self.pending_activation.remove(&pos) || !self.active.contains(pos) {
                continue;
            }
            let activation =
                self.lifecycle
                    .activate_block(pos, &mut self.registry, &mut self.map, &self.species);
            summary.activated += activation.activated.len();
        }
    }

    fn step_players(&mut self) {
        for player in self.players.values() {
            let ground = player.ground_node();
            if self.map.get_node(ground) == CONTENT_GRASS {
                self.map.set_node(ground, CONTENT_GRASS_FOOTSTEPS);
            }
        }
    }

    fn refresh_active_blocks(&mut self, summary: &mut TickSummary) {
        let observers: Vec<BlockPos> = self.players.values().map(Player::block).collect();
        let diff = self
            .active
            .update(&observers, self.config.active_block_range);

        let report = self
            .lifecycle
            .deactivate_far(&mut self.registry, &mut self.map, &self.active, false);
        summary.stored += report.stored;
        summary.deferred += report.deferred;

        let active = &self.active;
        self.pending_activation.retain(|pos| active.contains(*pos));
        for pos in diff.added {
            if self.map.get_block(pos).is_some() {
                let activation = self.lifecycle.activate_block(
                    pos,
                    &mut self.registry,
                    &mut self.map,
                    &self.species,
                );
                summary.activated += activation.activated.len();
            } else {
                self.map.request_block(pos);
                self.pending_activation.insert(pos);
            }
        }
        debug!(
            active = self.active.len(),
            pending = self.pending_activation.len(),
            "Active blocks refreshed"
        );
    }

    fn step_node_metadata(&mut self) {
        for pos in self.active.iter() {
            if let Some(block) = self.map.get_block_mut(pos) {
                clear_empty_parcels(block);
            }
        }
    }

    fn step_ambient(&mut self) -> usize {
        let night = self.clock.is_night();
        let mut spawned = 0;
        let blocks: Vec<BlockPos> = self.active.iter().collect();
        for pos in blocks {
            let mut rng = scoped_rng(self.config.world_seed, pos.hash64(), self.tick);
            grow_grass(&mut self.map, pos, &mut rng);
            let Some(mob) = spawn_candidate(
                &self.map,
                &self.registry,
                &self.species,
                pos,
                &mut rng,
                night,
                self.config.max_mob_level,
            ) else {
                continue;
            };
            match self.registry.add(mob, &mut self.map) {
                Ok(_) => spawned += 1,
                Err(err) => warn!(block = %pos, "Ambient spawn dropped: {err}"),
            }
        }
        spawned
    }

    fn enforce_max_mob_level(&mut self) {
        let max = self.config.max_mob_level;
        for entity in self.registry.iter_mut() {
            if !entity.base.removed && entity.level(&self.species) > max {
                debug!(id = entity.id(), "Mob above the allowed level removed");
                entity.base.removed = true;
            }
        }
    }

    fn sync_client_views(&mut self) {
        let radius = self.config.client_view_radius;
        for player in self.players.values_mut() {
            let added = self.registry.added_in_radius(player.pos, radius, player.known());
            let removed = self
                .registry
                .removed_from_radius(player.pos, radius, player.known());
            for id in added {
                if self.registry.mark_known(id) {
                    player.known_mut().insert(id);
                }
            }
            for id in removed {
                self.registry.forget(id);
                player.known_mut().remove(&id);
            }
        }
    }

    /// A player punches an entity with whatever it wields.
    ///
    /// Tool wear is applied, and an item the punch yields goes to the player's
    /// inventory or, if full, is dropped where the entity was.
    pub fn punch_entity(&mut self, player: &str, id: EntityId, dir: Vec3) -> Result<PunchOutcome> {
        let puncher = self
            .players
            .get_mut(player)
            .ok_or_else(|| anyhow!("unknown player {player}"))?;
        let entity = self
            .registry
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown entity {id}"))?;
        if entity.base.removed {
            return Ok(PunchOutcome::default());
        }

        let tool = puncher.inventory.wielded().cloned();
        let outcome = entity.punch(tool.as_ref(), dir, &puncher.name, &self.map, &self.species);
        let drop_pos = entity.base.pos;

        if outcome.wear > 0 && puncher.inventory.wear_wielded(outcome.wear) {
            debug!(player, "Wielded tool broke");
        }
        let leftover = outcome
            .item
            .clone()
            .and_then(|item| puncher.inventory.add_item(item));
        if let Some(item) = leftover {
            self.spawn_entity(ServerEntity::item(drop_pos, item))?;
        }
        Ok(outcome)
    }

    /// A player right-clicks an entity. Returns true when the click was used.
    pub fn right_click_entity(&mut self, player: &str, id: EntityId) -> Result<bool> {
        let clicker = self
            .players
            .get_mut(player)
            .ok_or_else(|| anyhow!("unknown player {player}"))?;
        let entity = self
            .registry
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown entity {id}"))?;
        if entity.base.removed {
            return Ok(false);
        }

        let mut spawned = Vec::new();
        let handled = entity.right_click(
            &mut clicker.inventory,
            &self.species,
            &mut self.rng,
            &mut spawned,
        );
        for entity in spawned {
            self.spawn_entity(entity)?;
        }
        Ok(handled)
    }

    /// Store every entity and save every modified block. Returns blocks saved.
    #[instrument(skip(self))]
    pub fn shutdown(&mut self) -> Result<usize> {
        let report = self.lifecycle.deactivate_far(
            &mut self.registry,
            &mut self.map,
            &self.active,
            true,
        );
        for player in self.players.values_mut() {
            player.known_mut().clear();
        }
        let saved = self
            .map
            .flush(self.clock.game_time)
            .context("flushing blocks at shutdown")?;
        info!(stored = report.stored, saved, "Simulation shut down");
        Ok(saved)
    }
}

/// A simulation behind one coarse lock, held for a whole tick.
#[derive(Clone)]
pub struct SharedSimulation {
    inner: Arc<Mutex<Simulation>>,
}

impl SharedSimulation {
    /// Wrap a simulation.
    pub fn new(simulation: Simulation) -> Self {
        Self {
            inner: Arc::new(Mutex::new(simulation)),
        }
    }

    /// Run one tick under the lock.
    pub fn step(&self, dtime: f32) -> Result<TickSummary> {
        self.lock()?.step(dtime)
    }

    /// Run `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut Simulation) -> R) -> Result<R> {
        let mut simulation = self.lock()?;
        Ok(f(&mut *simulation))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Simulation>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("simulation lock poisoned"))
    }
}
