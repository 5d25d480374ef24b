//! voxsim - headless voxel sandbox server simulation
//!
//! Runs the authoritative simulation for a fixed number of ticks with the
//! configured players connected, then stores every entity and flushes the map.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use glam::Vec3;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{ServerConfig, DEFAULT_CONFIG_PATH};
use voxsim_server::{Simulation, TickSummary};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless voxel sandbox server simulation", long_about = None)]
struct Args {
    /// Server configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Number of ticks to simulate (overrides the config file)
    #[arg(long)]
    ticks: Option<u64>,
    /// World seed (overrides the config file)
    #[arg(long)]
    seed: Option<u64>,
    /// Tracing filter used when RUST_LOG is unset (overrides the config file)
    #[arg(long)]
    log: Option<String>,
    /// Write the effective configuration to --config and exit
    #[arg(long)]
    save_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // The subscriber needs the configured level, so config errors are reported after it is up.
    let loaded = ServerConfig::read_from_path(&args.config);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    let level = args.log.clone().unwrap_or_else(|| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
    if let Err(err) = &loaded {
        warn!("{err:#}. Using defaults");
    }

    if let Some(ticks) = args.ticks {
        config.ticks = ticks;
    }
    if let Some(seed) = args.seed {
        config.simulation.world_seed = seed;
    }
    if args.save_config {
        config
            .save_to_path(&args.config)
            .with_context(|| format!("writing {}", args.config.display()))?;
        info!(path = %args.config.display(), "Configuration saved");
        return Ok(());
    }

    info!("Starting voxsim v{}", env!("CARGO_PKG_VERSION"));
    run(&config)
}

fn run(config: &ServerConfig) -> Result<()> {
    let mut sim = Simulation::new(config.simulation.clone());
    for spawn in &config.players {
        if !sim.add_player(&spawn.name, Vec3::new(spawn.x, spawn.y, spawn.z)) {
            warn!(player = %spawn.name, "Duplicate player entry ignored");
        }
    }

    let dtime = config.dtime();
    let mut totals = TickSummary::default();
    let mut messages = 0usize;
    let mut events = 0usize;
    for _ in 0..config.ticks {
        let summary = sim
            .step(dtime)
            .with_context(|| format!("simulating tick {}", sim.tick().0))?;
        messages += sim.drain_messages().len();
        events += sim.drain_events().len();
        if summary.activated + summary.stored + summary.spawned + summary.destroyed > 0 {
            debug!(?summary, "Tick");
        }
        totals.activated += summary.activated;
        totals.stored += summary.stored;
        totals.deferred += summary.deferred;
        totals.spawned += summary.spawned;
        totals.destroyed += summary.destroyed;
    }

    info!(
        ticks = config.ticks,
        game_time = sim.clock().game_time,
        entities = sim.registry().len(),
        activated = totals.activated,
        stored = totals.stored,
        deferred = totals.deferred,
        spawned = totals.spawned,
        destroyed = totals.destroyed,
        messages,
        events,
        "Simulation finished"
    );

    let saved = sim.shutdown()?;
    info!(saved, archived = sim.map().archive().len(), "Map flushed");
    Ok(())
}
