use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use voxsim_server::SimulationConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

/// A player connected for the whole run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerSpawn {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Ticks to simulate before shutting down.
    pub ticks: u64,
    /// Simulated milliseconds per tick.
    pub tick_ms: u32,
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub players: Vec<PlayerSpawn>,
    pub simulation: SimulationConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ticks: 600,
            tick_ms: 100,
            log_level: "warn".to_string(),
            players: vec![PlayerSpawn {
                name: "singleplayer".to_string(),
                x: 0.0,
                y: 0.5,
                z: 0.0,
            }],
            simulation: SimulationConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Read and parse a config file, reporting any failure.
    pub fn read_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save configuration to an explicit path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }

    /// Seconds simulated by one tick.
    pub fn dtime(&self) -> f32 {
        self.tick_ms as f32 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};
    use voxsim_world::MobLevel;

    fn scratch_dir() -> std::path::PathBuf {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("voxsim_config_{timestamp}"))
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            ticks = 50

            [simulation]
            world_seed = 7
            max_mob_level = "aggressive"

            [[players]]
            name = "alice"
            x = 1.0
            y = 0.5
            z = -3.0
            "#,
        )
        .unwrap();
        assert_eq!(config.ticks, 50);
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.simulation.world_seed, 7);
        assert_eq!(config.simulation.max_mob_level, MobLevel::Aggressive);
        assert_eq!(config.simulation.active_block_range, 2);
        assert_eq!(config.players.len(), 1);
        assert_eq!(config.players[0].name, "alice");
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let path = scratch_dir().join("server.toml");
        let mut config = ServerConfig::default();
        config.ticks = 12;
        config.simulation.world_seed = 99;
        config.save_to_path(&path).expect("save config");

        assert_eq!(ServerConfig::read_from_path(&path).unwrap(), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_or_broken_file_is_reported() {
        let dir = scratch_dir();
        let err = ServerConfig::read_from_path(&dir.join("absent.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("absent.toml"));

        fs::create_dir_all(&dir).unwrap();
        let broken = dir.join("broken.toml");
        fs::write(&broken, "ticks = \"many\"").unwrap();
        assert!(ServerConfig::read_from_path(&broken).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
