//! Game clock and day/night cycle.
//!
//! Time of day runs from 0 to 24000 (0 = midnight, 12000 = noon). It advances at
//! `time_speed` game seconds per real second, so the default of 72 gives a
//! twenty minute day.

use serde::{Deserialize, Serialize};

/// Time-of-day units per full day.
pub const DAY_LENGTH: u32 = 24000;

const SECONDS_PER_DAY: f64 = 86400.0;

/// Simulation clock tracking elapsed game time and time of day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameClock {
    time_of_day: u32,
    /// Sub-unit remainder carried between steps.
    remainder: f64,
    /// Game seconds per real second.
    pub time_speed: f32,
    /// Real seconds simulated since the world started.
    pub game_time: f64,
}

impl GameClock {
    /// Create a clock at `time_of_day`.
    pub fn new(time_of_day: u32, time_speed: f32) -> Self {
        Self {
            time_of_day: time_of_day % DAY_LENGTH,
            remainder: 0.0,
            time_speed,
            game_time: 0.0,
        }
    }

    /// Advance by `dtime` real seconds.
    pub fn step(&mut self, dtime: f32) {
        self.game_time += f64::from(dtime);
        let units = f64::from(dtime) * f64::from(self.time_speed) * f64::from(DAY_LENGTH)
            / SECONDS_PER_DAY
            + self.remainder;
        let whole = units.floor();
        self.remainder = units - whole;
        self.time_of_day = ((u64::from(self.time_of_day) + whole as u64) % u64::from(DAY_LENGTH)) as u32;
    }

    pub fn time_of_day(&self) -> u32 {
        self.time_of_day
    }

    pub fn set_time_of_day(&mut self, time_of_day: u32) {
        self.time_of_day = time_of_day % DAY_LENGTH;
        self.remainder = 0.0;
    }

    /// Night spans from 19000 through 04999.
    pub fn is_night(&self) -> bool {
        self.time_of_day < 5000 || self.time_of_day >= 19000
    }
}

impl Default for GameClock {
    fn default() -> Self {
        Self::new(9000, 72.0)
    }
}
