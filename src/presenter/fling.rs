use std::time::Duration;

use serde::Deserialize;

/// Maps a fling velocity (percent of the device maximum) to a spin count and
/// a per-step delay.
pub trait FlingPhysics: Send + Sync + 'static {
    fn spins(&self, velocity_percent: u32) -> u32;

    /// Delay after step `step` of the fling loop. May be negative for extreme
    /// inputs; see [`FlingPhysics::step_delay`].
    fn step_delay_ms(&self, step: u32, velocity_percent: u32) -> i64;

    /// Flings slower than this are ignored entirely.
    fn minimum_velocity_percent(&self) -> u32;

    fn step_delay(&self, step: u32, velocity_percent: u32) -> Duration {
        let ms = self.step_delay_ms(step, velocity_percent).max(0);
        Duration::from_millis(ms as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DefaultFlingPhysics {
    pub minimum_velocity_percent: u32,
    pub min_spins: u32,
    pub max_extra_spins: u32,
    pub base_delay_ms: i64,
    /// Extra delay per step, so the spin visibly slows down.
    pub slowdown_factor: f64,
}

impl Default for DefaultFlingPhysics {
    fn default() -> Self {
        Self {
            minimum_velocity_percent: 5,
            min_spins: 1,
            max_extra_spins: 4,
            base_delay_ms: 25,
            slowdown_factor: 0.1,
        }
    }
}

/// Delay shaved off the base delay at 100% velocity.
const MAX_SPEEDUP_MS: i64 = 20;

impl FlingPhysics for DefaultFlingPhysics {
    fn spins(&self, velocity_percent: u32) -> u32 {
        self.min_spins
            .saturating_add(self.max_extra_spins.saturating_mul(velocity_percent) / 100)
    }

    fn step_delay_ms(&self, step: u32, velocity_percent: u32) -> i64 {
        let speedup = MAX_SPEEDUP_MS * i64::from(velocity_percent) / 100;
        let slowdown = (self.slowdown_factor * f64::from(step)).floor() as i64;
        self.base_delay_ms - speedup + slowdown
    }

    fn minimum_velocity_percent(&self) -> u32 {
        self.minimum_velocity_percent
    }
}
