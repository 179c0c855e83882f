//! Engine Configuration
//!
//! Round timing and curve tuning. Defaults are production values; everything
//! can be overridden from the environment for deployment and testing.

use std::time::Duration;

/// Tuning for the round engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long bets are accepted before the multiplier starts.
    pub accept_window: Duration,
    /// Multiplier broadcast cadence.
    pub tick_interval: Duration,
    /// Safety cap on active-phase duration. The growth rate is tuned so the
    /// crash normally fires long before this.
    pub max_round_duration: Duration,
    /// Pause between round termination and the next accept window.
    pub cooldown: Duration,
    /// Exponential growth rate per second: multiplier = e^(rate * t).
    pub growth_rate: f64,
    /// House edge applied in crash-point derivation.
    pub house_edge: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            accept_window: Duration::from_secs(5),
            tick_interval: Duration::from_millis(100),
            max_round_duration: Duration::from_secs(60),
            cooldown: Duration::from_secs(3),
            growth_rate: 0.06,
            house_edge: 0.05,
        }
    }
}

impl EngineConfig {
    /// Build from environment variables, falling back to defaults.
    ///
    /// Durations are in milliseconds: `GAME_ACCEPT_WINDOW`,
    /// `MULTIPLIER_UPDATE_INTERVAL`, `GAME_ROUND_DURATION`, `GAME_COOLDOWN`.
    /// Rates are floats: `GAME_GROWTH_RATE`, `GAME_HOUSE_EDGE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            accept_window: env_ms("GAME_ACCEPT_WINDOW").unwrap_or(defaults.accept_window),
            tick_interval: env_ms("MULTIPLIER_UPDATE_INTERVAL").unwrap_or(defaults.tick_interval),
            max_round_duration: env_ms("GAME_ROUND_DURATION")
                .unwrap_or(defaults.max_round_duration),
            cooldown: env_ms("GAME_COOLDOWN").unwrap_or(defaults.cooldown),
            growth_rate: env_f64("GAME_GROWTH_RATE").unwrap_or(defaults.growth_rate),
            house_edge: env_f64("GAME_HOUSE_EDGE").unwrap_or(defaults.house_edge),
        }
    }

    /// Multiplier after `elapsed` of active play, before crash clamping.
    pub fn multiplier_at(&self, elapsed: Duration) -> f64 {
        (self.growth_rate * elapsed.as_secs_f64()).exp()
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse::<f64>().ok())
}
