//! Immutable per-process game data shared by all rooms.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::entity::FoodArchetype;
use crate::error::ConfigError;
use crate::world::WorldBounds;

/// Validated configuration plus the values derived from it.
#[derive(Debug)]
pub struct Registry {
    pub config: Config,
    pub bounds: WorldBounds,
    pub archetypes: Arc<[FoodArchetype]>,
    /// Sum of all archetype spawn weights. Draws are taken in `[0, total_weight)`.
    pub total_weight: f32,
    pub tick_duration: Duration,
}

impl Registry {
    pub fn from_config(config: &Config) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let archetypes: Arc<[FoodArchetype]> = config.food.archetypes.clone().into();
        let total_weight = archetypes.iter().map(|a| a.spawn_weight).sum();
        Ok(Arc::new(Self {
            config: config.clone(),
            bounds: WorldBounds::new(config.arena.map_size),
            archetypes,
            total_weight,
            tick_duration: Duration::from_nanos(
                1_000_000_000 / u64::from(config.arena.tick_rate_hz),
            ),
        }))
    }

    /// Convert a wall-clock span to whole ticks, rounding up.
    pub fn ticks_for(&self, ms: u64) -> u64 {
        let rate = u64::from(self.config.arena.tick_rate_hz);
        ms.saturating_mul(rate).div_ceil(1000)
    }

    /// Wall-clock length of `ticks` ticks, in milliseconds.
    pub fn millis_for(&self, ticks: u64) -> u64 {
        ticks.saturating_mul(1000) / u64::from(self.config.arena.tick_rate_hz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_values() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.tick_duration, Duration::from_millis(40));
        assert!((registry.total_weight - 1.0).abs() < 1e-6);
        assert_eq!(registry.ticks_for(60_000), 1500);
        assert_eq!(registry.ticks_for(1), 1);
        assert_eq!(registry.millis_for(25), 1000);
    }

    #[test]
    fn tick_conversions_saturate() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        assert_eq!(registry.ticks_for(u64::MAX), u64::MAX.div_ceil(1000));
        assert_eq!(registry.millis_for(u64::MAX), u64::MAX / 25);
    }

    #[test]
    fn oversized_grid_fails_fast() {
        let mut config = Config::default();
        config.arena.map_size = 2_000_000.0;
        config.arena.grid_cell_size = 1.0;
        assert!(matches!(
            Registry::from_config(&config),
            Err(ConfigError::InvalidValue { field: "arena.grid_cell_size", .. })
        ));
    }

    #[test]
    fn invalid_config_fails_fast() {
        let mut config = Config::default();
        config.arena.tick_rate_hz = 0;
        assert_eq!(
            Registry::from_config(&config).unwrap_err(),
            ConfigError::InvalidTickRate(0)
        );
    }
}
