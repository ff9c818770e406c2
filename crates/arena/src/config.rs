//! Arena configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::entity::FoodArchetype;
use crate::error::ConfigError;

/// Weights may overshoot 1.0 by this much from float rounding.
const WEIGHT_EPSILON: f32 = 1e-4;

/// Widest spatial grid a room will allocate, in cells per side.
pub const MAX_GRID_COLUMNS: f32 = 4096.0;

/// Longest idle or drain timeout accepted, one day.
pub const MAX_TIMEOUT_MS: u64 = 86_400_000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub food: FoodConfig,
}

impl Config {
    /// Load configuration from `config.toml`, writing the defaults if it is missing.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Self::from_toml_str(&contents)?
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration document. Missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let arena = &self.arena;
        if !arena.map_size.is_finite() || arena.map_size <= 0.0 {
            return Err(ConfigError::NonPositiveMapSize(arena.map_size));
        }
        if arena.tick_rate_hz == 0 || arena.tick_rate_hz > 1000 {
            return Err(ConfigError::InvalidTickRate(arena.tick_rate_hz));
        }
        positive("arena.max_players", arena.max_players as f32)?;
        positive("arena.grid_cell_size", arena.grid_cell_size)?;
        if arena.map_size / arena.grid_cell_size > MAX_GRID_COLUMNS {
            return Err(ConfigError::InvalidValue {
                field: "arena.grid_cell_size",
                reason: "too small for map_size, grid would exceed 4096 columns",
            });
        }
        if arena.idle_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "arena.idle_timeout_ms",
                reason: "longer than one day",
            });
        }
        if arena.drain_timeout_ms > MAX_TIMEOUT_MS {
            return Err(ConfigError::InvalidValue {
                field: "arena.drain_timeout_ms",
                reason: "longer than one day",
            });
        }
        positive("arena.history_ticks", arena.history_ticks as f32)?;
        positive("server.rooms", self.server.rooms as f32)?;
        positive("server.outbound_queue", self.server.outbound_queue as f32)?;

        let player = &self.player;
        positive("player.head_radius", player.head_radius)?;
        positive("player.segment_spacing", player.segment_spacing)?;
        non_negative("player.speed", player.speed)?;
        non_negative("player.turn_rate", player.turn_rate)?;
        if !player.boost_multiplier.is_finite() || player.boost_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "player.boost_multiplier",
                reason: "must be at least 1",
            });
        }
        if player.max_segments != 0 && player.max_segments < player.start_segments {
            return Err(ConfigError::InvalidValue {
                field: "player.max_segments",
                reason: "smaller than player.start_segments",
            });
        }

        let food = &self.food;
        non_negative("food.consume_radius", food.consume_radius)?;
        non_negative("food.cluster_radius", food.cluster_radius)?;
        if food.archetypes.is_empty() {
            return Err(ConfigError::NoArchetypes);
        }
        let mut total = 0.0f32;
        for archetype in &food.archetypes {
            let w = archetype.spawn_weight;
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    kind: archetype.kind,
                    weight: w,
                });
            }
            if !archetype.mass.is_finite() || archetype.mass < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: "food.archetypes.mass",
                    reason: "must be finite and non-negative",
                });
            }
            total += w;
        }
        if total > 1.0 + WEIGHT_EPSILON {
            return Err(ConfigError::WeightsExceedOne(total));
        }
        if total <= 0.0 {
            return Err(ConfigError::ZeroTotalWeight);
        }
        Ok(())
    }
}

fn positive(field: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: "must be positive",
        })
    }
}

fn non_negative(field: &'static str, v: f32) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: "must be finite and non-negative",
        })
    }
}

/// Networking settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum connections across all rooms.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Server name shown in logs.
    #[serde(default = "default_name")]
    pub name: String,
    /// Number of independent rooms.
    #[serde(default = "default_rooms")]
    pub rooms: usize,
    /// Capacity of each client's outbound queue, in messages.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    /// Consecutive undecodable frames tolerated before the socket is closed.
    #[serde(default = "default_decode_strike_limit")]
    pub decode_strike_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            name: default_name(),
            rooms: default_rooms(),
            outbound_queue: default_outbound_queue(),
            decode_strike_limit: default_decode_strike_limit(),
        }
    }
}

fn default_port() -> u16 {
    11443
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    256
}
fn default_ip_limit() -> usize {
    8
}
fn default_name() -> String {
    "Snake Arena".to_string()
}
fn default_rooms() -> usize {
    1
}
fn default_outbound_queue() -> usize {
    64
}
fn default_decode_strike_limit() -> u32 {
    20
}

/// What happens to a head that leaves the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    /// The player dies.
    #[default]
    Wall,
    /// The player is pushed back onto the edge.
    Clamp,
}

/// Simulation settings for one room.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArenaConfig {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
    /// Side length of the square world.
    #[serde(default = "default_map_size")]
    pub map_size: f32,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default)]
    pub boundary_policy: BoundaryPolicy,
    /// Leading own segments a head can never collide with.
    #[serde(default = "default_grace_segments")]
    pub self_collision_grace_segments: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_grid_cell_size")]
    pub grid_cell_size: f32,
    /// Ticks of removal history kept for delta computation.
    #[serde(default = "default_history_ticks")]
    pub history_ticks: u64,
    #[serde(default = "default_protocol_strike_limit")]
    pub protocol_strike_limit: u32,
    /// Late ticks allowed to queue up before the schedule is reset.
    #[serde(default = "default_max_tick_backlog")]
    pub max_tick_backlog: u32,
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
    /// Fixed RNG seed. Unset means seeded from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
            map_size: default_map_size(),
            max_players: default_max_players(),
            boundary_policy: BoundaryPolicy::default(),
            self_collision_grace_segments: default_grace_segments(),
            idle_timeout_ms: default_idle_timeout(),
            grid_cell_size: default_grid_cell_size(),
            history_ticks: default_history_ticks(),
            protocol_strike_limit: default_protocol_strike_limit(),
            max_tick_backlog: default_max_tick_backlog(),
            drain_timeout_ms: default_drain_timeout(),
            seed: None,
        }
    }
}

fn default_tick_rate() -> u32 {
    25
}
fn default_map_size() -> f32 {
    4000.0
}
fn default_max_players() -> usize {
    64
}
fn default_grace_segments() -> usize {
    3
}
fn default_idle_timeout() -> u64 {
    60_000
}
fn default_grid_cell_size() -> f32 {
    64.0
}
fn default_history_ticks() -> u64 {
    64
}
fn default_protocol_strike_limit() -> u32 {
    20
}
fn default_max_tick_backlog() -> u32 {
    25
}
fn default_drain_timeout() -> u64 {
    10_000
}

/// Snake movement and body settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Distance travelled per tick.
    #[serde(default = "default_player_speed")]
    pub speed: f32,
    #[serde(default = "default_boost_multiplier")]
    pub boost_multiplier: f32,
    /// Maximum heading change per tick in radians. 0 turns instantly.
    #[serde(default = "default_turn_rate")]
    pub turn_rate: f32,
    #[serde(default = "default_head_radius")]
    pub head_radius: f32,
    #[serde(default = "default_segment_spacing")]
    pub segment_spacing: f32,
    #[serde(default = "default_start_segments")]
    pub start_segments: usize,
    /// 0 = unbounded.
    #[serde(default)]
    pub max_segments: usize,
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: default_player_speed(),
            boost_multiplier: default_boost_multiplier(),
            turn_rate: default_turn_rate(),
            head_radius: default_head_radius(),
            segment_spacing: default_segment_spacing(),
            start_segments: default_start_segments(),
            max_segments: 0,
            max_name_length: default_max_name_length(),
        }
    }
}

fn default_player_speed() -> f32 {
    5.0
}
fn default_boost_multiplier() -> f32 {
    2.0
}
fn default_turn_rate() -> f32 {
    0.3
}
fn default_head_radius() -> f32 {
    6.0
}
fn default_segment_spacing() -> f32 {
    8.0
}
fn default_start_segments() -> usize {
    6
}
fn default_max_name_length() -> usize {
    24
}

/// Food population settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FoodConfig {
    /// Live food the spawner tops the world up to.
    #[serde(default = "default_food_target")]
    pub target_count: usize,
    #[serde(default = "default_food_spawn_amount")]
    pub max_spawn_per_tick: usize,
    #[serde(default = "default_consume_radius")]
    pub consume_radius: f32,
    #[serde(default = "default_cluster_radius")]
    pub cluster_radius: f32,
    /// Food already within `cluster_radius` that makes a position too crowded.
    #[serde(default = "default_cluster_limit")]
    pub cluster_limit: usize,
    #[serde(default = "default_spawn_retries")]
    pub spawn_retries: u32,
    #[serde(default = "default_archetypes")]
    pub archetypes: Vec<FoodArchetype>,
}

impl Default for FoodConfig {
    fn default() -> Self {
        Self {
            target_count: default_food_target(),
            max_spawn_per_tick: default_food_spawn_amount(),
            consume_radius: default_consume_radius(),
            cluster_radius: default_cluster_radius(),
            cluster_limit: default_cluster_limit(),
            spawn_retries: default_spawn_retries(),
            archetypes: default_archetypes(),
        }
    }
}

fn default_food_target() -> usize {
    600
}
fn default_food_spawn_amount() -> usize {
    50
}
fn default_consume_radius() -> f32 {
    12.0
}
fn default_cluster_radius() -> f32 {
    40.0
}
fn default_cluster_limit() -> usize {
    4
}
fn default_spawn_retries() -> u32 {
    8
}
fn default_archetypes() -> Vec<FoodArchetype> {
    vec![
        FoodArchetype::new(0, "pellet", 1, 1, 1.0, 0.80),
        FoodArchetype::new(1, "orb", 5, 2, 3.0, 0.15),
        FoodArchetype {
            boost_ticks: 30,
            ..FoodArchetype::new(2, "feast", 25, 5, 8.0, 0.05)
        },
    ]
}
