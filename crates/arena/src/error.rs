//! Error types for the arena core.

use protocol::ProtocolError;
use thiserror::Error;

use crate::entity::PlayerId;
use crate::room::RoomPhase;

/// Errors surfaced by room operations.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("protocol violation from player {player}: {reason}")]
    Protocol {
        player: PlayerId,
        reason: ProtocolViolation,
    },

    #[error("room is full ({max_players} players)")]
    Capacity { max_players: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),

    #[error("invalid room transition {from:?} -> {to:?}")]
    InvalidTransition { from: RoomPhase, to: RoomPhase },
}

/// A client message the room refused. Counts as one strike.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolViolation {
    #[error("undecodable frame: {0}")]
    Decode(#[from] ProtocolError),

    #[error("heading is not finite")]
    NonFiniteHeading,

    #[error("input sequence {seq} is not newer than {last}")]
    StaleInput { seq: u32, last: u32 },

    #[error("ack for tick {tick} but current tick is {current}")]
    AckFromFuture { tick: u64, current: u64 },

    #[error("already joined")]
    DuplicateJoin,

    #[error("not joined")]
    UnknownPlayer,
}

/// Invalid configuration. Raised before a room is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("map size must be positive, got {0}")]
    NonPositiveMapSize(f32),

    #[error("tick rate must be within 1..=1000 Hz, got {0}")]
    InvalidTickRate(u32),

    #[error("no food archetypes configured")]
    NoArchetypes,

    #[error("food archetype {kind} has invalid spawn weight {weight}")]
    InvalidWeight { kind: u16, weight: f32 },

    #[error("food spawn weights sum to {0}, above 1.0")]
    WeightsExceedOne(f32),

    #[error("food spawn weights sum to zero")]
    ZeroTotalWeight,

    #[error("{field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}
