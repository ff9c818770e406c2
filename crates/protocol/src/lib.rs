//! Shared wire protocol for the snake arena.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - Packet definitions and builders
//! - Small shared enums (death causes, reject and disconnect reasons)

mod binary;
mod error;
pub mod packets;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;

/// RGB color chosen by the player at join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Why a player died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeathCause {
    /// Head ran into the player's own body.
    SelfCollision,
    /// Head ran into another player's body.
    Body { killer: u32 },
    /// Two heads met in the same tick.
    HeadOn { other: u32 },
    /// Head left the world under the wall boundary policy.
    Wall,
    /// Removed by the server after an internal consistency failure.
    Fault,
}

impl DeathCause {
    /// Wire code for the cause.
    pub fn code(&self) -> u8 {
        match self {
            DeathCause::SelfCollision => 1,
            DeathCause::Body { .. } => 2,
            DeathCause::HeadOn { .. } => 3,
            DeathCause::Wall => 4,
            DeathCause::Fault => 5,
        }
    }

    /// The other player involved, if any.
    pub fn other_player(&self) -> Option<u32> {
        match *self {
            DeathCause::Body { killer } => Some(killer),
            DeathCause::HeadOn { other } => Some(other),
            _ => None,
        }
    }
}

/// Why a join request was refused.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The room is at `max_players`.
    Capacity = 1,
    /// The room is shutting down.
    Draining = 2,
    /// A live player already uses this connection id.
    AlreadyJoined = 3,
}

/// Why the server closed a session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No input within the idle window.
    Idle = 1,
    /// Too many consecutive protocol violations.
    ProtocolViolations = 2,
    /// Outbound queue overflowed or closed.
    SlowConsumer = 3,
    /// The room is stopping.
    Shutdown = 4,
}

/// Kind tag for removed-entity records.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Player = 0,
    Food = 1,
}
