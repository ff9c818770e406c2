//! Packet definitions for the arena protocol.
//!
//! This module contains both client->server and server->client packet types.

mod client;
mod server;

pub use client::*;
pub use server::*;

/// Opcodes for client -> server packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOpcode {
    /// Join the arena with a name and cosmetics.
    Join = 0x00,
    /// Steering input.
    Input = 0x10,
    /// Acknowledge a received tick.
    Ack = 0x11,
    /// Ask for a full snapshot.
    Resync = 0x12,
    /// Leave the arena.
    Leave = 0x13,
}

/// Opcodes for server -> client packets.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerOpcode {
    /// Full world state.
    Snapshot = 0x20,
    /// Changes since the client's base tick.
    Delta = 0x21,
    /// A player died.
    PlayerDied = 0x30,
    /// Join accepted.
    Joined = 0x40,
    /// Join refused.
    JoinRejected = 0x41,
    /// Server is closing the session.
    Disconnected = 0x42,
}

/// Longest display name accepted on the wire, in bytes.
pub const MAX_NAME_BYTES: usize = 64;
/// Longest skin id accepted on the wire, in bytes.
pub const MAX_SKIN_BYTES: usize = 32;
