//! Messages from connection tasks into a room.

use tokio::sync::mpsc;

use crate::entity::{Cosmetic, PlayerId};
use crate::sync::Outbound;

/// One steering input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerInput {
    /// Client sequence number. Must increase.
    pub seq: u32,
    pub heading: f32,
    pub boost: bool,
}

/// A queued request from one connection.
#[derive(Debug)]
pub struct Command {
    pub player: PlayerId,
    pub kind: CommandKind,
}

#[derive(Debug)]
pub enum CommandKind {
    Join {
        name: String,
        cosmetic: Cosmetic,
        /// Queue the room writes this client's messages to.
        outbound: mpsc::Sender<Outbound>,
    },
    Input(PlayerInput),
    Ack { tick: u64 },
    Resync,
    Leave,
}

impl CommandKind {
    /// Processing order within one tick: leaves, joins, acks and resyncs, inputs.
    pub fn order(&self) -> u8 {
        match self {
            CommandKind::Leave => 0,
            CommandKind::Join { .. } => 1,
            CommandKind::Ack { .. } | CommandKind::Resync => 2,
            CommandKind::Input(_) => 3,
        }
    }
}

impl Command {
    pub fn new(player: PlayerId, kind: CommandKind) -> Self {
        Self { player, kind }
    }
}
