//! Terminal game results handed to the leaderboard.

use protocol::{DeathCause, DisconnectReason};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::entity::PlayerId;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnding {
    Died(DeathCause),
    Left,
    Disconnected(DisconnectReason),
    Shutdown,
}

/// Emitted exactly once per session, when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameResult {
    pub player: PlayerId,
    pub name: String,
    pub final_score: u64,
    pub duration_ms: u64,
    pub ending: SessionEnding,
}

/// Receives finished sessions.
pub trait ResultSink: Send {
    fn submit(&mut self, result: GameResult);
}

/// Writes results to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn submit(&mut self, result: GameResult) {
        info!(
            "Result: player {} ({}) scored {} in {}ms, {:?}",
            result.player, result.name, result.final_score, result.duration_ms, result.ending
        );
    }
}

impl ResultSink for mpsc::UnboundedSender<GameResult> {
    fn submit(&mut self, result: GameResult) {
        if let Err(e) = self.send(result) {
            warn!("Result receiver gone, dropping result for player {}", e.0.player);
        }
    }
}
