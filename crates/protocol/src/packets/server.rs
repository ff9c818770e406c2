//! Server -> Client packet building.

use super::ServerOpcode;
use crate::{BinaryWriter, Color, DeathCause, DisconnectReason, EntityKind, RejectReason};

/// Wire view of one player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerView {
    pub id: u32,
    pub name: String,
    pub skin: Option<String>,
    pub color: Color,
    pub x: f32,
    pub y: f32,
    pub heading: f32,
    pub alive: bool,
    pub boosting: bool,
    pub score: u64,
    /// Head-to-tail segment positions.
    pub segments: Vec<(f32, f32)>,
}

/// Wire view of one food item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodView {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub kind: u16,
    pub mass: f32,
}

/// Identifies a removed entity in a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u32,
}

/// Full world state at one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub players: Vec<PlayerView>,
    pub food: Vec<FoodView>,
}

/// Entities changed or removed after `base_tick`, up to and including `tick`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldDelta {
    pub tick: u64,
    pub base_tick: u64,
    pub players: Vec<PlayerView>,
    pub food: Vec<FoodView>,
    pub removed: Vec<EntityKey>,
}

const FLAG_ALIVE: u8 = 0x01;
const FLAG_BOOSTING: u8 = 0x02;

fn put_player(w: &mut BinaryWriter, p: &PlayerView) {
    let mut flags = 0u8;
    if p.alive {
        flags |= FLAG_ALIVE;
    }
    if p.boosting {
        flags |= FLAG_BOOSTING;
    }
    w.put_u32(p.id);
    w.put_u8(flags);
    w.put_string(&p.name);
    w.put_string(p.skin.as_deref().unwrap_or(""));
    w.put_u8(p.color.r);
    w.put_u8(p.color.g);
    w.put_u8(p.color.b);
    w.put_f32(p.x);
    w.put_f32(p.y);
    w.put_f32(p.heading);
    w.put_u64(p.score);
    w.put_u32(p.segments.len() as u32);
    for &(x, y) in &p.segments {
        w.put_f32(x);
        w.put_f32(y);
    }
}

fn put_food(w: &mut BinaryWriter, f: &FoodView) {
    w.put_u32(f.id);
    w.put_u16(f.kind);
    w.put_f32(f.x);
    w.put_f32(f.y);
    w.put_f32(f.mass);
}

fn estimate(players: &[PlayerView], food: usize) -> usize {
    let segments: usize = players.iter().map(|p| p.segments.len()).sum();
    32 + players.len() * 64 + segments * 8 + food * 18
}

/// Build a Joined packet (0x40).
pub fn build_joined(player_id: u32, tick: u64, map_size: f32, tick_rate_hz: u16) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(19);
    w.put_u8(ServerOpcode::Joined as u8);
    w.put_u32(player_id);
    w.put_u64(tick);
    w.put_f32(map_size);
    w.put_u16(tick_rate_hz);
    w
}

/// Build a Snapshot packet (0x20).
pub fn build_snapshot(snapshot: &WorldSnapshot) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(estimate(&snapshot.players, snapshot.food.len()));
    w.put_u8(ServerOpcode::Snapshot as u8);
    w.put_u64(snapshot.tick);
    w.put_u32(snapshot.players.len() as u32);
    for p in &snapshot.players {
        put_player(&mut w, p);
    }
    w.put_u32(snapshot.food.len() as u32);
    for f in &snapshot.food {
        put_food(&mut w, f);
    }
    w
}

/// Build a Delta packet (0x21).
pub fn build_delta(delta: &WorldDelta) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(
        estimate(&delta.players, delta.food.len()) + delta.removed.len() * 5,
    );
    w.put_u8(ServerOpcode::Delta as u8);
    w.put_u64(delta.tick);
    w.put_u64(delta.base_tick);
    w.put_u32(delta.players.len() as u32);
    for p in &delta.players {
        put_player(&mut w, p);
    }
    w.put_u32(delta.food.len() as u32);
    for f in &delta.food {
        put_food(&mut w, f);
    }
    w.put_u32(delta.removed.len() as u32);
    for key in &delta.removed {
        w.put_u8(key.kind as u8);
        w.put_u32(key.id);
    }
    w
}

/// Build a PlayerDied packet (0x30).
///
/// The trailing id is the killer or the head-on partner, 0 when there is none.
pub fn build_player_died(player_id: u32, final_score: u64, cause: DeathCause) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(18);
    w.put_u8(ServerOpcode::PlayerDied as u8);
    w.put_u32(player_id);
    w.put_u64(final_score);
    w.put_u8(cause.code());
    w.put_u32(cause.other_player().unwrap_or(0));
    w
}

/// Build a JoinRejected packet (0x41).
pub fn build_join_rejected(reason: RejectReason) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(2);
    w.put_u8(ServerOpcode::JoinRejected as u8);
    w.put_u8(reason as u8);
    w
}

/// Build a Disconnected packet (0x42).
pub fn build_disconnected(reason: DisconnectReason) -> BinaryWriter {
    let mut w = BinaryWriter::with_capacity(2);
    w.put_u8(ServerOpcode::Disconnected as u8);
    w.put_u8(reason as u8);
    w
}
