//! Per-client state synchronization.
//!
//! Each attached client has a base tick: the newest state it is known to
//! hold. Every tick it gets either a delta from that base or, when the base
//! is unusable, a full snapshot. Clients sharing a base share one delta.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use protocol::packets::{WorldDelta, WorldSnapshot};
use protocol::{DeathCause, DisconnectReason, RejectReason};
use tokio::sync::mpsc;
use tracing::debug;

use crate::command::PlayerInput;
use crate::entity::PlayerId;
use crate::error::ProtocolViolation;
use crate::simulation::Death;
use crate::store::EntityStore;

/// A message for one client's connection task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Joined {
        player: PlayerId,
        tick: u64,
        map_size: f32,
        tick_rate_hz: u16,
    },
    Snapshot(Arc<WorldSnapshot>),
    Delta(Arc<WorldDelta>),
    PlayerDied {
        player: PlayerId,
        final_score: u64,
        cause: DeathCause,
    },
    JoinRejected(RejectReason),
    Disconnected(DisconnectReason),
}

/// Server-side view of one attached client.
#[derive(Debug)]
pub struct ClientLink {
    outbound: mpsc::Sender<Outbound>,
    /// Newest tick the client is known to hold.
    pub base_tick: u64,
    pub needs_snapshot: bool,
    pub last_input_seq: Option<u32>,
    pub last_input_tick: u64,
    /// Consecutive protocol violations.
    pub strikes: u32,
    /// The outbound queue was full or closed.
    pub failed: bool,
}

impl ClientLink {
    fn send(&mut self, msg: Outbound) -> bool {
        if self.failed {
            return false;
        }
        if self.outbound.try_send(msg).is_err() {
            self.failed = true;
        }
        !self.failed
    }
}

/// Latest accepted input per player, applied at the next tick start.
pub type InputQueue = BTreeMap<PlayerId, PlayerInput>;

#[derive(Debug, Default)]
pub struct Synchronizer {
    links: BTreeMap<PlayerId, ClientLink>,
    inputs: InputQueue,
    deltas: BTreeMap<u64, Arc<WorldDelta>>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn link(&self, id: PlayerId) -> Option<&ClientLink> {
        self.links.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.links.keys().copied()
    }

    /// Attach a client, or refresh an attached one. Either way it gets a
    /// full snapshot on the next ship.
    pub fn attach(&mut self, id: PlayerId, outbound: mpsc::Sender<Outbound>, tick: u64) {
        match self.links.entry(id) {
            Entry::Occupied(mut slot) => {
                let link = slot.get_mut();
                link.outbound = outbound;
                link.needs_snapshot = true;
                link.last_input_tick = tick;
                link.failed = false;
            }
            Entry::Vacant(slot) => {
                slot.insert(ClientLink {
                    outbound,
                    base_tick: 0,
                    needs_snapshot: true,
                    last_input_seq: None,
                    last_input_tick: tick,
                    strikes: 0,
                    failed: false,
                });
            }
        }
    }

    pub fn detach(&mut self, id: PlayerId) -> Option<ClientLink> {
        self.inputs.remove(&id);
        self.links.remove(&id)
    }

    /// Record that the client holds `tick`. Older acks are harmless and ignored.
    pub fn acknowledge(
        &mut self,
        id: PlayerId,
        tick: u64,
        current: u64,
    ) -> Result<(), ProtocolViolation> {
        let link = self
            .links
            .get_mut(&id)
            .ok_or(ProtocolViolation::UnknownPlayer)?;
        if tick > current {
            return Err(ProtocolViolation::AckFromFuture { tick, current });
        }
        link.base_tick = link.base_tick.max(tick);
        Ok(())
    }

    pub fn request_resync(&mut self, id: PlayerId) -> Result<(), ProtocolViolation> {
        let link = self
            .links
            .get_mut(&id)
            .ok_or(ProtocolViolation::UnknownPlayer)?;
        link.needs_snapshot = true;
        Ok(())
    }

    /// Validate an input and keep it if it is the newest for this player.
    /// A valid input clears the client's strikes.
    pub fn buffer_input(
        &mut self,
        id: PlayerId,
        input: PlayerInput,
        tick: u64,
    ) -> Result<(), ProtocolViolation> {
        let link = self
            .links
            .get_mut(&id)
            .ok_or(ProtocolViolation::UnknownPlayer)?;
        if !input.heading.is_finite() {
            return Err(ProtocolViolation::NonFiniteHeading);
        }
        if let Some(last) = link.last_input_seq {
            if input.seq <= last {
                return Err(ProtocolViolation::StaleInput {
                    seq: input.seq,
                    last,
                });
            }
        }
        link.last_input_seq = Some(input.seq);
        link.last_input_tick = tick;
        link.strikes = 0;
        self.inputs.insert(id, input);
        Ok(())
    }

    /// Take the buffered inputs, one per player in id order.
    pub fn drain_inputs(&mut self) -> InputQueue {
        std::mem::take(&mut self.inputs)
    }

    /// Count a violation. Returns the client's consecutive strikes.
    pub fn strike(&mut self, id: PlayerId) -> u32 {
        match self.links.get_mut(&id) {
            Some(link) => {
                link.strikes += 1;
                link.strikes
            }
            None => 0,
        }
    }

    /// Clients whose strikes exceed `limit`.
    pub fn struck_out(&self, limit: u32) -> Vec<PlayerId> {
        self.links
            .iter()
            .filter(|(_, l)| l.strikes > limit)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Clients with no input for more than `idle_ticks`. 0 disables the check.
    pub fn idle(&self, tick: u64, idle_ticks: u64) -> Vec<PlayerId> {
        if idle_ticks == 0 {
            return Vec::new();
        }
        self.links
            .iter()
            .filter(|(_, l)| tick.saturating_sub(l.last_input_tick) > idle_ticks)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Clients whose outbound queue filled up or closed.
    pub fn failed_clients(&self) -> Vec<PlayerId> {
        self.links
            .iter()
            .filter(|(_, l)| l.failed)
            .map(|(&id, _)| id)
            .collect()
    }

    /// Queue a message for one client. Returns false if it could not be queued.
    pub fn notify(&mut self, id: PlayerId, msg: Outbound) -> bool {
        self.links.get_mut(&id).is_some_and(|link| link.send(msg))
    }

    /// Tell every client about this tick's deaths.
    pub fn broadcast_deaths(&mut self, deaths: &[Death]) {
        for death in deaths {
            let msg = Outbound::PlayerDied {
                player: death.player,
                final_score: death.final_score,
                cause: death.cause,
            };
            for link in self.links.values_mut() {
                link.send(msg.clone());
            }
        }
    }

    /// Ship tick `tick` to every client.
    pub fn ship(&mut self, store: &EntityStore, tick: u64) {
        let floor = store.history_floor();
        let mut snapshot: Option<Arc<WorldSnapshot>> = None;
        self.deltas.clear();

        for (id, link) in self.links.iter_mut() {
            if link.failed {
                continue;
            }
            let msg = if link.needs_snapshot || link.base_tick < floor {
                let snap = snapshot
                    .get_or_insert_with(|| Arc::new(build_snapshot(store, tick)))
                    .clone();
                link.needs_snapshot = false;
                link.base_tick = tick;
                Outbound::Snapshot(snap)
            } else {
                let base = link.base_tick;
                let delta = self
                    .deltas
                    .entry(base)
                    .or_insert_with(|| Arc::new(build_delta(store, base, tick)))
                    .clone();
                Outbound::Delta(delta)
            };
            if !link.send(msg) {
                debug!("Outbound queue for player {} is full or closed", id);
            }
        }
    }
}

/// Full state of the world at `tick`.
pub fn build_snapshot(store: &EntityStore, tick: u64) -> WorldSnapshot {
    WorldSnapshot {
        tick,
        players: store.players().map(|p| p.view()).collect(),
        food: store.foods().map(|f| f.view()).collect(),
    }
}

/// Everything that changed after `base` up to `tick`.
pub fn build_delta(store: &EntityStore, base: u64, tick: u64) -> WorldDelta {
    WorldDelta {
        tick,
        base_tick: base,
        players: store
            .players()
            .filter(|p| p.version > base)
            .map(|p| p.view())
            .collect(),
        food: store
            .foods()
            .filter(|f| f.version > base)
            .map(|f| f.view())
            .collect(),
        removed: store.removed_since(base).map(|id| id.key()).collect(),
    }
}
