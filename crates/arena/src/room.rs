//! One arena room: the tick function and its driver task.
//!
//! A room owns a [`Simulation`] and a [`Synchronizer`]. Connection tasks talk
//! to it only through its command queue; the room task is the only code that
//! touches the store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use protocol::{DisconnectReason, RejectReason};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandKind};
use crate::entity::PlayerId;
use crate::error::{ArenaError, ProtocolViolation};
use crate::registry::Registry;
use crate::results::{GameResult, ResultSink, SessionEnding};
use crate::simulation::{Simulation, TickReport};
use crate::sync::{Outbound, Synchronizer};

/// Ticks between timing summaries.
const STATS_INTERVAL: u64 = 250;

/// Lifecycle of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Idle,
    Running,
    /// No new joins; stops once empty or after the drain timeout.
    Draining,
    Stopped,
}

/// Sending side of a room's command queue.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub id: usize,
    commands: mpsc::UnboundedSender<Command>,
}

impl RoomHandle {
    /// Queue a command. Returns false once the room is gone.
    pub fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

#[derive(Debug)]
struct Session {
    name: String,
    joined_tick: u64,
}

#[derive(Debug, Default)]
struct TickStats {
    total: Duration,
    max: Duration,
    ticks: u32,
}

pub struct Room {
    id: usize,
    registry: Arc<Registry>,
    sim: Simulation,
    sync: Synchronizer,
    commands: mpsc::UnboundedReceiver<Command>,
    inbox: Vec<Command>,
    results: Box<dyn ResultSink>,
    /// Live sessions; a result is emitted when one is removed.
    sessions: BTreeMap<PlayerId, Session>,
    phase: RoomPhase,
    drain_deadline: Option<u64>,
    idle_ticks: u64,
    stats: TickStats,
}

impl Room {
    pub fn new(
        id: usize,
        registry: Arc<Registry>,
        results: Box<dyn ResultSink>,
    ) -> (Self, RoomHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = Self {
            id,
            sim: Simulation::new(registry.clone()),
            sync: Synchronizer::new(),
            commands: rx,
            inbox: Vec::new(),
            results,
            sessions: BTreeMap::new(),
            phase: RoomPhase::Idle,
            drain_deadline: None,
            idle_ticks: registry.ticks_for(registry.config.arena.idle_timeout_ms),
            stats: TickStats::default(),
            registry,
        };
        (room, RoomHandle { id, commands: tx })
    }

    #[inline]
    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.sim
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    fn transition(&mut self, to: RoomPhase) -> Result<(), ArenaError> {
        let allowed = matches!(
            (self.phase, to),
            (RoomPhase::Idle, RoomPhase::Running)
                | (RoomPhase::Running, RoomPhase::Draining)
                | (RoomPhase::Idle | RoomPhase::Running | RoomPhase::Draining, RoomPhase::Stopped)
        );
        if !allowed {
            return Err(ArenaError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        debug!("Room {}: {:?} -> {:?}", self.id, self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// Populate the world and start accepting players.
    pub fn start(&mut self) -> Result<(), ArenaError> {
        self.transition(RoomPhase::Running)?;
        let food = self.sim.fill_food();
        info!("Room {} started with {} food", self.id, food);
        Ok(())
    }

    /// Stop accepting joins. The room stops once empty or at the drain timeout.
    pub fn drain(&mut self) -> Result<(), ArenaError> {
        self.transition(RoomPhase::Draining)?;
        let timeout = self.registry.ticks_for(self.registry.config.arena.drain_timeout_ms);
        self.drain_deadline = Some(self.sim.tick().saturating_add(timeout));
        info!("Room {} draining, {} players left", self.id, self.sessions.len());
        Ok(())
    }

    /// End every session with `Shutdown` and stop.
    pub fn stop(&mut self) -> Result<(), ArenaError> {
        self.transition(RoomPhase::Stopped)?;
        let ids: Vec<PlayerId> = self.sync.ids().collect();
        for id in ids {
            self.sync
                .notify(id, Outbound::Disconnected(DisconnectReason::Shutdown));
            self.sync.detach(id);
        }
        let ids: Vec<PlayerId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.end_session(id, SessionEnding::Shutdown);
        }
        let ids: Vec<PlayerId> = self.sim.store().player_ids().collect();
        for id in ids {
            self.sim.remove_player(id);
        }
        info!("Room {} stopped at tick {}", self.id, self.sim.tick());
        Ok(())
    }

    /// Run one tick.
    pub fn tick(&mut self) -> TickReport {
        if matches!(self.phase, RoomPhase::Idle | RoomPhase::Stopped) {
            return TickReport::default();
        }
        let started = std::time::Instant::now();
        let tick = self.sim.begin_tick();

        // Clients whose queue failed during the last tick.
        for id in self.sync.failed_clients() {
            self.kick(id, DisconnectReason::SlowConsumer);
        }

        self.process_commands(tick);

        let limit = self.registry.config.arena.protocol_strike_limit;
        for id in self.sync.idle(tick, self.idle_ticks) {
            self.kick(id, DisconnectReason::Idle);
        }
        for id in self.sync.struck_out(limit) {
            self.kick(id, DisconnectReason::ProtocolViolations);
        }

        let report = self.sim.advance();

        for death in &report.deaths {
            self.finish(death.player, SessionEnding::Died(death.cause), Some(death.final_score));
        }
        self.sync.broadcast_deaths(&report.deaths);
        self.sync.ship(self.sim.store(), tick);

        self.sim.purge_dead();

        if self.phase == RoomPhase::Draining {
            let expired = self.drain_deadline.is_some_and(|d| tick >= d);
            if self.sessions.is_empty() || expired {
                if expired && !self.sessions.is_empty() {
                    warn!("Room {} drain timed out with {} players", self.id, self.sessions.len());
                }
                if let Err(e) = self.stop() {
                    warn!("Room {}: {}", self.id, e);
                }
            }
        }

        self.record(started.elapsed(), &report);
        report
    }

    fn process_commands(&mut self, tick: u64) {
        let mut inbox = std::mem::take(&mut self.inbox);
        while let Ok(command) = self.commands.try_recv() {
            inbox.push(command);
        }
        // Stable: arrival order is kept within each kind.
        inbox.sort_by_key(|c| c.kind.order());

        for command in inbox.drain(..) {
            let player = command.player;
            match self.handle(command, tick) {
                Ok(()) => {}
                Err(ArenaError::Protocol { player, reason }) => {
                    let strikes = self.sync.strike(player);
                    debug!("Player {}: {} (strike {})", player, reason, strikes);
                }
                Err(e @ ArenaError::Capacity { .. }) => {
                    info!("Join from {} rejected: {}", player, e);
                }
                Err(e) => warn!("Room {}: command from {} failed: {}", self.id, player, e),
            }
        }
        self.inbox = inbox;

        for (player, input) in self.sync.drain_inputs() {
            self.sim.apply_input(player, &input);
        }
    }

    fn handle(&mut self, command: Command, tick: u64) -> Result<(), ArenaError> {
        let player = command.player;
        let violation = |reason: ProtocolViolation| ArenaError::Protocol { player, reason };

        match command.kind {
            CommandKind::Leave => {
                if self.sync.detach(player).is_some() {
                    info!("Player {} left room {}", player, self.id);
                }
                self.end_session(player, SessionEnding::Left);
                self.sim.remove_player(player);
            }
            CommandKind::Join {
                name,
                cosmetic,
                outbound,
            } => {
                if self.phase != RoomPhase::Running {
                    reject(&outbound, player, RejectReason::Draining);
                    return Ok(());
                }
                if let Some(existing) = self.sim.store().player(player) {
                    if existing.alive {
                        reject(&outbound, player, RejectReason::AlreadyJoined);
                        return Err(violation(ProtocolViolation::DuplicateJoin));
                    }
                    // Dead and already shipped; make room for the new life.
                    self.sim.remove_player(player);
                }
                // Dead snakes awaiting purge have no session and do not count.
                let max_players = self.registry.config.arena.max_players;
                if self.sessions.len() >= max_players {
                    reject(&outbound, player, RejectReason::Capacity);
                    return Err(ArenaError::Capacity { max_players });
                }

                let spawned = self.sim.spawn_player(player, &name, cosmetic);
                let name = spawned.name.clone();
                self.sync.attach(player, outbound, tick);
                self.sync.notify(
                    player,
                    Outbound::Joined {
                        player,
                        tick,
                        map_size: self.registry.config.arena.map_size,
                        tick_rate_hz: u16::try_from(self.registry.config.arena.tick_rate_hz)
                            .unwrap_or(u16::MAX),
                    },
                );
                info!("Player {} ({}) joined room {}", player, name, self.id);
                self.sessions.insert(
                    player,
                    Session {
                        name,
                        joined_tick: tick,
                    },
                );
            }
            CommandKind::Ack { tick: acked } => {
                self.sync
                    .acknowledge(player, acked, tick.saturating_sub(1))
                    .map_err(violation)?;
            }
            CommandKind::Resync => {
                self.sync.request_resync(player).map_err(violation)?;
            }
            CommandKind::Input(input) => {
                self.sync.buffer_input(player, input, tick).map_err(violation)?;
            }
        }
        Ok(())
    }

    /// Disconnect one client and remove its snake.
    fn kick(&mut self, id: PlayerId, reason: DisconnectReason) {
        info!("Disconnecting player {} from room {}: {:?}", id, self.id, reason);
        self.sync.notify(id, Outbound::Disconnected(reason));
        self.sync.detach(id);
        self.end_session(id, SessionEnding::Disconnected(reason));
        self.sim.remove_player(id);
    }

    /// Emit the result for a live session. Later calls for the same session do nothing.
    fn end_session(&mut self, id: PlayerId, ending: SessionEnding) {
        self.finish(id, ending, None);
    }

    /// `score` overrides the stored score, for players the audit already removed.
    fn finish(&mut self, id: PlayerId, ending: SessionEnding, score: Option<u64>) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        let ticks = self.sim.tick().saturating_sub(session.joined_tick);
        let final_score = score
            .or_else(|| self.sim.store().player(id).map(|p| p.score))
            .unwrap_or(0);
        self.results.submit(GameResult {
            player: id,
            name: session.name,
            final_score,
            duration_ms: self.registry.millis_for(ticks),
            ending,
        });
    }

    fn record(&mut self, elapsed: Duration, report: &TickReport) {
        let budget = self.registry.tick_duration.mul_f64(0.9);
        if elapsed > budget {
            warn!(
                "Room {}: slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} players, {} food",
                self.id,
                report.tick,
                elapsed.as_secs_f64() * 1000.0,
                budget.as_secs_f64() * 1000.0,
                self.sim.store().player_count(),
                self.sim.store().food_count()
            );
        }

        self.stats.total += elapsed;
        self.stats.max = self.stats.max.max(elapsed);
        self.stats.ticks += 1;
        if report.tick % STATS_INTERVAL == 0 {
            let pools = self.sim.pools();
            let segments = pools.segments.stats();
            debug!(
                "Room {} tick #{}: avg {:.2}ms max {:.2}ms | {} players, {} food, {} clients | segment pool {}/{} hits",
                self.id,
                report.tick,
                self.stats.total.as_secs_f64() * 1000.0 / f64::from(self.stats.ticks.max(1)),
                self.stats.max.as_secs_f64() * 1000.0,
                self.sim.store().player_count(),
                self.sim.store().food_count(),
                self.sync.len(),
                segments.hits,
                segments.hits + segments.misses,
            );
            self.stats = TickStats::default();
        }
    }
}

fn reject(outbound: &mpsc::Sender<Outbound>, player: PlayerId, reason: RejectReason) {
    if outbound.try_send(Outbound::JoinRejected(reason)).is_err() {
        debug!("Join rejection for player {} could not be queued", player);
    }
}

/// Drive a room at its tick rate until it stops.
///
/// Late ticks run back to back so none is skipped. A backlog larger than
/// `max_tick_backlog` ticks resets the schedule to now instead.
pub async fn run_room(mut room: Room, mut shutdown: watch::Receiver<bool>) {
    if let Err(e) = room.start() {
        warn!("Room {} failed to start: {}", room.id, e);
        return;
    }

    let period = room.registry.tick_duration;
    let max_backlog = room.registry.config.arena.max_tick_backlog;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut draining = false;

    loop {
        tokio::select! {
            scheduled = ticker.tick() => {
                let lag = Instant::now().saturating_duration_since(scheduled);
                if lag >= period {
                    let behind = (lag.as_nanos() / period.as_nanos().max(1)) as u64;
                    if behind > u64::from(max_backlog) {
                        warn!("Room {} is {} ticks behind, resetting schedule", room.id, behind);
                        ticker.reset();
                    } else {
                        warn!("Room {} late tick #{} (lag: {:?})", room.id, room.sim.tick() + 1, lag);
                    }
                }
                room.tick();
                if room.phase() == RoomPhase::Stopped {
                    break;
                }
            }
            changed = shutdown.changed(), if !draining => {
                if changed.is_err() || *shutdown.borrow() {
                    draining = true;
                    if let Err(e) = room.drain() {
                        warn!("Room {}: {}", room.id, e);
                    }
                }
            }
        }
    }
}
