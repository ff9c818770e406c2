//! The deterministic per-tick simulation of one room.
//!
//! `Simulation` owns the store, the spatial index, the spawner and the
//! pools. It knows nothing about clients or queues: the room feeds it joins,
//! leaves and inputs between ticks and calls [`Simulation::advance`] once per
//! tick.

use std::sync::Arc;

use glam::Vec2;
use protocol::DeathCause;
use tracing::{debug, error};

use crate::collision::{CollisionResolver, Resolution};
use crate::command::PlayerInput;
use crate::entity::{Cosmetic, Food, FoodId, Player, PlayerId, Segment};
use crate::error::ArenaError;
use crate::pool::ObjectPool;
use crate::registry::Registry;
use crate::spatial::{SpatialIndex, SpatialKey};
use crate::spawner::FoodSpawner;
use crate::store::EntityStore;

/// A death decided this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Death {
    pub player: PlayerId,
    pub cause: DeathCause,
    pub final_score: u64,
}

/// What happened during one [`Simulation::advance`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub deaths: Vec<Death>,
    pub eaten: usize,
    pub spawned: usize,
    /// Entities force-removed by the audit.
    pub faults: usize,
}

#[derive(Debug)]
pub struct Simulation {
    registry: Arc<Registry>,
    store: EntityStore,
    index: SpatialIndex,
    spawner: FoodSpawner,
    resolver: CollisionResolver,
    pools: ObjectPool,
    resolutions: Vec<Resolution>,
    tick: u64,
}

impl Simulation {
    /// Build a simulation seeded from `arena.seed` (or the OS when unset).
    pub fn new(registry: Arc<Registry>) -> Self {
        let spawner = FoodSpawner::new(registry.clone());
        Self::with_spawner(registry, spawner)
    }

    pub fn with_seed(registry: Arc<Registry>, seed: u64) -> Self {
        let spawner = FoodSpawner::with_seed(registry.clone(), seed);
        Self::with_spawner(registry, spawner)
    }

    fn with_spawner(registry: Arc<Registry>, spawner: FoodSpawner) -> Self {
        let arena = &registry.config.arena;
        Self {
            store: EntityStore::new(arena.history_ticks),
            index: SpatialIndex::new(&registry.bounds, arena.grid_cell_size),
            pools: ObjectPool::new(arena.max_players),
            resolver: CollisionResolver::new(),
            resolutions: Vec::new(),
            spawner,
            registry,
            tick: 0,
        }
    }

    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Direct store access for setting up scenarios.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn pools(&self) -> &ObjectPool {
        &self.pools
    }

    /// Open the next tick. Commands applied before `advance` are stamped with it.
    pub fn begin_tick(&mut self) -> u64 {
        self.tick += 1;
        self.store.begin_tick(self.tick);
        self.tick
    }

    /// Place a new snake with a random position and heading.
    pub fn spawn_player(&mut self, id: PlayerId, name: &str, cosmetic: Cosmetic) -> &mut Player {
        let cfg = &self.registry.config.player;
        let spacing = cfg.segment_spacing;
        let count = cfg.start_segments;
        let margin = spacing * count as f32 + cfg.head_radius;
        let name: String = name.trim().chars().take(cfg.max_name_length).collect();

        let retries = self.registry.config.food.spawn_retries;

        // Prefer a spot with no living body within reach of the new snake.
        let mut scratch = self.pools.entries.acquire();
        let mut position = self.spawner.random_position_inset(margin);
        for _ in 0..retries {
            if self.index.bodies.count_within(position, margin, &mut scratch) == 0 {
                break;
            }
            position = self.spawner.random_position_inset(margin);
        }
        self.pools.entries.release(scratch);
        let heading = self.spawner.random_heading();
        self.spawn_player_at(id, &name, cosmetic, position, heading)
    }

    /// Place a new snake at a chosen spot, body trailing straight behind the head.
    pub fn spawn_player_at(
        &mut self,
        id: PlayerId,
        name: &str,
        cosmetic: Cosmetic,
        position: Vec2,
        heading: f32,
    ) -> &mut Player {
        let spacing = self.registry.config.player.segment_spacing;
        let count = self.registry.config.player.start_segments;
        let back = -Vec2::from_angle(heading) * spacing;

        let mut body = self.pools.segments.acquire();
        body.extend((1..=count).map(|i| Segment::new(position + back * i as f32)));

        let mut player = Player::new(
            id,
            name.to_string(),
            cosmetic,
            position,
            heading,
            body,
            self.tick,
        );
        player.clamp_into(&self.registry.bounds);
        debug!("Player {} spawned at ({:.1}, {:.1})", id, position.x, position.y);
        self.store.upsert_player(player)
    }

    /// Remove a player from the world. Absent ids are ignored.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.store.remove_player(id, &mut self.pools.segments)
    }

    /// Steer a living player. Returns false if there is no such living player.
    pub fn apply_input(&mut self, id: PlayerId, input: &PlayerInput) -> bool {
        match self.store.player_mut(id) {
            Some(player) if player.alive => {
                player.target_heading = input.heading;
                player.boost_requested = input.boost;
                true
            }
            _ => false,
        }
    }

    /// Remove players that died before the current tick.
    /// Their death has been shipped by then.
    pub fn purge_dead(&mut self) -> usize {
        let tick = self.tick;
        let mut ids = self.pools.ids.acquire();
        ids.extend(
            self.store
                .players()
                .filter(|p| p.died_at.is_some_and(|t| t < tick))
                .map(|p| p.id),
        );
        for &id in &ids {
            self.store.remove_player(id, &mut self.pools.segments);
        }
        let purged = ids.len();
        self.pools.ids.release(ids);
        purged
    }

    /// Move, collide, audit and replenish.
    pub fn advance(&mut self) -> TickReport {
        let mut report = TickReport {
            tick: self.tick,
            ..TickReport::default()
        };

        self.integrate_movement();
        self.index.rebuild(&self.store);

        let mut resolutions = std::mem::take(&mut self.resolutions);
        resolutions.clear();
        self.resolver.resolve(
            &self.store,
            &self.index,
            &self.registry,
            &mut self.pools,
            &mut resolutions,
        );
        for resolution in &resolutions {
            self.apply(*resolution, &mut report);
        }
        self.resolutions = resolutions;

        self.audit(&mut report);

        let target = self.registry.config.food.target_count;
        report.spawned = self
            .spawner
            .replenish(&mut self.store, &mut self.index, target);
        report
    }

    /// Spawn food until the target is met or a pass places nothing.
    pub fn fill_food(&mut self) -> usize {
        let target = self.registry.config.food.target_count;
        while self.store.food_count() < target {
            if self.spawner.replenish(&mut self.store, &mut self.index, target) == 0 {
                break;
            }
        }
        self.store.food_count()
    }

    fn integrate_movement(&mut self) {
        let cfg = &self.registry.config.player;
        let (turn_rate, spacing, speed, boost) =
            (cfg.turn_rate, cfg.segment_spacing, cfg.speed, cfg.boost_multiplier);

        let mut ids = self.pools.ids.acquire();
        ids.extend(self.store.players().filter(|p| p.alive).map(|p| p.id));
        for &id in &ids {
            if let Some(player) = self.store.player_mut(id) {
                player.steer(turn_rate);
                let distance = player.speed(speed, boost);
                player.step(distance, spacing);
            }
        }
        self.pools.ids.release(ids);
    }

    fn apply(&mut self, resolution: Resolution, report: &mut TickReport) {
        let bounds = self.registry.bounds;
        match resolution {
            Resolution::Died { player, cause } => {
                let tick = self.tick;
                if let Some(p) = self.store.player_mut(player) {
                    p.alive = false;
                    p.died_at = Some(tick);
                    p.boost_requested = false;
                    if cause == DeathCause::Wall {
                        p.clamp_into(&bounds);
                    }
                    debug!("Player {} died ({:?}) with score {}", player, cause, p.score);
                    report.deaths.push(Death {
                        player,
                        cause,
                        final_score: p.score,
                    });
                }
            }
            Resolution::Ate { player, food } => {
                let Some(eaten) = self.take_food(food) else {
                    return;
                };
                let max_segments = self.registry.config.player.max_segments;
                if let Some(p) = self.store.player_mut(player) {
                    p.score = p.score.saturating_add(eaten.points);
                    p.grow(eaten.segments_granted, max_segments);
                    p.boost_ticks = p.boost_ticks.saturating_add(eaten.boost_ticks);
                    report.eaten += 1;
                }
            }
            Resolution::Clamped { player } => {
                if let Some(p) = self.store.player_mut(player) {
                    p.clamp_into(&bounds);
                }
            }
            Resolution::Stale(entry) => {
                let err = ArenaError::InternalInvariant(format!(
                    "spatial index entry {:?} has no backing entity",
                    entry.key
                ));
                error!("{}, dropping it", err);
                let grid = match entry.key {
                    SpatialKey::Food(_) => &mut self.index.food,
                    _ => &mut self.index.bodies,
                };
                grid.remove(entry.key, entry.position);
            }
        }
    }

    fn take_food(&mut self, id: FoodId) -> Option<Food> {
        let food = self.store.remove_food(id)?;
        self.index.food.remove(SpatialKey::Food(id), food.position);
        Some(food)
    }

    /// Force-remove anything with non-finite or out-of-bounds state.
    fn audit(&mut self, report: &mut TickReport) {
        let bounds = self.registry.bounds;

        let mut ids = self.pools.ids.acquire();
        ids.extend(
            self.store
                .players()
                .filter(|p| !p.is_finite() || !p.is_within(&bounds))
                .map(|p| p.id),
        );
        for &id in &ids {
            if let Some(player) = self.remove_player(id) {
                let err = ArenaError::InternalInvariant(format!(
                    "player {} at ({}, {}) is non-finite or out of bounds",
                    id, player.position.x, player.position.y
                ));
                error!("{}, removing", err);
                report.faults += 1;
                // Already reported if the death happened earlier this tick.
                report.deaths.retain(|d| d.player != id);
                if player.alive || player.died_at == Some(self.tick) {
                    report.deaths.push(Death {
                        player: id,
                        cause: DeathCause::Fault,
                        final_score: player.score,
                    });
                }
            }
        }
        self.pools.ids.release(ids);

        let bad_food: Vec<FoodId> = self
            .store
            .foods()
            .filter(|f| !f.position.is_finite() || !bounds.contains(f.position))
            .map(|f| f.id)
            .collect();
        for id in bad_food {
            error!("Food {} failed the tick audit, removing", id);
            self.take_food(id);
            report.faults += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::spatial::GridEntry;

    fn sim(configure: impl FnOnce(&mut Config)) -> Simulation {
        let mut config = Config::default();
        config.arena.map_size = 1000.0;
        config.food.target_count = 0;
        configure(&mut config);
        Simulation::with_seed(Registry::from_config(&config).unwrap(), 11)
    }

    #[test]
    fn spawned_body_trails_the_head() {
        let mut sim = sim(|_| {});
        sim.begin_tick();
        let p = sim.spawn_player_at(1, "a", Cosmetic::default(), Vec2::new(500.0, 500.0), 0.0);
        assert_eq!(p.segments.len(), 6);
        assert_eq!(p.segments[0].position, Vec2::new(492.0, 500.0));
        assert_eq!(p.segments[5].position, Vec2::new(452.0, 500.0));
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        let mut sim = sim(|c| c.player.max_name_length = 4);
        sim.begin_tick();
        assert_eq!(sim.spawn_player(1, "  longname ", Cosmetic::default()).name, "long");
    }

    #[test]
    fn dead_players_linger_one_tick() {
        let mut sim = sim(|_| {});
        sim.begin_tick();
        sim.spawn_player_at(1, "a", Cosmetic::default(), Vec2::new(998.0, 500.0), 0.0);
        let report = sim.advance();
        assert_eq!(report.deaths.len(), 1);
        assert_eq!(report.deaths[0].cause, DeathCause::Wall);

        let p = sim.store().player(1).unwrap();
        assert!(!p.alive);
        assert!(p.is_within(&sim.registry().bounds));
        assert_eq!(sim.purge_dead(), 0);

        sim.begin_tick();
        assert_eq!(sim.purge_dead(), 1);
        assert!(sim.store().player(1).is_none());
    }

    #[test]
    fn input_ignored_for_dead_or_missing() {
        let mut sim = sim(|_| {});
        sim.begin_tick();
        let input = PlayerInput {
            seq: 1,
            heading: 1.0,
            boost: true,
        };
        assert!(!sim.apply_input(3, &input));
        sim.spawn_player_at(3, "a", Cosmetic::default(), Vec2::new(500.0, 500.0), 0.0);
        assert!(sim.apply_input(3, &input));
        sim.store_mut().player_mut(3).unwrap().alive = false;
        assert!(!sim.apply_input(3, &input));
    }

    #[test]
    fn audit_removes_non_finite_player() {
        let mut sim = sim(|_| {});
        sim.begin_tick();
        sim.spawn_player_at(1, "a", Cosmetic::default(), Vec2::new(500.0, 500.0), 0.0);
        sim.spawn_player_at(2, "b", Cosmetic::default(), Vec2::new(200.0, 200.0), 0.0);
        sim.store_mut().player_mut(1).unwrap().heading = f32::NAN;

        let report = sim.advance();
        assert_eq!(report.faults, 1);
        assert_eq!(
            report.deaths,
            vec![Death {
                player: 1,
                cause: DeathCause::Fault,
                final_score: 0
            }]
        );
        assert!(sim.store().player(1).is_none());
        assert!(sim.store().player(2).unwrap().alive);
    }

    #[test]
    fn stale_index_entries_are_dropped() {
        let mut sim = sim(|_| {});
        sim.begin_tick();
        let entry = GridEntry {
            key: SpatialKey::Food(999),
            position: Vec2::new(100.0, 100.0),
        };
        sim.index.food.insert(entry.key, entry.position);
        let before = sim.index.food.len();

        let mut report = TickReport::default();
        sim.apply(Resolution::Stale(entry), &mut report);
        assert_eq!(sim.index.food.len(), before - 1);
        assert!(report.deaths.is_empty());
        assert_eq!(sim.store().food_count(), 0);
    }
}
