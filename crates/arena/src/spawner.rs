//! Food placement and archetype selection.

use std::sync::Arc;

use glam::Vec2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::f32::consts::TAU;
use tracing::debug;

use crate::entity::{Food, FoodArchetype, FoodId};
use crate::registry::Registry;
use crate::spatial::{GridEntry, SpatialIndex, SpatialKey};
use crate::store::EntityStore;

/// Places food and draws the room's random numbers. With a fixed seed every
/// draw is reproducible.
#[derive(Debug)]
pub struct FoodSpawner {
    rng: StdRng,
    registry: Arc<Registry>,
    scratch: Vec<GridEntry>,
}

impl FoodSpawner {
    /// Seed from `arena.seed`, or from the OS when unset.
    pub fn new(registry: Arc<Registry>) -> Self {
        let rng = match registry.config.arena.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            registry,
            scratch: Vec::new(),
        }
    }

    pub fn with_seed(registry: Arc<Registry>, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            registry,
            scratch: Vec::new(),
        }
    }

    /// Index into the archetype table, drawn by spawn weight.
    pub fn select_index(&mut self) -> usize {
        let r = self.rng.random::<f32>() * self.registry.total_weight;
        let mut cumulative = 0.0;
        for (i, archetype) in self.registry.archetypes.iter().enumerate() {
            if archetype.spawn_weight <= 0.0 {
                continue;
            }
            cumulative += archetype.spawn_weight;
            if cumulative >= r {
                return i;
            }
        }
        0
    }

    pub fn select_archetype(&mut self) -> &FoodArchetype {
        let i = self.select_index();
        &self.registry.archetypes[i]
    }

    pub fn random_position(&mut self) -> Vec2 {
        self.registry.bounds.random_position(&mut self.rng)
    }

    /// Uniform position at least `margin` away from every edge, where the world allows it.
    pub fn random_position_inset(&mut self, margin: f32) -> Vec2 {
        self.registry.bounds.inset(margin).random_position(&mut self.rng)
    }

    pub fn random_heading(&mut self) -> f32 {
        self.rng.random::<f32>() * TAU
    }

    /// Create a food item of a random archetype at `position`.
    pub fn spawn_at(
        &mut self,
        store: &mut EntityStore,
        index: &mut SpatialIndex,
        position: Vec2,
    ) -> FoodId {
        let position = self.registry.bounds.clamp(position);
        let id = store.allocate_food_id();
        let food = Food::from_archetype(id, position, self.select_archetype());
        store.upsert_food(food);
        index.food.insert(SpatialKey::Food(id), position);
        id
    }

    /// Top live food up toward `target`, at most `max_spawn_per_tick` at a time.
    /// Returns the number spawned.
    pub fn replenish(
        &mut self,
        store: &mut EntityStore,
        index: &mut SpatialIndex,
        target: usize,
    ) -> usize {
        let food = &self.registry.config.food;
        let missing = target
            .saturating_sub(store.food_count())
            .min(food.max_spawn_per_tick);
        let (retries, cluster_radius, cluster_limit) =
            (food.spawn_retries, food.cluster_radius, food.cluster_limit);

        let mut spawned = 0;
        let mut skipped = 0;
        for _ in 0..missing {
            match self.find_spot(index, retries, cluster_radius, cluster_limit) {
                Some(position) => {
                    self.spawn_at(store, index, position);
                    spawned += 1;
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(skipped, spawned, "Food slots skipped, every draw too crowded");
        }
        spawned
    }

    /// Draw positions until one is not crowded. A limit of 0 disables the check.
    fn find_spot(
        &mut self,
        index: &SpatialIndex,
        retries: u32,
        radius: f32,
        limit: usize,
    ) -> Option<Vec2> {
        for _ in 0..=retries {
            let position = self.random_position();
            if limit == 0
                || index.food.count_within(position, radius, &mut self.scratch) < limit
            {
                return Some(position);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn registry(archetypes: Vec<FoodArchetype>) -> Arc<Registry> {
        let mut config = Config::default();
        config.food.archetypes = archetypes;
        Registry::from_config(&config).unwrap()
    }

    #[test]
    fn frequencies_follow_weights() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        let mut spawner = FoodSpawner::with_seed(registry, 42);
        let mut counts = [0usize; 3];
        let draws = 20_000;
        for _ in 0..draws {
            counts[spawner.select_index()] += 1;
        }
        let expected = [0.80, 0.15, 0.05];
        for (count, p) in counts.iter().zip(expected) {
            let observed = *count as f64 / draws as f64;
            assert!((observed - p).abs() < 0.02, "observed {observed}, expected {p}");
        }
    }

    #[test]
    fn zero_weight_is_never_drawn() {
        let registry = registry(vec![
            FoodArchetype::new(0, "never", 1, 1, 1.0, 0.0),
            FoodArchetype::new(1, "half", 1, 1, 1.0, 0.5),
        ]);
        let mut spawner = FoodSpawner::with_seed(registry, 1);
        for _ in 0..1000 {
            assert_eq!(spawner.select_archetype().kind, 1);
        }
    }

    #[test]
    fn replenish_is_bounded_per_tick() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        let mut store = EntityStore::new(8);
        let mut index = SpatialIndex::new(&registry.bounds, 64.0);
        let mut spawner = FoodSpawner::with_seed(registry.clone(), 3);

        assert_eq!(spawner.replenish(&mut store, &mut index, 600), 50);
        assert_eq!(store.food_count(), 50);
        assert_eq!(index.food.len(), 50);
        assert_eq!(spawner.replenish(&mut store, &mut index, 60), 10);
        assert_eq!(spawner.replenish(&mut store, &mut index, 60), 0);
        store.for_each_food(|f| assert!(registry.bounds.contains(f.position)));
    }

    #[test]
    fn crowded_world_skips_slots() {
        let mut config = Config::default();
        config.arena.map_size = 10.0;
        config.food.cluster_radius = 100.0;
        config.food.cluster_limit = 3;
        let registry = Registry::from_config(&config).unwrap();
        let mut store = EntityStore::new(8);
        let mut index = SpatialIndex::new(&registry.bounds, 64.0);
        let mut spawner = FoodSpawner::with_seed(registry, 9);

        assert_eq!(spawner.replenish(&mut store, &mut index, 20), 3);
        assert_eq!(store.food_count(), 3);
    }

    #[test]
    fn same_seed_same_draws() {
        let registry = Registry::from_config(&Config::default()).unwrap();
        let mut a = FoodSpawner::with_seed(registry.clone(), 77);
        let mut b = FoodSpawner::with_seed(registry, 77);
        for _ in 0..100 {
            assert_eq!(a.random_position(), b.random_position());
            assert_eq!(a.select_index(), b.select_index());
        }
    }
}
