//! Authoritative entity storage for one room.
//!
//! Maps are ordered by id so every pass over the world runs in the same
//! order on every run. Writers stamp the current tick into `version`;
//! removals leave a tombstone for a bounded number of ticks so deltas can
//! report them.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use crate::entity::{EntityId, EntityRef, Food, FoodId, Player, PlayerId, Segment};
use crate::pool::VecPool;

#[derive(Debug)]
pub struct EntityStore {
    players: BTreeMap<PlayerId, Player>,
    food: BTreeMap<FoodId, Food>,
    /// Removed entities and the tick they were removed in, oldest first.
    tombstones: VecDeque<(EntityId, u64)>,
    history_ticks: u64,
    /// Removals at or before this tick are forgotten.
    history_floor: u64,
    tick: u64,
    next_food_id: FoodId,
}

impl EntityStore {
    pub fn new(history_ticks: u64) -> Self {
        Self {
            players: BTreeMap::new(),
            food: BTreeMap::new(),
            tombstones: VecDeque::new(),
            history_ticks: history_ticks.max(1),
            history_floor: 0,
            tick: 0,
            next_food_id: 1,
        }
    }

    /// Start writing tick `tick` and forget tombstones that fell out of history.
    pub fn begin_tick(&mut self, tick: u64) {
        self.tick = tick;
        let cutoff = tick.saturating_sub(self.history_ticks);
        while let Some(&(_, removed_at)) = self.tombstones.front() {
            if removed_at >= cutoff {
                break;
            }
            self.history_floor = self.history_floor.max(removed_at);
            self.tombstones.pop_front();
        }
    }

    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Oldest base tick a delta can still be computed from.
    #[inline]
    pub fn history_floor(&self) -> u64 {
        self.history_floor
    }

    /// Insert or replace a player, stamping it with the current tick.
    pub fn upsert_player(&mut self, mut player: Player) -> &mut Player {
        player.version = self.tick;
        match self.players.entry(player.id) {
            Entry::Occupied(mut slot) => {
                slot.insert(player);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(player),
        }
    }

    /// Remove a player and return its segment vector to `pool`.
    /// Removing an absent id does nothing.
    pub fn remove_player(&mut self, id: PlayerId, pool: &mut VecPool<Segment>) -> Option<Player> {
        let mut player = self.players.remove(&id)?;
        pool.release(std::mem::take(&mut player.segments));
        self.tombstones.push_back((EntityId::Player(id), self.tick));
        Some(player)
    }

    pub fn upsert_food(&mut self, mut food: Food) {
        food.version = self.tick;
        self.food.insert(food.id, food);
    }

    pub fn remove_food(&mut self, id: FoodId) -> Option<Food> {
        let food = self.food.remove(&id)?;
        self.tombstones.push_back((EntityId::Food(id), self.tick));
        Some(food)
    }

    /// Next free food id. Wraps around, never yields 0 or a live id.
    pub fn allocate_food_id(&mut self) -> FoodId {
        loop {
            let id = self.next_food_id;
            self.next_food_id = self.next_food_id.wrapping_add(1).max(1);
            if id != 0 && !self.food.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Mutable access. Marks the player as changed this tick.
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        let tick = self.tick;
        self.players.get_mut(&id).map(|p| {
            p.version = tick;
            p
        })
    }

    pub fn food(&self, id: FoodId) -> Option<&Food> {
        self.food.get(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<EntityRef<'_>> {
        match id {
            EntityId::Player(id) => self.players.get(&id).map(EntityRef::Player),
            EntityId::Food(id) => self.food.get(&id).map(EntityRef::Food),
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        match id {
            EntityId::Player(id) => self.players.contains_key(&id),
            EntityId::Food(id) => self.food.contains_key(&id),
        }
    }

    /// Visit players in id order.
    pub fn for_each_player(&self, mut f: impl FnMut(&Player)) {
        for player in self.players.values() {
            f(player);
        }
    }

    /// Visit food in id order.
    pub fn for_each_food(&self, mut f: impl FnMut(&Food)) {
        for food in self.food.values() {
            f(food);
        }
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn foods(&self) -> impl Iterator<Item = &Food> {
        self.food.values()
    }

    pub fn player_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.keys().copied()
    }

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    /// Entities removed after `base` that are not live again.
    pub fn removed_since(&self, base: u64) -> impl Iterator<Item = EntityId> + '_ {
        self.tombstones
            .iter()
            .filter(move |&&(id, at)| at > base && !self.contains(id))
            .map(|&(id, _)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Cosmetic, FoodArchetype};
    use glam::Vec2;

    fn player(id: PlayerId) -> Player {
        let body = vec![Segment::new(Vec2::new(1.0, 1.0)); 4];
        Player::new(id, format!("p{id}"), Cosmetic::default(), Vec2::ONE, 0.0, body, 0)
    }

    fn food(store: &mut EntityStore) -> FoodId {
        let id = store.allocate_food_id();
        let archetype = FoodArchetype::new(0, "pellet", 1, 1, 1.0, 1.0);
        store.upsert_food(Food::from_archetype(id, Vec2::ZERO, &archetype));
        id
    }

    #[test]
    fn remove_player_is_idempotent() {
        let mut store = EntityStore::new(8);
        let mut pool = VecPool::new(4);
        store.begin_tick(1);
        store.upsert_player(player(3));

        let removed = store.remove_player(3, &mut pool).unwrap();
        assert!(removed.segments.is_empty());
        assert_eq!(pool.stats().pooled, 1);

        assert!(store.remove_player(3, &mut pool).is_none());
        assert!(store.remove_player(99, &mut pool).is_none());
        assert_eq!(store.removed_since(0).count(), 1);
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn iteration_is_id_ordered() {
        let mut store = EntityStore::new(8);
        for id in [9, 2, 5] {
            store.upsert_player(player(id));
        }
        let mut seen = Vec::new();
        store.for_each_player(|p| seen.push(p.id));
        assert_eq!(seen, vec![2, 5, 9]);
    }

    #[test]
    fn food_ids_skip_zero_and_live() {
        let mut store = EntityStore::new(8);
        store.next_food_id = u32::MAX;
        let a = food(&mut store);
        let b = food(&mut store);
        assert_eq!(a, u32::MAX);
        assert_eq!(b, 1);

        store.next_food_id = 1;
        assert_eq!(store.allocate_food_id(), 2);
    }

    #[test]
    fn tombstones_expire() {
        let mut store = EntityStore::new(4);
        store.begin_tick(1);
        let id = food(&mut store);
        store.begin_tick(2);
        store.remove_food(id);

        store.begin_tick(6);
        assert_eq!(store.removed_since(1).collect::<Vec<_>>(), vec![EntityId::Food(id)]);
        assert_eq!(store.history_floor(), 0);

        store.begin_tick(7);
        assert_eq!(store.removed_since(1).count(), 0);
        assert_eq!(store.history_floor(), 2);
    }

    #[test]
    fn versions_track_writes() {
        let mut store = EntityStore::new(8);
        store.begin_tick(4);
        store.upsert_player(player(1));
        store.begin_tick(5);
        assert_eq!(store.get(EntityId::Player(1)).unwrap().version(), 4);
        store.player_mut(1).unwrap().score += 1;
        assert_eq!(store.player(1).unwrap().version, 5);
    }
}
