//! Collision detection for one tick.
//!
//! Everything is decided against a single snapshot of positions taken after
//! movement, walking players in id order:
//! - Boundary (die or clamp, per policy)
//! - Head against head (both die)
//! - Head against another body (head owner dies)
//! - Head against own body past the grace segments
//! - Food, for players that survived the checks above
//!
//! The resolver only reports. Callers apply the resulting [`Resolution`]s.

use fixedbitset::FixedBitSet;
use glam::Vec2;
use protocol::DeathCause;
use std::collections::HashSet;

use crate::config::BoundaryPolicy;
use crate::entity::{FoodId, PlayerId};
use crate::pool::ObjectPool;
use crate::registry::Registry;
use crate::spatial::{GridEntry, SpatialIndex, SpatialKey};
use crate::store::EntityStore;

/// One outcome of collision detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Died { player: PlayerId, cause: DeathCause },
    Ate { player: PlayerId, food: FoodId },
    /// Head left the world and is pushed back onto the edge.
    Clamped { player: PlayerId },
    /// The index referenced something the store no longer holds.
    Stale(GridEntry),
}

#[derive(Debug, Clone, Copy)]
struct Head {
    id: PlayerId,
    position: Vec2,
}

/// True if two circles overlap.
#[inline]
pub fn circles_overlap(a: Vec2, ra: f32, b: Vec2, rb: f32) -> bool {
    let r = ra + rb;
    a.distance_squared(b) < r * r
}

/// Reusable collision pass. Owns its scratch buffers between ticks.
#[derive(Debug, Default)]
pub struct CollisionResolver {
    heads: Vec<Head>,
    causes: Vec<Option<DeathCause>>,
    dying: FixedBitSet,
    claimed: HashSet<FoodId>,
}

impl CollisionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detect this tick's collisions, appending outcomes to `out`.
    pub fn resolve(
        &mut self,
        store: &EntityStore,
        index: &SpatialIndex,
        registry: &Registry,
        pools: &mut ObjectPool,
        out: &mut Vec<Resolution>,
    ) {
        let bounds = registry.bounds;
        let arena = &registry.config.arena;
        let radius = registry.config.player.head_radius;
        let grace = arena.self_collision_grace_segments;

        self.heads.clear();
        self.causes.clear();
        self.claimed.clear();

        // Boundary. Out-of-bounds heads are clamped for every later check.
        // Non-finite players are left to the audit.
        for player in store.players().filter(|p| p.alive && p.is_finite()) {
            let mut position = player.position;
            let mut cause = None;
            if !bounds.contains(position) {
                position = bounds.clamp(position);
                match arena.boundary_policy {
                    BoundaryPolicy::Wall => cause = Some(DeathCause::Wall),
                    BoundaryPolicy::Clamp => out.push(Resolution::Clamped { player: player.id }),
                }
            }
            self.heads.push(Head {
                id: player.id,
                position,
            });
            self.causes.push(cause);
        }

        self.dying.clear();
        self.dying.grow(self.heads.len());

        let mut candidates = pools.entries.acquire();

        for (slot, head) in self.heads.iter().enumerate() {
            candidates.clear();
            index.bodies.query_into(head.position, radius * 2.0, &mut candidates);

            let mut head_on = None;
            let mut killer: Option<PlayerId> = None;
            let mut hit_self = false;
            for entry in &candidates {
                match entry.key {
                    SpatialKey::Head(other) if other != head.id => {
                        // Compare against the other head's clamped position.
                        let other_pos = self
                            .heads
                            .binary_search_by_key(&other, |h| h.id)
                            .map(|i| self.heads[i].position)
                            .unwrap_or(entry.position);
                        if circles_overlap(head.position, radius, other_pos, radius)
                            && head_on.is_none()
                        {
                            head_on = Some(other);
                        }
                    }
                    SpatialKey::Segment { owner, index: seg } => {
                        if !circles_overlap(head.position, radius, entry.position, radius) {
                            continue;
                        }
                        if owner != head.id {
                            if store.player(owner).is_none() {
                                out.push(Resolution::Stale(*entry));
                                continue;
                            }
                            killer = Some(killer.map_or(owner, |k| k.min(owner)));
                        } else if seg >= grace {
                            hit_self = true;
                        }
                    }
                    _ => {}
                }
            }

            let cause = &mut self.causes[slot];
            if cause.is_none() {
                *cause = if let Some(other) = head_on {
                    Some(DeathCause::HeadOn { other })
                } else if let Some(killer) = killer {
                    Some(DeathCause::Body { killer })
                } else if hit_self {
                    Some(DeathCause::SelfCollision)
                } else {
                    None
                };
            }
        }

        // Head-on partners always die together. A partner with an earlier cause keeps it.
        for slot in 0..self.heads.len() {
            if let Some(DeathCause::HeadOn { other }) = self.causes[slot] {
                if let Ok(i) = self.heads.binary_search_by_key(&other, |h| h.id) {
                    if self.causes[i].is_none() {
                        self.causes[i] = Some(DeathCause::HeadOn {
                            other: self.heads[slot].id,
                        });
                    }
                }
            }
        }

        for (slot, cause) in self.causes.iter().enumerate() {
            if let Some(cause) = *cause {
                self.dying.insert(slot);
                out.push(Resolution::Died {
                    player: self.heads[slot].id,
                    cause,
                });
            }
        }

        // Food for survivors.
        let consume = registry.config.food.consume_radius;
        for (slot, head) in self.heads.iter().enumerate() {
            if self.dying.contains(slot) {
                continue;
            }
            candidates.clear();
            index.food.query_into(head.position, consume, &mut candidates);
            candidates.sort_unstable_by_key(|e| food_id(e));
            for entry in &candidates {
                let SpatialKey::Food(food) = entry.key else {
                    continue;
                };
                if entry.position.distance_squared(head.position) > consume * consume {
                    continue;
                }
                if !self.claimed.insert(food) {
                    continue;
                }
                if store.food(food).is_none() {
                    out.push(Resolution::Stale(*entry));
                    continue;
                }
                out.push(Resolution::Ate {
                    player: head.id,
                    food,
                });
            }
        }

        pools.entries.release(candidates);
    }
}

fn food_id(entry: &GridEntry) -> FoodId {
    match entry.key {
        SpatialKey::Food(id) => id,
        _ => FoodId::MAX,
    }
}
