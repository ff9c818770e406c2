//! Spatial indexing for collision and spawn queries.
//!
//! A uniform grid per entity class, rebuilt once per tick after movement.

mod grid;

pub use grid::SpatialGrid;

use glam::Vec2;

use crate::entity::{FoodId, PlayerId};
use crate::store::EntityStore;
use crate::world::WorldBounds;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Square box of half-width `radius` around a point.
    #[inline]
    pub fn from_center(center: Vec2, radius: f32) -> Self {
        Self {
            min_x: center.x - radius,
            min_y: center.y - radius,
            max_x: center.x + radius,
            max_y: center.y + radius,
        }
    }
}

/// What a grid entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialKey {
    Head(PlayerId),
    Segment { owner: PlayerId, index: usize },
    Food(FoodId),
}

/// An indexed point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridEntry {
    pub key: SpatialKey,
    pub position: Vec2,
}

/// Grids over living snake bodies and over food.
#[derive(Debug)]
pub struct SpatialIndex {
    pub bodies: SpatialGrid,
    pub food: SpatialGrid,
}

impl SpatialIndex {
    pub fn new(bounds: &WorldBounds, cell_size: f32) -> Self {
        Self {
            bodies: SpatialGrid::new(bounds, cell_size),
            food: SpatialGrid::new(bounds, cell_size),
        }
    }

    /// Re-index every living player's head and segments and all food.
    /// Players awaiting purge are left out.
    pub fn rebuild(&mut self, store: &EntityStore) {
        self.bodies.clear();
        self.food.clear();

        store.for_each_player(|player| {
            if !player.alive {
                return;
            }
            self.bodies.insert(SpatialKey::Head(player.id), player.position);
            for (index, segment) in player.segments.iter().enumerate() {
                self.bodies.insert(
                    SpatialKey::Segment {
                        owner: player.id,
                        index,
                    },
                    segment.position,
                );
            }
        });

        store.for_each_food(|food| {
            self.food.insert(SpatialKey::Food(food.id), food.position);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_around_a_point() {
        let b = Bounds::from_center(Vec2::new(5.0, 5.0), 5.0);
        assert_eq!(
            b,
            Bounds {
                min_x: 0.0,
                min_y: 0.0,
                max_x: 10.0,
                max_y: 10.0,
            }
        );
    }
}
