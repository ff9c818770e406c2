//! Food items and the archetype table they are drawn from.

use glam::Vec2;
use protocol::packets::FoodView;
use serde::{Deserialize, Serialize};

use super::FoodId;

/// One row of the food archetype table.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FoodArchetype {
    pub kind: u16,
    pub name: String,
    pub points: u64,
    pub segments_granted: u32,
    pub mass: f32,
    /// Relative spawn frequency. All weights together must not exceed 1.0.
    pub spawn_weight: f32,
    /// Ticks of speed boost granted to the eater.
    #[serde(default)]
    pub boost_ticks: u32,
}

impl FoodArchetype {
    pub fn new(
        kind: u16,
        name: &str,
        points: u64,
        segments_granted: u32,
        mass: f32,
        spawn_weight: f32,
    ) -> Self {
        Self {
            kind,
            name: name.to_string(),
            points,
            segments_granted,
            mass,
            spawn_weight,
            boost_ticks: 0,
        }
    }
}

/// A food item lying in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: FoodId,
    pub position: Vec2,
    pub kind: u16,
    pub points: u64,
    pub segments_granted: u32,
    pub mass: f32,
    pub boost_ticks: u32,
    pub version: u64,
}

impl Food {
    /// Create a food item carrying the archetype's rewards.
    pub fn from_archetype(id: FoodId, position: Vec2, archetype: &FoodArchetype) -> Self {
        Self {
            id,
            position,
            kind: archetype.kind,
            points: archetype.points,
            segments_granted: archetype.segments_granted,
            mass: archetype.mass,
            boost_ticks: archetype.boost_ticks,
            version: 0,
        }
    }

    pub fn view(&self) -> FoodView {
        FoodView {
            id: self.id,
            x: self.position.x,
            y: self.position.y,
            kind: self.kind,
            mass: self.mass,
        }
    }
}
