//! Player snakes.

use glam::Vec2;
use protocol::Color;
use protocol::packets::PlayerView;
use std::f32::consts::{PI, TAU};

use super::PlayerId;
use crate::world::WorldBounds;

/// Identity and look injected at join.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cosmetic {
    pub skin: Option<String>,
    pub color: Color,
}

/// One body segment. Owned by exactly one player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub position: Vec2,
}

impl Segment {
    #[inline]
    pub fn new(position: Vec2) -> Self {
        Self { position }
    }
}

/// A snake in the arena.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub cosmetic: Cosmetic,
    /// Head position.
    pub position: Vec2,
    /// Current heading in radians, within `[-PI, PI)`.
    pub heading: f32,
    /// Heading requested by the latest input.
    pub target_heading: f32,
    /// Boost held by the latest input.
    pub boost_requested: bool,
    /// Remaining ticks of boost granted by food.
    pub boost_ticks: u32,
    pub alive: bool,
    pub score: u64,
    /// Body, head to tail. Does not include the head itself.
    pub segments: Vec<Segment>,
    pub joined_tick: u64,
    pub died_at: Option<u64>,
    pub version: u64,
}

impl Player {
    pub fn new(
        id: PlayerId,
        name: String,
        cosmetic: Cosmetic,
        position: Vec2,
        heading: f32,
        segments: Vec<Segment>,
        tick: u64,
    ) -> Self {
        let heading = wrap_angle(heading);
        Self {
            id,
            name,
            cosmetic,
            position,
            heading,
            target_heading: heading,
            boost_requested: false,
            boost_ticks: 0,
            alive: true,
            score: 0,
            segments,
            joined_tick: tick,
            died_at: None,
            version: tick,
        }
    }

    #[inline]
    pub fn is_boosting(&self) -> bool {
        self.boost_requested || self.boost_ticks > 0
    }

    /// Distance the head covers this tick.
    pub fn speed(&self, base: f32, boost_multiplier: f32) -> f32 {
        if self.is_boosting() {
            base * boost_multiplier
        } else {
            base
        }
    }

    /// Turn toward the target heading by at most `turn_rate` radians.
    /// A rate of zero turns instantly.
    pub fn steer(&mut self, turn_rate: f32) {
        let diff = wrap_angle(self.target_heading - self.heading);
        let turn = if turn_rate <= 0.0 {
            diff
        } else {
            diff.clamp(-turn_rate, turn_rate)
        };
        self.heading = wrap_angle(self.heading + turn);
    }

    /// Move the head forward and drag the body behind it at `spacing`.
    pub fn step(&mut self, distance: f32, spacing: f32) {
        self.position += Vec2::from_angle(self.heading) * distance;

        let mut leader = self.position;
        for segment in &mut self.segments {
            let offset = segment.position - leader;
            let dist = offset.length();
            if dist > spacing {
                segment.position = leader + offset * (spacing / dist);
            }
            leader = segment.position;
        }

        self.boost_ticks = self.boost_ticks.saturating_sub(1);
    }

    /// Append `count` segments at the tail, stopping at `max_segments` (0 = unbounded).
    /// Returns how many were added.
    pub fn grow(&mut self, count: u32, max_segments: usize) -> u32 {
        let tail = self.segments.last().map_or(self.position, |s| s.position);
        let mut added = 0;
        for _ in 0..count {
            if max_segments != 0 && self.segments.len() >= max_segments {
                break;
            }
            self.segments.push(Segment::new(tail));
            added += 1;
        }
        added
    }

    /// Pull the head and every segment back inside the world.
    pub fn clamp_into(&mut self, bounds: &WorldBounds) {
        self.position = bounds.clamp(self.position);
        for segment in &mut self.segments {
            segment.position = bounds.clamp(segment.position);
        }
    }

    /// True when the head and the whole body are inside `bounds`.
    pub fn is_within(&self, bounds: &WorldBounds) -> bool {
        bounds.contains(self.position) && self.segments.iter().all(|s| bounds.contains(s.position))
    }

    /// False if any coordinate or the heading is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.heading.is_finite()
            && self.segments.iter().all(|s| s.position.is_finite())
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            name: self.name.clone(),
            skin: self.cosmetic.skin.clone(),
            color: self.cosmetic.color,
            x: self.position.x,
            y: self.position.y,
            heading: self.heading,
            alive: self.alive,
            boosting: self.is_boosting(),
            score: self.score,
            segments: self
                .segments
                .iter()
                .map(|s| (s.position.x, s.position.y))
                .collect(),
        }
    }
}

/// Wrap an angle into `[-PI, PI)`.
#[inline]
pub fn wrap_angle(a: f32) -> f32 {
    (a + PI).rem_euclid(TAU) - PI
}
