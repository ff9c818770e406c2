//! World geometry.

use glam::Vec2;
use rand::Rng;

/// The square world `[0, size] x [0, size]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl WorldBounds {
    pub fn new(size: f32) -> Self {
        Self {
            min: Vec2::ZERO,
            max: Vec2::splat(size),
        }
    }

    #[inline]
    pub fn size(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Nearest point inside the world.
    #[inline]
    pub fn clamp(&self, p: Vec2) -> Vec2 {
        p.clamp(self.min, self.max)
    }

    /// Bounds shrunk by `margin` on every side, never past the centre.
    pub fn inset(&self, margin: f32) -> Self {
        let margin = margin.clamp(0.0, self.size() / 2.0);
        Self {
            min: self.min + margin,
            max: self.max - margin,
        }
    }

    /// Uniform random position within the bounds.
    #[inline]
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        Vec2::new(
            self.min.x + rng.random::<f32>() * (self.max.x - self.min.x),
            self.min.y + rng.random::<f32>() * (self.max.y - self.min.y),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::StdRng};

    #[test]
    fn clamp_and_contains() {
        let b = WorldBounds::new(100.0);
        assert!(b.contains(Vec2::new(0.0, 100.0)));
        assert!(!b.contains(Vec2::new(-0.1, 50.0)));
        assert_eq!(b.clamp(Vec2::new(120.0, -3.0)), Vec2::new(100.0, 0.0));
    }

    #[test]
    fn inset_never_inverts() {
        let b = WorldBounds::new(10.0).inset(50.0);
        assert_eq!(b.min, Vec2::splat(5.0));
        assert_eq!(b.max, Vec2::splat(5.0));
    }

    #[test]
    fn random_positions_stay_inside() {
        let b = WorldBounds::new(50.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            assert!(b.contains(b.random_position(&mut rng)));
        }
    }
}
