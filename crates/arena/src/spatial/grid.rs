//! Uniform grid spatial hash.

use glam::Vec2;

use super::{Bounds, GridEntry, SpatialKey};
use crate::world::WorldBounds;

/// Fixed-size grid of cells covering the world. Each entry lives in the
/// single cell containing its point; positions outside the world land in
/// the nearest edge cell.
pub struct SpatialGrid {
    cells: Vec<Vec<GridEntry>>,
    /// Cells per row and per column.
    cols: usize,
    cell_size: f32,
    origin: Vec2,
    len: usize,
}

impl SpatialGrid {
    pub fn new(bounds: &WorldBounds, cell_size: f32) -> Self {
        let cols = ((bounds.size() / cell_size).ceil() as usize).max(1);
        Self {
            cells: vec![Vec::new(); cols * cols],
            cols,
            cell_size,
            origin: bounds.min,
            len: 0,
        }
    }

    /// Column or row for a coordinate, clamped to the grid.
    #[inline]
    fn axis(&self, v: f32, origin: f32) -> usize {
        // Float to int casts saturate and map NaN to 0.
        let c = ((v - origin) / self.cell_size).floor() as i64;
        c.clamp(0, self.cols as i64 - 1) as usize
    }

    #[inline]
    fn grid_index(&self, p: Vec2) -> usize {
        self.axis(p.y, self.origin.y) * self.cols + self.axis(p.x, self.origin.x)
    }

    pub fn insert(&mut self, key: SpatialKey, position: Vec2) {
        let idx = self.grid_index(position);
        self.cells[idx].push(GridEntry { key, position });
        self.len += 1;
    }

    /// Remove the entry for `key` indexed at `position`. Returns false if absent.
    pub fn remove(&mut self, key: SpatialKey, position: Vec2) -> bool {
        let idx = self.grid_index(position);
        let cell = &mut self.cells[idx];
        match cell.iter().position(|e| e.key == key) {
            Some(i) => {
                cell.swap_remove(i);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append every entry whose cell overlaps the circle's bounding box.
    /// The result is a superset; callers check exact distance.
    pub fn query_into(&self, center: Vec2, radius: f32, out: &mut Vec<GridEntry>) {
        let b = Bounds::from_center(center, radius);
        let min_gx = self.axis(b.min_x, self.origin.x);
        let max_gx = self.axis(b.max_x, self.origin.x);
        let min_gy = self.axis(b.min_y, self.origin.y);
        let max_gy = self.axis(b.max_y, self.origin.y);

        for gy in min_gy..=max_gy {
            let row = gy * self.cols;
            for gx in min_gx..=max_gx {
                out.extend_from_slice(&self.cells[row + gx]);
            }
        }
    }

    /// Number of entries strictly closer than `radius` to `center`.
    pub fn count_within(&self, center: Vec2, radius: f32, buf: &mut Vec<GridEntry>) -> usize {
        buf.clear();
        self.query_into(center, radius, buf);
        let r2 = radius * radius;
        buf.iter()
            .filter(|e| e.position.distance_squared(center) < r2)
            .count()
    }
}

impl std::fmt::Debug for SpatialGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialGrid")
            .field("entries", &self.len)
            .field("cols", &self.cols)
            .field("cell_size", &self.cell_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(&WorldBounds::new(200.0), 20.0)
    }

    fn keys(entries: &[GridEntry]) -> Vec<SpatialKey> {
        entries.iter().map(|e| e.key).collect()
    }

    #[test]
    fn insert_query() {
        let mut g = grid();
        g.insert(SpatialKey::Food(1), Vec2::new(10.0, 10.0));
        g.insert(SpatialKey::Food(2), Vec2::new(150.0, 150.0));
        g.insert(SpatialKey::Food(3), Vec2::new(35.0, 12.0));

        let mut out = Vec::new();
        g.query_into(Vec2::new(12.0, 12.0), 15.0, &mut out);
        let found = keys(&out);
        assert!(found.contains(&SpatialKey::Food(1)));
        assert!(found.contains(&SpatialKey::Food(3)));
        assert!(!found.contains(&SpatialKey::Food(2)));

        assert_eq!(g.count_within(Vec2::new(12.0, 12.0), 15.0, &mut out), 1);
    }

    #[test]
    fn outside_positions_clamp_to_edge() {
        let mut g = grid();
        g.insert(SpatialKey::Head(7), Vec2::new(-50.0, 500.0));
        g.insert(SpatialKey::Head(8), Vec2::new(f32::NAN, 0.0));
        assert_eq!(g.len(), 2);

        let mut out = Vec::new();
        g.query_into(Vec2::new(0.0, 199.0), 1.0, &mut out);
        assert_eq!(keys(&out), vec![SpatialKey::Head(7)]);

        assert!(g.remove(SpatialKey::Head(7), Vec2::new(-50.0, 500.0)));
        assert!(!g.remove(SpatialKey::Head(7), Vec2::new(-50.0, 500.0)));
        assert!(g.remove(SpatialKey::Head(8), Vec2::new(f32::NAN, 0.0)));
        assert!(g.is_empty());
    }
}
