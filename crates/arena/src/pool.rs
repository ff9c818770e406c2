//! Recycled vectors for per-tick hot allocations.
//!
//! Segment bodies, spatial query buffers and id lists are acquired here and
//! handed back cleared, so steady-state ticks do not allocate.

use crate::entity::{PlayerId, Segment};
use crate::spatial::GridEntry;

/// Free list of cleared vectors that keep their capacity.
#[derive(Debug)]
pub struct VecPool<T> {
    free: Vec<Vec<T>>,
    max_pooled: usize,
    hits: u64,
    misses: u64,
}

/// Counters for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub pooled: usize,
}

impl<T> VecPool<T> {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Vec::new(),
            max_pooled,
            hits: 0,
            misses: 0,
        }
    }

    /// Take an empty vector, reusing a released one when available.
    pub fn acquire(&mut self) -> Vec<T> {
        match self.free.pop() {
            Some(v) => {
                self.hits += 1;
                v
            }
            None => {
                self.misses += 1;
                Vec::new()
            }
        }
    }

    /// Return a vector. Its contents are dropped; capacity is kept.
    pub fn release(&mut self, mut v: Vec<T>) {
        if self.free.len() < self.max_pooled && v.capacity() > 0 {
            v.clear();
            self.free.push(v);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits,
            misses: self.misses,
            pooled: self.free.len(),
        }
    }
}

/// All pools owned by one room.
#[derive(Debug)]
pub struct ObjectPool {
    pub segments: VecPool<Segment>,
    pub entries: VecPool<GridEntry>,
    pub ids: VecPool<PlayerId>,
}

impl ObjectPool {
    pub fn new(max_players: usize) -> Self {
        Self {
            segments: VecPool::new(max_players),
            entries: VecPool::new(8),
            ids: VecPool::new(8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_vectors_come_back_empty() {
        let mut pool: VecPool<u32> = VecPool::new(2);
        let mut v = pool.acquire();
        v.extend([1, 2, 3]);
        let cap = v.capacity();
        pool.release(v);

        let v = pool.acquire();
        assert!(v.is_empty());
        assert_eq!(v.capacity(), cap);
        assert_eq!(pool.stats(), PoolStats { hits: 1, misses: 1, pooled: 0 });
    }

    #[test]
    fn pool_is_bounded() {
        let mut pool: VecPool<u8> = VecPool::new(1);
        pool.release(vec![1]);
        pool.release(vec![2]);
        assert_eq!(pool.stats().pooled, 1);
    }
}
