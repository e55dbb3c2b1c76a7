//! The discrete strategy space: lysogeny fractions `0.00, 0.01, ..., 1.00`.

use rand::Rng;
use std::ops::Range;

/// Reach of a local mutation, in grid points.
pub const MUTATION_RADIUS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyGrid {
    points: usize,
}

impl Default for StrategyGrid {
    fn default() -> Self {
        Self { points: 101 }
    }
}

impl StrategyGrid {
    pub fn len(&self) -> usize {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }

    pub fn last_index(&self) -> usize {
        self.points - 1
    }

    /// Fraction at `index`, clamped to `[0, 1]`.
    pub fn value(&self, index: usize) -> f64 {
        (index as f64 / self.last_index() as f64).clamp(0.0, 1.0)
    }

    /// Nearest grid index for a fraction.
    pub fn index_of(&self, value: f64) -> usize {
        let scaled = (value.clamp(0.0, 1.0) * self.last_index() as f64).round();
        (scaled as usize).min(self.last_index())
    }

    /// Candidate indices for a mutation around `index`.
    ///
    /// The window is half-open: it starts `MUTATION_RADIUS` below `index` and
    /// stops just short of `MUTATION_RADIUS` above it, never reaching the last
    /// grid point from below.
    pub fn neighborhood(&self, index: usize) -> Range<usize> {
        let start = index.saturating_sub(MUTATION_RADIUS);
        let end = (index + MUTATION_RADIUS).min(self.last_index());
        start..end.max(start + 1)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..self.points)
    }

    pub fn sample_near<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> usize {
        rng.gen_range(self.neighborhood(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn grid_spans_unit_interval() {
        let grid = StrategyGrid::default();
        assert_eq!(grid.len(), 101);
        assert_eq!(grid.value(0), 0.0);
        assert_eq!(grid.value(100), 1.0);
        assert_eq!(grid.value(7).to_string(), "0.07");
        assert_eq!(grid.index_of(0.07), 7);
        assert_eq!(grid.index_of(1.3), 100);
    }

    #[test]
    fn neighborhood_is_clipped_at_both_ends() {
        let grid = StrategyGrid::default();
        assert_eq!(grid.neighborhood(0), 0..3);
        assert_eq!(grid.neighborhood(2), 0..5);
        assert_eq!(grid.neighborhood(50), 47..53);
        assert_eq!(grid.neighborhood(99), 96..100);
        assert_eq!(grid.neighborhood(100), 97..100);
    }

    #[test]
    fn mutation_stays_in_range() {
        let grid = StrategyGrid::default();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        for index in 0..grid.len() {
            for _ in 0..200 {
                let next = grid.sample_near(index, &mut rng);
                assert!(next + MUTATION_RADIUS >= index);
                assert!(next <= (index + MUTATION_RADIUS).min(100));
                assert!((0.0..=1.0).contains(&grid.value(next)));
            }
        }
    }
}
