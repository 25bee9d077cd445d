//! Random identifiers for edges and call sites.
//!
//! Identifiers are drawn uniformly and independently; collisions are possible
//! and tolerated, since the coverage map is a collision-tolerant bucket space.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::constants::AFL_COVERAGE_MAP_SIZE;

/// A seedable source of identifiers. One generator is created per pass run;
/// nothing carries over between modules.
pub struct IdGenerator {
    seed: u64,
    rng: StdRng,
}

impl IdGenerator {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A generator with a fresh random seed. Use [`IdGenerator::seed`] to report it
    /// so the run can be reproduced.
    pub fn from_entropy() -> Self {
        Self::seeded(rand::rng().next_u64())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A uniform value in `0..bound`.
    pub fn below(&mut self, bound: u32) -> u32 {
        self.rng.random_range(0..bound)
    }

    /// A uniform location in `0..AFL_COVERAGE_MAP_SIZE`, used for edge and call-site ids.
    pub fn location(&mut self) -> u32 {
        self.below(AFL_COVERAGE_MAP_SIZE)
    }

    /// Decides whether a site is instrumented under a percentage `ratio`.
    pub fn sample(&mut self, ratio: u32) -> bool {
        self.below(100) < ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = IdGenerator::seeded(42);
        let mut b = IdGenerator::seeded(42);
        let left: Vec<u32> = (0..64).map(|_| a.location()).collect();
        let right: Vec<u32> = (0..64).map(|_| b.location()).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn locations_stay_in_map() {
        let mut ids = IdGenerator::seeded(7);
        assert!((0..10_000).all(|_| ids.location() < AFL_COVERAGE_MAP_SIZE));
    }

    #[test]
    fn sampling_bounds() {
        let mut ids = IdGenerator::seeded(1);
        assert!((0..1000).all(|_| ids.sample(100)));
        assert!((0..1000).all(|_| !ids.sample(0)));
    }
}
