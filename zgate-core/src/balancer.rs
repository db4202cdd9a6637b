//! Backend selection
//!
//! Uniform random choice among a host's backends. Each balancer owns its
//! generator so tests can seed it and replay an exact sequence.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seedable uniform backend picker
#[derive(Debug)]
pub struct Balancer {
    rng: Mutex<StdRng>,
}

impl Balancer {
    /// Balancer seeded from the operating system
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic balancer
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Pick an index in `0..n`, or `None` when `n` is zero
    pub fn pick_index(&self, n: usize) -> Option<usize> {
        if n == 0 {
            return None;
        }
        Some(self.rng.lock().gen_range(0..n))
    }

    /// Pick one element of `items`
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        self.pick_index(items.len()).map(|i| &items[i])
    }
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new()
    }
}
