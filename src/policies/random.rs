//! # Randomness for jitter.
//!
//! Jitter needs a uniform sample in `[0.0, 1.0)`. Taking it through [`RandomSource`]
//! keeps [`BackoffPolicy`](crate::BackoffPolicy) a pure calculation: production code uses
//! [`ThreadRandom`], tests inject [`SeededRandom`] (or their own source) and get the same
//! delays on every run.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Source of uniform samples used to jitter delays.
pub trait RandomSource: Send + Sync {
    /// Returns a value uniformly distributed in `[0.0, 1.0)`.
    fn next_unit(&self) -> f64;
}

/// Thread-local generator from `rand`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Deterministic generator seeded once; every instance built from the same seed
/// yields the same sequence.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Creates a generator from a fixed seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&self) -> f64 {
        self.rng.lock().random::<f64>()
    }
}

impl<F> RandomSource for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn next_unit(&self) -> f64 {
        (self)().clamp(0.0, 1.0)
    }
}
