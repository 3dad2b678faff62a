use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// White noise: independent samples uniformly distributed in [-1, 1].
pub struct NoiseGenerator {
    rng: StdRng,
}

impl Default for NoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl NoiseGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn white(&mut self, len: usize) -> Vec<f32> {
        (0..len).map(|_| self.rng.gen_range(-1.0f32..=1.0)).collect()
    }
}
