//! Seeded Gaussian noise

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;

/// Noise source, reproducible when seeded
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Seed 0 draws from entropy, anything else is reproducible
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Zero-mean sample with standard deviation `stddev`
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Independent samples for three axes
    pub fn gaussian3(&mut self, stddev: f32) -> [f32; 3] {
        [
            self.gaussian(stddev),
            self.gaussian(stddev),
            self.gaussian(stddev),
        ]
    }
}
