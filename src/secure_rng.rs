//! Explicitly passed random number generation.
//!
//! Sampling in this crate never touches a global generator: every function that draws
//! random numbers takes `&mut R where R: Rng`, and [`SecureRng`] is the ChaCha20-backed
//! handle used by default. Seeded handles make training and sampling reproducible.

use rand::{Error, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Seedable ChaCha20 RNG handle.
///
/// Implements [`RngCore`], so it can be passed anywhere a `rand::Rng` is expected.
#[derive(Clone, Debug)]
pub struct SecureRng {
    rng: ChaCha20Rng,
    seed: Option<u64>,
}

impl SecureRng {
    /// Create a new RNG seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
            seed: None,
        }
    }

    /// Create a new RNG with a specific seed for reproducibility.
    ///
    /// Uses `seed_from_u64`, which expands the u64 into a full 256-bit ChaCha seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Seed this handle was created with, if any.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl Default for SecureRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for SecureRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.rng.try_fill_bytes(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand_distr::StandardNormal;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = SecureRng::with_seed(42);
        let mut b = SecureRng::with_seed(42);
        for _ in 0..16 {
            assert_eq!(a.gen::<f64>(), b.gen::<f64>());
        }
        assert_eq!(a.seed(), Some(42));
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SecureRng::with_seed(1);
        let mut b = SecureRng::with_seed(2);
        let xs: Vec<f64> = (0..8).map(|_| a.gen::<f64>()).collect();
        let ys: Vec<f64> = (0..8).map(|_| b.gen::<f64>()).collect();
        assert_ne!(xs, ys);
    }

    #[test]
    fn test_standard_normal_moments() {
        let mut rng = SecureRng::with_seed(3);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean {}", mean);
        assert!((var - 1.0).abs() < 0.05, "variance {}", var);
    }

    #[test]
    fn test_gen_range_through_rng_trait() {
        let mut rng = SecureRng::with_seed(5);
        for _ in 0..100 {
            let v: usize = rng.gen_range(3..7);
            assert!((3..7).contains(&v));
        }
    }
}
