//! # Model Comparison
//!
//! Monte-Carlo estimate of the Kullback-Leibler distance between two models that share an
//! observation space. Sequences are sampled from the first model and scored under both with
//! the scaled forward pass, so long sequences do not underflow.
//!
//! The estimate is not symmetric: `distance(a, b)` and `distance(b, a)` generally differ.

use crate::{
    errors::{HmmError, HmmResult},
    generators::SequenceGenerator,
    hmm_core::HiddenMarkovModel,
};
use rand::Rng;

/// Estimates the per-observation KL distance D(model₁ ‖ model₂).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KullbackLeiblerCalculator {
    sequence_count: usize,
    sequence_length: usize,
}

impl Default for KullbackLeiblerCalculator {
    fn default() -> Self {
        Self {
            sequence_count: 10,
            sequence_length: 1000,
        }
    }
}

impl KullbackLeiblerCalculator {
    /// Calculator with the default sampling effort (10 sequences of 1000 observations).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of sampled sequences.
    pub fn with_sequence_count(mut self, count: usize) -> Self {
        self.sequence_count = count;
        self
    }

    /// Set the length of each sampled sequence.
    pub fn with_sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length;
        self
    }

    /// Number of sampled sequences.
    pub fn sequence_count(&self) -> usize {
        self.sequence_count
    }

    /// Length of each sampled sequence.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Average of `(ln P₁(seq) - ln P₂(seq)) / length` over sequences sampled from `first`.
    ///
    /// Infinite if some sampled sequence is impossible under `second`.
    pub fn distance<R: Rng + ?Sized>(
        &self,
        first: &HiddenMarkovModel,
        second: &HiddenMarkovModel,
        rng: &mut R,
    ) -> HmmResult<f64> {
        if self.sequence_count == 0 {
            return Err(HmmError::InvalidParameter {
                parameter: "sequence_count".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        if first.is_discrete() != second.is_discrete() {
            return Err(HmmError::EmissionKindMismatch {
                expected: first.create_distribution().kind_name().to_string(),
                actual: second.create_distribution().kind_name().to_string(),
            });
        }
        if first.dimension() != second.dimension() {
            return Err(HmmError::DimensionMismatch {
                expected: first.dimension(),
                actual: second.dimension(),
            });
        }

        let generator = SequenceGenerator::new(first)?;
        let mut total = 0.0;
        for _ in 0..self.sequence_count {
            let sequence = generator
                .observation_sequence(self.sequence_length, rng)?
                .observations;
            total += first.ln_probability(&sequence)? - second.ln_probability(&sequence)?;
        }
        Ok(total / (self.sequence_count * self.sequence_length) as f64)
    }
}
