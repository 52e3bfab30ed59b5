//! Synthetic observation sequences drawn from a model.
//!
//! Sampling walks the chain: an initial state from π, then one emission per step from the
//! current state's distribution followed by a transition draw from that state's row of A.
//! Every function takes the RNG explicitly; [`generate_with_config`] builds a seeded
//! [`SecureRng`] when a seed is given.

use crate::{
    errors::{HmmError, HmmResult},
    hmm_core::HiddenMarkovModel,
    math_utils::{constants::NORMALIZATION_TOLERANCE, sample_categorical},
    observation::SequenceCorpus,
    secure_rng::SecureRng,
};
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration parameters for sequence generation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeneratorConfig {
    /// Length of the generated sequence
    pub length: usize,
    /// Random seed for reproducible generation
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            length: 1000,
            seed: None,
        }
    }
}

/// One sampled sequence with the hidden path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSequence {
    /// Emitted observations
    pub observations: Vec<Vec<f64>>,
    /// Hidden state at each step
    pub states: Vec<usize>,
}

/// Samples observation sequences from a [`HiddenMarkovModel`].
#[derive(Debug, Clone, Copy)]
pub struct SequenceGenerator<'a> {
    model: &'a HiddenMarkovModel,
}

impl<'a> SequenceGenerator<'a> {
    /// Wrap `model`; π and every transition row must be probability vectors.
    pub fn new(model: &'a HiddenMarkovModel) -> HmmResult<Self> {
        model.validate_parameters(NORMALIZATION_TOLERANCE)?;
        Ok(Self { model })
    }

    /// Sample one sequence of `length` observations.
    pub fn observation_sequence<R: Rng + ?Sized>(
        &self,
        length: usize,
        rng: &mut R,
    ) -> HmmResult<GeneratedSequence> {
        if length == 0 {
            return Err(HmmError::InvalidParameter {
                parameter: "length".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }

        let mut observations = Vec::with_capacity(length);
        let mut states = Vec::with_capacity(length);
        let mut state = sample_categorical(self.model.initial_probabilities(), rng);
        for _ in 0..length {
            observations.push(self.model.state_distribution(state).generate(rng));
            states.push(state);
            state = sample_categorical(&self.model.transition_matrix()[state], rng);
        }

        Ok(GeneratedSequence {
            observations,
            states,
        })
    }

    /// Sample `count` independent sequences of `length` observations each.
    pub fn observation_sequences<R: Rng + ?Sized>(
        &self,
        count: usize,
        length: usize,
        rng: &mut R,
    ) -> HmmResult<Vec<Vec<Vec<f64>>>> {
        (0..count)
            .map(|_| self.observation_sequence(length, rng).map(|g| g.observations))
            .collect()
    }

    /// Sample a training corpus of `count` sequences.
    pub fn corpus<R: Rng + ?Sized>(
        &self,
        count: usize,
        length: usize,
        rng: &mut R,
    ) -> HmmResult<SequenceCorpus> {
        SequenceCorpus::new(self.observation_sequences(count, length, rng)?)
    }
}

/// Sample one sequence as described by `config`.
pub fn generate_with_config(
    model: &HiddenMarkovModel,
    config: &GeneratorConfig,
) -> HmmResult<GeneratedSequence> {
    let mut rng = match config.seed {
        Some(seed) => SecureRng::with_seed(seed),
        None => SecureRng::new(),
    };
    SequenceGenerator::new(model)?.observation_sequence(config.length, &mut rng)
}
