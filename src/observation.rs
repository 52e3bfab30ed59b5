//! Observation sequences and training corpora.
//!
//! A [`SequenceCorpus`] owns every observation vector of every sequence in one flat arena.
//! Each observation is addressed by an [`ObservationId`] (its index in the arena), which is
//! what the trainers use to track cluster membership. Two observations with equal values in
//! different positions keep distinct ids.

use crate::errors::{validate_all_finite, validate_sequence, HmmError, HmmResult};
use std::ops::Range;

/// Stable index of an observation inside a [`SequenceCorpus`].
pub type ObservationId = usize;

/// A validated collection of observation sequences with a common dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceCorpus {
    observations: Vec<Vec<f64>>,
    ranges: Vec<Range<usize>>,
    dimension: usize,
}

impl SequenceCorpus {
    /// Build a corpus from owned sequences.
    ///
    /// Every sequence must be non-empty, every observation must have the same dimension
    /// as the first one, and all values must be finite.
    pub fn new(sequences: Vec<Vec<Vec<f64>>>) -> HmmResult<Self> {
        let first = sequences.first().ok_or(HmmError::EmptyCorpus)?;
        let dimension = first.first().map(Vec::len).ok_or(HmmError::EmptySequence)?;
        if dimension == 0 {
            return Err(HmmError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let total = sequences.iter().map(Vec::len).sum();
        let mut observations = Vec::with_capacity(total);
        let mut ranges = Vec::with_capacity(sequences.len());

        for sequence in sequences {
            validate_sequence(&sequence, dimension)?;
            for observation in &sequence {
                validate_all_finite(observation, "observation")?;
            }
            let start = observations.len();
            observations.extend(sequence);
            ranges.push(start..observations.len());
        }

        Ok(Self {
            observations,
            ranges,
            dimension,
        })
    }

    /// Build a corpus of scalar-symbol sequences, one component per observation.
    ///
    /// Convenient for discrete models over a single alphabet.
    pub fn from_symbols(sequences: &[Vec<usize>]) -> HmmResult<Self> {
        Self::new(
            sequences
                .iter()
                .map(|seq| seq.iter().map(|&s| vec![s as f64]).collect())
                .collect(),
        )
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the corpus holds no sequences (never true for a constructed corpus).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Dimension shared by every observation.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Total number of observations across all sequences.
    pub fn total_observations(&self) -> usize {
        self.observations.len()
    }

    /// Observations of sequence `index`, in time order.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn sequence(&self, index: usize) -> &[Vec<f64>] {
        &self.observations[self.ranges[index].clone()]
    }

    /// Iterate over all sequences in corpus order.
    pub fn sequences(&self) -> impl Iterator<Item = &[Vec<f64>]> + '_ {
        self.ranges.iter().map(move |r| &self.observations[r.clone()])
    }

    /// Id of the observation at time `position` of sequence `sequence`.
    pub fn observation_id(&self, sequence: usize, position: usize) -> ObservationId {
        self.ranges[sequence].start + position
    }

    /// Ids of every observation in sequence `index`.
    pub fn observation_ids(&self, index: usize) -> Range<ObservationId> {
        self.ranges[index].clone()
    }

    /// Observation with the given id.
    pub fn observation(&self, id: ObservationId) -> &[f64] {
        &self.observations[id]
    }

    /// Every observation of the corpus, ordered by id.
    pub fn observations(&self) -> &[Vec<f64>] {
        &self.observations
    }
}
