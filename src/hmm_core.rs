//! Core Hidden Markov Model structure.
//!
//! A [`HiddenMarkovModel`] holds the initial-state distribution π, the transition matrix A
//! and one emission [`StateDistribution`] per state. The low-level setters never
//! renormalize; [`HiddenMarkovModel::validate_parameters`] is the check a trainer runs
//! before committing a freshly estimated model.

use crate::{
    emission_models::{DiscreteDistribution, GaussianDistribution, StateDistribution},
    errors::{validate_probability_vector, validate_sequence, HmmError, HmmResult},
    forward_backward::{ForwardBackwardCalculator, ForwardBackwardScaledCalculator},
    math_utils::{float_ops, uniform},
    viterbi::ViterbiCalculator,
};

/// Shape of the emission model shared by every state.
#[derive(Debug, Clone, PartialEq)]
pub enum EmissionKind {
    /// Categorical emissions, one alphabet size per observation component
    Discrete {
        /// Alphabet size per dimension
        cardinalities: Vec<usize>,
    },
    /// Gaussian emissions over a fixed dimensionality
    Continuous {
        /// Observation dimension
        dimension: usize,
        /// Diagonal ridge added to fitted covariances
        regularization: f64,
    },
}

/// Hidden Markov Model with discrete or Gaussian emissions.
#[derive(Debug, Clone, PartialEq)]
pub struct HiddenMarkovModel {
    pi: Vec<f64>,
    transition: Vec<Vec<f64>>,
    distributions: Vec<StateDistribution>,
    /// Default distribution every fresh state starts from
    template: StateDistribution,
}

impl HiddenMarkovModel {
    /// Model with categorical emissions over the given alphabet sizes.
    ///
    /// π and every transition row start uniform; every state starts with a uniform
    /// symbol distribution.
    pub fn new_discrete(state_count: usize, cardinalities: &[usize]) -> HmmResult<Self> {
        let template = DiscreteDistribution::new(cardinalities)?;
        Self::with_template(state_count, template.into())
    }

    /// Model with Gaussian emissions of the given dimension.
    ///
    /// Every state starts as a zero-mean, identity-covariance Gaussian.
    pub fn new_continuous(state_count: usize, dimension: usize) -> HmmResult<Self> {
        if dimension == 0 {
            return Err(HmmError::InvalidParameter {
                parameter: "dimension".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        Self::with_template(state_count, GaussianDistribution::standard(dimension).into())
    }

    fn with_template(state_count: usize, template: StateDistribution) -> HmmResult<Self> {
        if state_count == 0 {
            return Err(HmmError::InvalidParameter {
                parameter: "state_count".to_string(),
                value: 0.0,
                constraint: ">= 1".to_string(),
            });
        }
        Ok(Self {
            pi: uniform(state_count),
            transition: vec![uniform(state_count); state_count],
            distributions: vec![template.clone(); state_count],
            template,
        })
    }

    /// Add `epsilon` to the diagonal of every covariance fitted for this model.
    ///
    /// Has no effect on discrete models. Current parameters are kept; the ridge applies
    /// from the next fit on.
    pub fn with_covariance_regularization(mut self, epsilon: f64) -> Self {
        for d in self
            .distributions
            .iter_mut()
            .chain(std::iter::once(&mut self.template))
        {
            if let StateDistribution::Continuous(g) = d {
                *g = g.clone().with_regularization(epsilon);
            }
        }
        self
    }

    /// Number of hidden states.
    pub fn state_count(&self) -> usize {
        self.pi.len()
    }

    /// Number of observation components.
    pub fn dimension(&self) -> usize {
        self.template.dimension()
    }

    /// Whether emissions are categorical.
    pub fn is_discrete(&self) -> bool {
        self.template.is_discrete()
    }

    /// Emission shape of this model.
    pub fn emission_kind(&self) -> EmissionKind {
        match &self.template {
            StateDistribution::Discrete(d) => EmissionKind::Discrete {
                cardinalities: d.cardinalities(),
            },
            StateDistribution::Continuous(g) => EmissionKind::Continuous {
                dimension: g.dimension(),
                regularization: g.regularization(),
            },
        }
    }

    /// A fresh default distribution matching this model's emission kind: uniform symbol
    /// frequencies, or a zero-mean identity-covariance Gaussian.
    pub fn create_distribution(&self) -> StateDistribution {
        self.template.clone()
    }

    /// Same shape, fresh uniform parameters.
    pub fn clone_structure(&self) -> Self {
        let state_count = self.state_count();
        Self {
            pi: uniform(state_count),
            transition: vec![uniform(state_count); state_count],
            distributions: vec![self.template.clone(); state_count],
            template: self.template.clone(),
        }
    }

    /// Initial probability of state `i`.
    ///
    /// # Panics
    /// Panics if `i >= self.state_count()`.
    pub fn pi(&self, i: usize) -> f64 {
        self.pi[i]
    }

    /// Set the initial probability of state `i` without renormalizing.
    ///
    /// # Panics
    /// Panics if `i >= self.state_count()`.
    pub fn set_pi(&mut self, i: usize, value: f64) {
        self.pi[i] = value;
    }

    /// P(state `j` at t+1 | state `i` at t).
    ///
    /// # Panics
    /// Panics if either index is out of range.
    pub fn transition_probability(&self, i: usize, j: usize) -> f64 {
        self.transition[i][j]
    }

    /// Set one transition probability without renormalizing.
    ///
    /// # Panics
    /// Panics if either index is out of range.
    pub fn set_transition_probability(&mut self, i: usize, j: usize, value: f64) {
        self.transition[i][j] = value;
    }

    /// Initial-state distribution π.
    pub fn initial_probabilities(&self) -> &[f64] {
        &self.pi
    }

    /// Transition matrix A, row-major.
    pub fn transition_matrix(&self) -> &[Vec<f64>] {
        &self.transition
    }

    /// Replace π as a whole; the vector must be a probability vector.
    pub fn set_initial_probabilities(&mut self, pi: Vec<f64>, tolerance: f64) -> HmmResult<()> {
        if pi.len() != self.state_count() {
            return Err(HmmError::DimensionMismatch {
                expected: self.state_count(),
                actual: pi.len(),
            });
        }
        validate_probability_vector(&pi, tolerance, "initial probabilities", None)?;
        self.pi = pi;
        Ok(())
    }

    /// Replace row `i` of A; the row must be a probability vector.
    pub fn set_transition_row(
        &mut self,
        i: usize,
        row: Vec<f64>,
        tolerance: f64,
    ) -> HmmResult<()> {
        self.check_state(i)?;
        if row.len() != self.state_count() {
            return Err(HmmError::DimensionMismatch {
                expected: self.state_count(),
                actual: row.len(),
            });
        }
        validate_probability_vector(&row, tolerance, "transition row", Some(i))?;
        self.transition[i] = row;
        Ok(())
    }

    /// Emission distribution of state `i`.
    ///
    /// # Panics
    /// Panics if `i >= self.state_count()`.
    pub fn state_distribution(&self, i: usize) -> &StateDistribution {
        &self.distributions[i]
    }

    /// Replace the emission distribution of state `i`.
    ///
    /// The distribution must match the model's emission kind and dimension.
    pub fn set_state_distribution(
        &mut self,
        i: usize,
        distribution: StateDistribution,
    ) -> HmmResult<()> {
        self.check_state(i)?;
        if distribution.is_discrete() != self.is_discrete() {
            return Err(HmmError::EmissionKindMismatch {
                expected: self.template.kind_name().to_string(),
                actual: distribution.kind_name().to_string(),
            });
        }
        if let (StateDistribution::Discrete(expected), StateDistribution::Discrete(d)) =
            (&self.template, &distribution)
        {
            if d.cardinalities() != expected.cardinalities() {
                return Err(HmmError::EmissionKindMismatch {
                    expected: format!("discrete over {:?}", expected.cardinalities()),
                    actual: format!("discrete over {:?}", d.cardinalities()),
                });
            }
        }
        if distribution.dimension() != self.dimension() {
            return Err(HmmError::DimensionMismatch {
                expected: self.dimension(),
                actual: distribution.dimension(),
            });
        }
        self.distributions[i] = distribution;
        Ok(())
    }

    /// Emission probability (or density) of `observation` in state `state`.
    pub fn emission_probability(&self, state: usize, observation: &[f64]) -> HmmResult<f64> {
        self.check_state(state)?;
        self.distributions[state].probability(observation)
    }

    /// Emission probabilities of every state for every observation: `[t][state]`.
    pub fn emission_table<O: AsRef<[f64]>>(&self, sequence: &[O]) -> HmmResult<Vec<Vec<f64>>> {
        validate_sequence(sequence, self.dimension())?;
        sequence
            .iter()
            .map(|o| {
                self.distributions
                    .iter()
                    .map(|d| d.probability(o.as_ref()))
                    .collect()
            })
            .collect()
    }

    /// Log emission probabilities of every state for every observation: `[t][state]`.
    ///
    /// Gaussian log densities are evaluated directly, so observations far in a tail keep a
    /// finite score where [`emission_table`](Self::emission_table) would underflow to zero.
    pub fn ln_emission_table<O: AsRef<[f64]>>(
        &self,
        sequence: &[O],
    ) -> HmmResult<Vec<Vec<f64>>> {
        validate_sequence(sequence, self.dimension())?;
        sequence
            .iter()
            .map(|o| {
                self.distributions
                    .iter()
                    .map(|d| d.ln_probability(o.as_ref()))
                    .collect()
            })
            .collect()
    }

    /// Total likelihood P(sequence) from the unscaled forward pass.
    pub fn probability<O: AsRef<[f64]>>(&self, sequence: &[O]) -> HmmResult<f64> {
        Ok(ForwardBackwardCalculator::forward(sequence, self)?.probability())
    }

    /// ln P(sequence) from the scaled forward pass; negative infinity when the sequence
    /// is impossible under the model.
    ///
    /// When every emission at some step underflows, the forward recursion is redone in
    /// log space.
    pub fn ln_probability<O: AsRef<[f64]>>(&self, sequence: &[O]) -> HmmResult<f64> {
        match ForwardBackwardScaledCalculator::forward(sequence, self) {
            Ok(calc) => Ok(calc.ln_probability()),
            Err(HmmError::ZeroLikelihood { .. }) => self.ln_forward(sequence),
            Err(e) => Err(e),
        }
    }

    fn ln_forward<O: AsRef<[f64]>>(&self, sequence: &[O]) -> HmmResult<f64> {
        let ln_b = self.ln_emission_table(sequence)?;
        let n = self.state_count();
        let ln_a: Vec<Vec<f64>> = self
            .transition
            .iter()
            .map(|row| row.iter().map(|&p| float_ops::ln_or_neg_infinity(p)).collect())
            .collect();

        let mut ln_alpha: Vec<f64> = (0..n)
            .map(|i| float_ops::ln_or_neg_infinity(self.pi[i]) + ln_b[0][i])
            .collect();
        let mut terms = vec![0.0; n];
        for row in ln_b.iter().skip(1) {
            let mut next = vec![f64::NEG_INFINITY; n];
            for j in 0..n {
                for i in 0..n {
                    terms[i] = ln_alpha[i] + ln_a[i][j];
                }
                next[j] = float_ops::ln_sum_exp(&terms) + row[j];
            }
            ln_alpha = next;
        }
        Ok(float_ops::ln_sum_exp(&ln_alpha))
    }

    /// Joint probability of `sequence` and one explicit state path:
    /// `π[s₀]·b(s₀,o₀)·Π A(sₜ₋₁,sₜ)·b(sₜ,oₜ)`.
    pub fn probability_of_path<O: AsRef<[f64]>>(
        &self,
        sequence: &[O],
        path: &[usize],
    ) -> HmmResult<f64> {
        validate_sequence(sequence, self.dimension())?;
        if sequence.len() != path.len() {
            return Err(HmmError::SequenceLengthMismatch {
                sequence: sequence.len(),
                path: path.len(),
            });
        }
        for &s in path {
            self.check_state(s)?;
        }

        let first = &self.distributions[path[0]];
        let mut probability = self.pi[path[0]] * first.probability(sequence[0].as_ref())?;
        for t in 1..sequence.len() {
            probability *= self.transition[path[t - 1]][path[t]]
                * self.distributions[path[t]].probability(sequence[t].as_ref())?;
        }
        Ok(probability)
    }

    /// Most probable hidden-state path (Viterbi decoding).
    pub fn states_for_sequence<O: AsRef<[f64]>>(&self, sequence: &[O]) -> HmmResult<Vec<usize>> {
        Ok(ViterbiCalculator::new(sequence, self)?.into_state_sequence())
    }

    /// Check that π and every transition row are probability vectors.
    pub fn validate_parameters(&self, tolerance: f64) -> HmmResult<()> {
        validate_probability_vector(&self.pi, tolerance, "initial probabilities", None)?;
        for (i, row) in self.transition.iter().enumerate() {
            validate_probability_vector(row, tolerance, "transition row", Some(i))?;
        }
        Ok(())
    }

    fn check_state(&self, state: usize) -> HmmResult<()> {
        if state >= self.state_count() {
            return Err(HmmError::InvalidState {
                state,
                state_count: self.state_count(),
            });
        }
        Ok(())
    }
}
