//! Scaled Baum-Welch (EM) training.
//!
//! The E-step runs the scaled forward-backward pass over every sequence and collects the
//! state posteriors γ and the summed pair posteriors ξ. The M-step re-estimates
//!
//! - π(i) as the mean of γ₀(i) over sequences,
//! - A(i,j) as Σξ(i,j) / Σγ(i) over all steps but the last of each sequence,
//! - each emission distribution by a γ-weighted fit over every observation.
//!
//! Per-sequence statistics are computed independently (in parallel with the `parallel`
//! feature) and reduced in corpus order, so results do not depend on thread scheduling.

use crate::{
    config::TrainingConfig,
    errors::{HmmError, HmmResult},
    forward_backward::ForwardBackwardScaledCalculator,
    hmm_core::HiddenMarkovModel,
    kmeans_training::KMeansTrainer,
    math_utils::{normalize_in_place, uniform},
    observation::SequenceCorpus,
    training::HmmTrainer,
};

/// Sufficient statistics of one sequence under the current model.
#[derive(Debug, Clone)]
struct SequenceStatistics {
    ln_probability: f64,
    gamma: Vec<Vec<f64>>,
    xi_sum: Vec<Vec<f64>>,
}

impl SequenceStatistics {
    fn compute(sequence: &[Vec<f64>], model: &HiddenMarkovModel) -> HmmResult<Self> {
        let calc = ForwardBackwardScaledCalculator::forward_backward(sequence, model)?;
        let gamma = calc.posteriors().ok_or_else(|| HmmError::NumericalError {
            reason: "backward pass missing".to_string(),
            operation: Some("baum_welch".to_string()),
        })?;

        let n = model.state_count();
        let mut xi_sum = vec![vec![0.0; n]; n];
        for t in 0..sequence.len() - 1 {
            if let Some(xi) = calc.transition_posteriors(t) {
                for (acc, row) in xi_sum.iter_mut().zip(&xi) {
                    for (a, x) in acc.iter_mut().zip(row) {
                        *a += x;
                    }
                }
            }
        }

        Ok(Self {
            ln_probability: calc.ln_probability(),
            gamma,
            xi_sum,
        })
    }
}

/// Baum-Welch trainer.
///
/// Baum-Welch only refines a model: it cannot break the symmetry of identical states, so
/// start it from a model with distinct states, e.g. via [`BaumWelchTrainer::seeded_by_kmeans`].
#[derive(Debug, Clone)]
pub struct BaumWelchTrainer {
    corpus: SequenceCorpus,
    model: HiddenMarkovModel,
    config: TrainingConfig,
    ln_likelihood: Option<f64>,
    iterations: usize,
    done: bool,
}

impl BaumWelchTrainer {
    /// Refine `initial` on `corpus`.
    pub fn new(
        initial: HiddenMarkovModel,
        corpus: SequenceCorpus,
        config: TrainingConfig,
    ) -> HmmResult<Self> {
        if corpus.dimension() != initial.dimension() {
            return Err(HmmError::DimensionMismatch {
                expected: initial.dimension(),
                actual: corpus.dimension(),
            });
        }
        initial.validate_parameters(config.normalization_tolerance)?;
        Ok(Self {
            corpus,
            model: initial,
            config,
            ln_likelihood: None,
            iterations: 0,
            done: false,
        })
    }

    /// Start from the model a K-Means HMM run reaches on the same corpus.
    pub fn seeded_by_kmeans(
        template: &HiddenMarkovModel,
        corpus: SequenceCorpus,
        config: TrainingConfig,
    ) -> HmmResult<Self> {
        let mut kmeans = KMeansTrainer::new(template, corpus, config.clone())?;
        kmeans.train(config.max_iterations)?;
        let corpus = kmeans.corpus().clone();
        Self::new(kmeans.into_model(), corpus, config)
    }

    /// Corpus log-likelihood Σ ln P(sequence) under the model evaluated by the last
    /// iteration (the one before its update).
    pub fn ln_likelihood(&self) -> Option<f64> {
        self.ln_likelihood
    }

    /// Consume the trainer and return the current model.
    pub fn into_model(self) -> HiddenMarkovModel {
        self.model
    }

    fn expectation(&self) -> HmmResult<Vec<SequenceStatistics>> {
        let model = &self.model;
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (0..self.corpus.len())
                .into_par_iter()
                .map(|s| SequenceStatistics::compute(self.corpus.sequence(s), model))
                .collect::<Result<Vec<_>, _>>()
        }
        #[cfg(not(feature = "parallel"))]
        {
            (0..self.corpus.len())
                .map(|s| SequenceStatistics::compute(self.corpus.sequence(s), model))
                .collect::<Result<Vec<_>, _>>()
        }
    }

    fn maximization(&self, stats: &[SequenceStatistics]) -> HmmResult<HiddenMarkovModel> {
        let n = self.model.state_count();
        let tolerance = self.config.normalization_tolerance;
        let mut next = self.model.clone_structure();

        let mut pi = vec![0.0; n];
        let mut transitions = vec![vec![0.0; n]; n];
        for s in stats {
            for (p, g) in pi.iter_mut().zip(&s.gamma[0]) {
                *p += g;
            }
            for (acc, row) in transitions.iter_mut().zip(&s.xi_sum) {
                for (a, x) in acc.iter_mut().zip(row) {
                    *a += x;
                }
            }
        }

        normalize_in_place(&mut pi);
        next.set_initial_probabilities(pi, tolerance)?;

        for (i, mut row) in transitions.into_iter().enumerate() {
            if normalize_in_place(&mut row) <= 0.0 {
                log::warn!("State {} has no expected transitions; using a uniform row", i);
                row = uniform(n);
            }
            next.set_transition_row(i, row, tolerance)?;
        }

        let observations: Vec<&[f64]> = self
            .corpus
            .observations()
            .iter()
            .map(Vec::as_slice)
            .collect();
        for state in 0..n {
            let weights: Vec<f64> = stats
                .iter()
                .flat_map(|s| s.gamma.iter().map(move |g| g[state]))
                .collect();
            let mut distribution = next.create_distribution();
            if weights.iter().sum::<f64>() > 0.0 {
                distribution.fit_weighted(&observations, &weights)?;
            } else {
                log::warn!(
                    "State {} has zero posterior weight; using a default distribution",
                    state
                );
            }
            next.set_state_distribution(state, distribution)?;
        }

        next.validate_parameters(tolerance)?;
        Ok(next)
    }
}

impl HmmTrainer for BaumWelchTrainer {
    fn iteration(&mut self) -> HmmResult<()> {
        let stats = self.expectation()?;
        let ln_likelihood: f64 = stats.iter().map(|s| s.ln_probability).sum();
        let next = self.maximization(&stats)?;

        let improvement = self.ln_likelihood.map(|previous| ln_likelihood - previous);
        self.model = next;
        self.iterations += 1;
        self.ln_likelihood = Some(ln_likelihood);
        self.done = improvement.map_or(false, |d| d.abs() < self.config.convergence_tolerance);

        log::debug!(
            "Baum-Welch iteration {}: ln L = {:.6}, improvement = {:?}",
            self.iterations,
            ln_likelihood,
            improvement
        );
        Ok(())
    }

    fn is_training_done(&self) -> bool {
        self.done
    }

    fn model(&self) -> &HiddenMarkovModel {
        &self.model
    }

    fn iteration_count(&self) -> usize {
        self.iterations
    }
}
