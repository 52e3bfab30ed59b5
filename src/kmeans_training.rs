//! Viterbi-guided K-Means training.
//!
//! Every observation of the corpus carries a hard state label, seeded by K-Means over all
//! observations. Each iteration re-estimates a fresh model by counting labels (π and A)
//! and fitting each state's distribution to its members, then decodes every sequence with
//! the new model and relabels observations to their decoded state. Training is done once
//! an iteration relabels nothing.

use crate::{
    clusters::ClusterAssignment,
    config::TrainingConfig,
    errors::{HmmError, HmmResult},
    hmm_core::HiddenMarkovModel,
    math_utils::{normalize_in_place, uniform},
    observation::SequenceCorpus,
    training::HmmTrainer,
};

/// K-Means HMM trainer.
///
/// # Example
/// ```rust
/// use hmm_engine::{HiddenMarkovModel, HmmTrainer, KMeansTrainer, SequenceCorpus, TrainingConfig};
///
/// let corpus = SequenceCorpus::from_symbols(&[vec![0, 0, 1, 1], vec![1, 1, 0, 0]]).unwrap();
/// let template = HiddenMarkovModel::new_discrete(2, &[2]).unwrap();
/// let mut trainer = KMeansTrainer::new(&template, corpus, TrainingConfig::default()).unwrap();
/// let outcome = trainer.train(50).unwrap();
/// assert!(outcome.converged());
/// ```
#[derive(Debug, Clone)]
pub struct KMeansTrainer {
    corpus: SequenceCorpus,
    model: HiddenMarkovModel,
    clusters: ClusterAssignment,
    config: TrainingConfig,
    iterations: usize,
    done: bool,
}

impl KMeansTrainer {
    /// Cluster `corpus` into one group per state of `template` and start from a model
    /// with the template's shape.
    pub fn new(
        template: &HiddenMarkovModel,
        corpus: SequenceCorpus,
        config: TrainingConfig,
    ) -> HmmResult<Self> {
        if corpus.dimension() != template.dimension() {
            return Err(HmmError::DimensionMismatch {
                expected: template.dimension(),
                actual: corpus.dimension(),
            });
        }
        let clusters =
            ClusterAssignment::from_kmeans(&corpus, &config.kmeans_config(template.state_count()))?;
        Ok(Self {
            corpus,
            model: template.clone_structure(),
            clusters,
            config,
            iterations: 0,
            done: false,
        })
    }

    /// Current observation-to-state labels.
    pub fn clusters(&self) -> &ClusterAssignment {
        &self.clusters
    }

    /// Training corpus.
    pub fn corpus(&self) -> &SequenceCorpus {
        &self.corpus
    }

    /// Consume the trainer and return the current model.
    pub fn into_model(self) -> HiddenMarkovModel {
        self.model
    }

    fn learn_pi(&self, next: &mut HiddenMarkovModel) -> HmmResult<()> {
        let mut pi = vec![0.0; next.state_count()];
        for s in 0..self.corpus.len() {
            let first = self.corpus.observation_id(s, 0);
            pi[self.clusters.cluster_of(first)] += 1.0;
        }
        let count = self.corpus.len() as f64;
        pi.iter_mut().for_each(|p| *p /= count);
        next.set_initial_probabilities(pi, self.config.normalization_tolerance)
    }

    fn learn_transition(&self, next: &mut HiddenMarkovModel) -> HmmResult<()> {
        let n = next.state_count();
        let mut counts = vec![vec![0.0; n]; n];
        for s in 0..self.corpus.len() {
            let ids = self.corpus.observation_ids(s);
            for id in ids.start + 1..ids.end {
                let from = self.clusters.cluster_of(id - 1);
                let to = self.clusters.cluster_of(id);
                counts[from][to] += 1.0;
            }
        }

        for (i, mut row) in counts.into_iter().enumerate() {
            if normalize_in_place(&mut row) <= 0.0 {
                log::warn!("State {} never precedes another state; using a uniform row", i);
                row = uniform(n);
            }
            next.set_transition_row(i, row, self.config.normalization_tolerance)?;
        }
        Ok(())
    }

    fn learn_opdf(&self, next: &mut HiddenMarkovModel) -> HmmResult<()> {
        for state in 0..next.state_count() {
            let mut distribution = next.create_distribution();
            if self.clusters.is_empty(state) {
                log::warn!("State {} has no observations; using a default distribution", state);
            } else {
                let members: Vec<&[f64]> = self
                    .clusters
                    .members(state)
                    .iter()
                    .map(|&id| self.corpus.observation(id))
                    .collect();
                distribution.fit(&members)?;
            }
            next.set_state_distribution(state, distribution)?;
        }
        Ok(())
    }

    /// Decode every sequence with `next`; all decoding happens before any relabelling.
    fn decode_all(&self, next: &HiddenMarkovModel) -> HmmResult<Vec<Vec<usize>>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            (0..self.corpus.len())
                .into_par_iter()
                .map(|s| next.states_for_sequence(self.corpus.sequence(s)))
                .collect::<Result<Vec<_>, _>>()
        }
        #[cfg(not(feature = "parallel"))]
        {
            (0..self.corpus.len())
                .map(|s| next.states_for_sequence(self.corpus.sequence(s)))
                .collect::<Result<Vec<_>, _>>()
        }
    }

    /// Relabel every observation to its decoded state, in corpus order; returns the
    /// number of observations that moved.
    fn optimize_cluster(&mut self, paths: &[Vec<usize>]) -> usize {
        let mut moves = 0;
        for (s, path) in paths.iter().enumerate() {
            for (position, &state) in path.iter().enumerate() {
                let id = self.corpus.observation_id(s, position);
                if self.clusters.migrate(id, state) {
                    moves += 1;
                }
            }
        }
        moves
    }
}

impl HmmTrainer for KMeansTrainer {
    fn iteration(&mut self) -> HmmResult<()> {
        let mut next = self.model.clone_structure();
        self.learn_pi(&mut next)?;
        self.learn_transition(&mut next)?;
        self.learn_opdf(&mut next)?;
        next.validate_parameters(self.config.normalization_tolerance)?;
        let paths = self.decode_all(&next)?;

        let moves = self.optimize_cluster(&paths);
        self.model = next;
        self.iterations += 1;
        self.done = moves == 0;
        log::debug!(
            "K-Means HMM iteration {}: {} observations relabelled",
            self.iterations,
            moves
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
