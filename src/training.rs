//! Shared driver for iterative HMM trainers.
//!
//! A trainer exposes one [`HmmTrainer::iteration`] step and a done flag; the provided
//! [`HmmTrainer::train`] loop calls it until the trainer reports convergence or the
//! iteration cap is hit. Hitting the cap is a status, not an error.

use crate::{errors::HmmResult, hmm_core::HiddenMarkovModel};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrainingStatus {
    /// The trainer reached its fixed point or tolerance
    Converged,
    /// The iteration cap was hit first; the model is the last committed one
    IterationLimitReached,
}

/// Summary of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrainingOutcome {
    /// Iterations run during this call
    pub iterations: usize,
    /// Why training stopped
    pub status: TrainingStatus,
}

impl TrainingOutcome {
    /// Whether training converged.
    pub fn converged(&self) -> bool {
        self.status == TrainingStatus::Converged
    }
}

/// An iterative trainer that refines a [`HiddenMarkovModel`] in place.
pub trait HmmTrainer {
    /// Run one training iteration and commit the re-estimated model.
    ///
    /// A failed iteration leaves the previously committed model untouched.
    fn iteration(&mut self) -> HmmResult<()>;

    /// Whether the last iteration reached the trainer's stopping criterion.
    fn is_training_done(&self) -> bool;

    /// Current model.
    fn model(&self) -> &HiddenMarkovModel;

    /// Total iterations run so far.
    fn iteration_count(&self) -> usize;

    /// Iterate until done or until `max_iterations` more iterations have run.
    fn train(&mut self, max_iterations: usize) -> HmmResult<TrainingOutcome> {
        let mut iterations = 0;
        while !self.is_training_done() {
            if iterations >= max_iterations {
                log::warn!(
                    "Training stopped after {} iterations without converging",
                    iterations
                );
                return Ok(TrainingOutcome {
                    iterations,
                    status: TrainingStatus::IterationLimitReached,
                });
            }
            self.iteration()?;
            iterations += 1;
        }
        log::info!("Training converged after {} iterations", iterations);
        Ok(TrainingOutcome {
            iterations,
            status: TrainingStatus::Converged,
        })
    }
}
