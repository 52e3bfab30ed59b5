//! # Hidden Markov Model Engine
//!
//! Training and inference for Hidden Markov Models with discrete (categorical) or
//! continuous (multivariate Gaussian) emissions.
//!
//! ## Key Features
//!
//! - **Inference**: forward-backward likelihood (plain and scaled), state posteriors and
//!   Viterbi decoding
//! - **Training**: Viterbi-guided K-Means training and scaled Baum-Welch, both behind the
//!   [`HmmTrainer`] driver with an iteration cap
//! - **Clustering**: deterministic K-Means over observation vectors
//! - **Sampling**: sequence generation and Kullback-Leibler distance between models, with
//!   an explicitly passed, seedable RNG
//!
//! ## Quick Start
//!
//! ```rust
//! use hmm_engine::{
//!     HiddenMarkovModel, HmmTrainer, KMeansTrainer, SequenceCorpus, TrainingConfig,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let corpus = SequenceCorpus::from_symbols(&[
//!         vec![0, 0, 0, 1, 1, 1],
//!         vec![1, 1, 0, 0, 0],
//!     ])?;
//!
//!     let template = HiddenMarkovModel::new_discrete(2, &[2])?;
//!     let mut trainer = KMeansTrainer::new(&template, corpus, TrainingConfig::default())?;
//!     let outcome = trainer.train(50)?;
//!     println!("converged: {} after {} iterations", outcome.converged(), outcome.iterations);
//!
//!     let model = trainer.model();
//!     let sequence = vec![vec![0.0], vec![0.0], vec![1.0]];
//!     println!("ln P = {:.4}", model.ln_probability(&sequence)?);
//!     println!("path = {:?}", model.states_for_sequence(&sequence)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Observations
//!
//! An observation is a `&[f64]` of fixed dimension. Discrete models read each component as
//! a symbol index (`0.0`, `1.0`, ...), one alphabet per component. Sequences are passed as
//! any slice of `AsRef<[f64]>` values; training corpora are [`SequenceCorpus`] values.
//!
//! ## Feature Flags
//!
//! - `parallel` (default): per-sequence work of the trainers runs on `rayon`
//! - `serde`: `Serialize`/`Deserialize` for configuration and outcome types

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod linear_algebra;
pub mod math_utils;
pub mod observation;
pub mod secure_rng;

// Model and inference
pub mod emission_models;
pub mod forward_backward;
pub mod hmm_core;
pub mod viterbi;

// Clustering and training
pub mod baum_welch;
pub mod clusters;
pub mod kmeans;
pub mod kmeans_training;
pub mod training;

// Sampling and comparison
pub mod diagnostics;
pub mod generators;

// Re-exports for convenience - main public API
pub use config::TrainingConfig;
pub use errors::{HmmError, HmmResult};
pub use observation::{ObservationId, SequenceCorpus};
pub use secure_rng::SecureRng;

// Model exports
pub use emission_models::{DiscreteDistribution, GaussianDistribution, StateDistribution};
pub use hmm_core::{EmissionKind, HiddenMarkovModel};

// Inference exports
pub use forward_backward::{ForwardBackwardCalculator, ForwardBackwardScaledCalculator};
pub use viterbi::ViterbiCalculator;

// Clustering and training exports
pub use baum_welch::BaumWelchTrainer;
pub use clusters::ClusterAssignment;
pub use kmeans::{kmeans, DistanceMetric, KMeansConfig, KMeansResult};
pub use kmeans_training::KMeansTrainer;
pub use training::{HmmTrainer, TrainingOutcome, TrainingStatus};

// Sampling exports
pub use diagnostics::KullbackLeiblerCalculator;
pub use generators::{generate_with_config, GeneratedSequence, GeneratorConfig, SequenceGenerator};
