//! Error types and validation functions for HMM training and inference.
//!
//! Every public entry point validates its input with the helpers in this module and
//! reports the violated contract through a typed [`HmmError`] variant instead of letting
//! NaNs or division by zero leak into the results.

use thiserror::Error;

/// Error types for Hidden Markov Model operations.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum HmmError {
    /// An observation sequence with no observations was supplied.
    #[error("Observation sequence is empty")]
    EmptySequence,

    /// A training corpus without any sequences was supplied.
    #[error("Sequence corpus contains no sequences")]
    EmptyCorpus,

    /// Observation sequence and explicit state path have different lengths.
    #[error("Sequence length {sequence} does not match state path length {path}")]
    SequenceLengthMismatch {
        /// Number of observations
        sequence: usize,
        /// Number of states in the path
        path: usize,
    },

    /// Observation vector has the wrong number of components.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension required by the model
        expected: usize,
        /// Dimension of the offending observation
        actual: usize,
    },

    /// Observation cannot be interpreted by the emission model.
    #[error("Invalid observation at position {position}: {reason}")]
    InvalidObservation {
        /// Index of the observation inside its sequence or dataset
        position: usize,
        /// What was wrong with it
        reason: String,
    },

    /// State index outside `0..state_count`.
    #[error("Invalid state {state}: model has {state_count} states")]
    InvalidState {
        /// Offending state index
        state: usize,
        /// Number of states of the model
        state_count: usize,
    },

    /// Invalid parameter value for model or trainer configuration.
    #[error("Invalid parameter: {parameter} = {value}, expected {constraint}")]
    InvalidParameter {
        /// Parameter name
        parameter: String,
        /// Invalid value provided
        value: f64,
        /// Valid range or constraint description
        constraint: String,
    },

    /// Covariance matrix is not symmetric positive definite.
    #[error("Singular covariance matrix: {reason}")]
    SingularCovariance {
        /// Detailed reason for the decomposition failure
        reason: String,
    },

    /// A probability vector (initial distribution or transition row) does not sum to one.
    #[error("{what} is not normalized (index {index:?}, sum = {sum})")]
    NotNormalized {
        /// Which parameter block failed the check
        what: String,
        /// Row index, if the block is a matrix row
        index: Option<usize>,
        /// Observed sum
        sum: f64,
    },

    /// The sequence has zero probability under the model.
    #[error("Sequence has zero likelihood under the model at position {position}")]
    ZeroLikelihood {
        /// First time step at which every state became impossible
        position: usize,
    },

    /// A distribution of the wrong kind was handed to a model.
    #[error("Emission kind mismatch: expected {expected}, got {actual}")]
    EmissionKindMismatch {
        /// Kind required by the model
        expected: String,
        /// Kind that was supplied
        actual: String,
    },

    /// Insufficient data for the requested operation.
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData {
        /// Minimum required data points
        required: usize,
        /// Actual number of data points provided
        actual: usize,
    },

    /// Numerical computation error due to instability.
    #[error("Numerical computation failed: {reason}")]
    NumericalError {
        /// Detailed reason for numerical failure
        reason: String,
        /// Operation that failed
        operation: Option<String>,
    },
}

/// Result type for HMM operations.
///
/// This is a convenience type alias for operations that may fail with [`HmmError`].
pub type HmmResult<T> = Result<T, HmmError>;

/// Validates that an observation sequence is non-empty and every observation has the
/// expected dimension.
///
/// # Arguments
/// * `sequence` - Observation vectors in time order
/// * `dimension` - Number of components every observation must have
///
/// # Example
/// ```rust
/// use hmm_engine::errors::validate_sequence;
///
/// let seq = vec![vec![0.0], vec![1.0]];
/// assert!(validate_sequence(&seq, 1).is_ok());
/// assert!(validate_sequence(&seq, 2).is_err());
/// assert!(validate_sequence::<Vec<f64>>(&[], 1).is_err());
/// ```
pub fn validate_sequence<O: AsRef<[f64]>>(sequence: &[O], dimension: usize) -> HmmResult<()> {
    if sequence.is_empty() {
        return Err(HmmError::EmptySequence);
    }
    for observation in sequence {
        validate_dimension(observation.as_ref(), dimension)?;
    }
    Ok(())
}

/// Validates that a single observation has the expected number of components.
pub fn validate_dimension(observation: &[f64], dimension: usize) -> HmmResult<()> {
    if observation.len() != dimension {
        return Err(HmmError::DimensionMismatch {
            expected: dimension,
            actual: observation.len(),
        });
    }
    Ok(())
}

/// Validates that all values in a slice are finite.
///
/// Returns immediately on the first non-finite value.
///
/// # Example
/// ```rust
/// use hmm_engine::errors::validate_all_finite;
///
/// assert!(validate_all_finite(&[1.0, 2.0], "test").is_ok());
/// assert!(validate_all_finite(&[1.0, f64::NAN], "test").is_err());
/// ```
pub fn validate_all_finite(data: &[f64], name: &str) -> HmmResult<()> {
    if let Some((i, &value)) = data.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(HmmError::NumericalError {
            reason: format!("{} contains non-finite value at index {}: {}", name, i, value),
            operation: None,
        });
    }
    Ok(())
}

/// Validates that `values` is a probability vector: non-negative entries summing to one
/// within `tolerance`.
///
/// # Arguments
/// * `values` - Candidate probability vector
/// * `tolerance` - Allowed absolute deviation of the sum from 1
/// * `what` - Name used in the error report
/// * `index` - Row index when the vector is a matrix row
pub fn validate_probability_vector(
    values: &[f64],
    tolerance: f64,
    what: &str,
    index: Option<usize>,
) -> HmmResult<()> {
    let sum: f64 = values.iter().sum();
    let has_negative = values.iter().any(|&v| v < 0.0 || !v.is_finite());
    if has_negative || !sum.is_finite() || (sum - 1.0).abs() > tolerance {
        return Err(HmmError::NotNormalized {
            what: what.to_string(),
            index,
            sum,
        });
    }
    Ok(())
}
