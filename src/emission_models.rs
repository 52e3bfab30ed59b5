//! Emission models for Hidden Markov Model states.
//!
//! Each hidden state owns one [`StateDistribution`], either a discrete categorical model
//! over a (possibly multivariate) symbol alphabet or a multivariate Gaussian. Both variants
//! share the same three operations: `probability`, `fit_weighted` and `generate`.

use crate::{
    errors::{
        validate_all_finite, validate_dimension, validate_probability_vector, HmmError, HmmResult,
    },
    linear_algebra::{decompose_covariance, identity, CovarianceDecomposition},
    math_utils::{constants, float_ops, sample_categorical},
};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Interpret an observation component as a symbol index in `0..cardinality`.
fn symbol_index(value: f64, cardinality: usize) -> Option<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value < cardinality as f64 {
        Some(value as usize)
    } else {
        None
    }
}

/// Validates a weight vector against its dataset and returns the total weight.
fn validate_weights(observations: usize, weights: &[f64]) -> HmmResult<f64> {
    if observations == 0 {
        return Err(HmmError::InsufficientData {
            required: 1,
            actual: 0,
        });
    }
    if weights.len() != observations {
        return Err(HmmError::DimensionMismatch {
            expected: observations,
            actual: weights.len(),
        });
    }
    if let Some(&w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(HmmError::InvalidParameter {
            parameter: "weight".to_string(),
            value: w,
            constraint: "finite and non-negative".to_string(),
        });
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(HmmError::InvalidParameter {
            parameter: "total weight".to_string(),
            value: total,
            constraint: "> 0".to_string(),
        });
    }
    Ok(total)
}

/// Categorical emission model over a symbol alphabet with one cardinality per dimension.
///
/// Dimensions are independent: the probability of an observation is the product of the
/// per-dimension symbol frequencies. A symbol outside the alphabet has probability zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteDistribution {
    /// `probabilities[d][s]` = P(symbol `s` in dimension `d`)
    probabilities: Vec<Vec<f64>>,
}

impl DiscreteDistribution {
    /// Uniform distribution over the given alphabet sizes.
    pub fn new(cardinalities: &[usize]) -> HmmResult<Self> {
        if cardinalities.is_empty() {
            return Err(HmmError::InvalidParameter {
                parameter: "cardinalities".to_string(),
                value: 0.0,
                constraint: "at least one dimension".to_string(),
            });
        }
        if let Some(&c) = cardinalities.iter().find(|&&c| c == 0) {
            return Err(HmmError::InvalidParameter {
                parameter: "cardinality".to_string(),
                value: c as f64,
                constraint: ">= 1".to_string(),
            });
        }
        Ok(Self {
            probabilities: cardinalities
                .iter()
                .map(|&c| vec![1.0 / c as f64; c])
                .collect(),
        })
    }

    /// Distribution with explicit per-dimension symbol probabilities.
    ///
    /// Each row must be a probability vector.
    pub fn from_probabilities(probabilities: Vec<Vec<f64>>) -> HmmResult<Self> {
        if probabilities.is_empty() || probabilities.iter().any(Vec::is_empty) {
            return Err(HmmError::InvalidParameter {
                parameter: "probabilities".to_string(),
                value: 0.0,
                constraint: "non-empty table for every dimension".to_string(),
            });
        }
        for (d, row) in probabilities.iter().enumerate() {
            validate_probability_vector(
                row,
                constants::NORMALIZATION_TOLERANCE,
                "symbol probabilities",
                Some(d),
            )?;
        }
        Ok(Self { probabilities })
    }

    /// Number of observation components.
    pub fn dimension(&self) -> usize {
        self.probabilities.len()
    }

    /// Alphabet size of every dimension.
    pub fn cardinalities(&self) -> Vec<usize> {
        self.probabilities.iter().map(Vec::len).collect()
    }

    /// Stored frequency of `symbol` in dimension `dimension`; zero if unseen.
    pub fn symbol_probability(&self, dimension: usize, symbol: usize) -> f64 {
        self.probabilities
            .get(dimension)
            .and_then(|row| row.get(symbol))
            .copied()
            .unwrap_or(0.0)
    }

    /// Probability of an observation (product over dimensions).
    pub fn probability(&self, observation: &[f64]) -> HmmResult<f64> {
        validate_dimension(observation, self.dimension())?;
        let mut result = 1.0;
        for (row, &value) in self.probabilities.iter().zip(observation) {
            match symbol_index(value, row.len()) {
                Some(s) => result *= row[s],
                None => return Ok(0.0),
            }
        }
        Ok(result)
    }

    /// Re-estimate the symbol frequencies from weighted observations.
    ///
    /// Parameters are only replaced when every observation is a valid symbol tuple.
    pub fn fit_weighted(&mut self, observations: &[&[f64]], weights: &[f64]) -> HmmResult<()> {
        let total = validate_weights(observations.len(), weights)?;
        let mut counts: Vec<Vec<f64>> = self
            .probabilities
            .iter()
            .map(|row| vec![0.0; row.len()])
            .collect();

        for (position, (observation, &w)) in observations.iter().zip(weights).enumerate() {
            validate_dimension(observation, self.dimension())?;
            for (row, &value) in counts.iter_mut().zip(observation.iter()) {
                let cardinality = row.len();
                let s = symbol_index(value, cardinality).ok_or_else(|| {
                    HmmError::InvalidObservation {
                        position,
                        reason: format!("{} is not a symbol in 0..{}", value, cardinality),
                    }
                })?;
                row[s] += w;
            }
        }

        for row in counts.iter_mut() {
            for v in row.iter_mut() {
                *v /= total;
            }
        }
        self.probabilities = counts;
        Ok(())
    }

    /// Draw one symbol tuple.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        self.probabilities
            .iter()
            .map(|row| sample_categorical(row, &mut *rng) as f64)
            .collect()
    }
}

/// Multivariate Gaussian emission model.
///
/// The covariance is always kept together with its Cholesky decomposition, so a value of
/// this type can always evaluate its density.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianDistribution {
    mean: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    regularization: f64,
    decomposition: CovarianceDecomposition,
}

impl GaussianDistribution {
    /// Gaussian with the given mean and covariance.
    ///
    /// Fails with [`HmmError::SingularCovariance`] when the covariance is not symmetric
    /// positive definite.
    pub fn new(mean: Vec<f64>, covariance: Vec<Vec<f64>>) -> HmmResult<Self> {
        if mean.is_empty() {
            return Err(HmmError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }
        validate_all_finite(&mean, "mean")?;
        if covariance.len() != mean.len() {
            return Err(HmmError::DimensionMismatch {
                expected: mean.len(),
                actual: covariance.len(),
            });
        }
        let decomposition = decompose_covariance(&covariance)?;
        Ok(Self {
            mean,
            covariance,
            regularization: 0.0,
            decomposition,
        })
    }

    /// Zero-mean Gaussian with identity covariance.
    pub fn standard(dimension: usize) -> Self {
        Self {
            mean: vec![0.0; dimension],
            covariance: identity(dimension),
            regularization: 0.0,
            decomposition: CovarianceDecomposition::identity(dimension),
        }
    }

    /// Add `epsilon` to the diagonal of every covariance estimated by `fit_weighted`.
    pub fn with_regularization(mut self, epsilon: f64) -> Self {
        self.regularization = epsilon.max(0.0);
        self
    }

    /// Number of observation components.
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Mean vector.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Covariance matrix, row-major.
    pub fn covariance(&self) -> &[Vec<f64>] {
        &self.covariance
    }

    /// Diagonal ridge applied when fitting.
    pub fn regularization(&self) -> f64 {
        self.regularization
    }

    /// Cached Cholesky factor, inverse and determinant.
    pub fn decomposition(&self) -> &CovarianceDecomposition {
        &self.decomposition
    }

    /// Log density `-0.5 * (d·ln 2π + ln|Σ| + (x-μ)ᵗ Σ⁻¹ (x-μ))`.
    pub fn ln_probability(&self, observation: &[f64]) -> HmmResult<f64> {
        validate_dimension(observation, self.dimension())?;
        let diff: Vec<f64> = observation
            .iter()
            .zip(&self.mean)
            .map(|(x, m)| x - m)
            .collect();
        let mahalanobis = self.decomposition.mahalanobis_squared(&diff);
        let d = self.dimension() as f64;
        Ok(-0.5 * (d * constants::LN_TWO_PI + self.decomposition.ln_determinant() + mahalanobis))
    }

    /// Density `exp(-0.5 (x-μ)ᵗ Σ⁻¹ (x-μ)) / ((2π)^(d/2) |Σ|^0.5)`.
    pub fn probability(&self, observation: &[f64]) -> HmmResult<f64> {
        Ok(self.ln_probability(observation)?.exp())
    }

    /// Re-estimate mean and covariance from weighted observations.
    ///
    /// Weights are normalized to sum to one. The previous parameters are kept when the
    /// estimated covariance cannot be decomposed.
    pub fn fit_weighted(&mut self, observations: &[&[f64]], weights: &[f64]) -> HmmResult<()> {
        let total = validate_weights(observations.len(), weights)?;
        let d = self.dimension();
        for observation in observations {
            validate_dimension(observation, d)?;
        }

        let mut mean = vec![0.0; d];
        for (observation, &w) in observations.iter().zip(weights) {
            for (m, x) in mean.iter_mut().zip(observation.iter()) {
                *m += w / total * x;
            }
        }

        let mut covariance = vec![vec![0.0; d]; d];
        for (observation, &w) in observations.iter().zip(weights) {
            let w = w / total;
            let diff: Vec<f64> = observation.iter().zip(&mean).map(|(x, m)| x - m).collect();
            for p in 0..d {
                for q in p..d {
                    let c = w * diff[p] * diff[q];
                    covariance[p][q] += c;
                    if p != q {
                        covariance[q][p] += c;
                    }
                }
            }
        }
        for (i, row) in covariance.iter_mut().enumerate() {
            row[i] += self.regularization;
        }

        let decomposition = decompose_covariance(&covariance)?;
        self.mean = mean;
        self.covariance = covariance;
        self.decomposition = decomposition;
        Ok(())
    }

    /// Draw one observation as `μ + L·z` with `z` standard normal.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z: Vec<f64> = (0..self.dimension())
            .map(|_| -> f64 { StandardNormal.sample(&mut *rng) })
            .collect();
        self.decomposition
            .correlate(&z)
            .into_iter()
            .zip(&self.mean)
            .map(|(v, m)| v + m)
            .collect()
    }
}

/// Emission distribution of one hidden state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateDistribution {
    /// Categorical over a symbol alphabet
    Discrete(DiscreteDistribution),
    /// Multivariate Gaussian
    Continuous(GaussianDistribution),
}

impl StateDistribution {
    /// Short name of the variant, used in error reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StateDistribution::Discrete(_) => "discrete",
            StateDistribution::Continuous(_) => "continuous",
        }
    }

    /// Whether this is the discrete variant.
    pub fn is_discrete(&self) -> bool {
        matches!(self, StateDistribution::Discrete(_))
    }

    /// Number of observation components.
    pub fn dimension(&self) -> usize {
        match self {
            StateDistribution::Discrete(d) => d.dimension(),
            StateDistribution::Continuous(g) => g.dimension(),
        }
    }

    /// Probability (discrete) or density (continuous) of an observation.
    pub fn probability(&self, observation: &[f64]) -> HmmResult<f64> {
        match self {
            StateDistribution::Discrete(d) => d.probability(observation),
            StateDistribution::Continuous(g) => g.probability(observation),
        }
    }

    /// Natural log of [`probability`](Self::probability); negative infinity for zero.
    pub fn ln_probability(&self, observation: &[f64]) -> HmmResult<f64> {
        match self {
            StateDistribution::Discrete(d) => {
                Ok(float_ops::ln_or_neg_infinity(d.probability(observation)?))
            }
            StateDistribution::Continuous(g) => g.ln_probability(observation),
        }
    }

    /// Refit with uniform weights `1/N`.
    pub fn fit(&mut self, observations: &[&[f64]]) -> HmmResult<()> {
        let weights = vec![1.0 / observations.len().max(1) as f64; observations.len()];
        self.fit_weighted(observations, &weights)
    }

    /// Refit from weighted observations, replacing all previous parameters.
    pub fn fit_weighted(&mut self, observations: &[&[f64]], weights: &[f64]) -> HmmResult<()> {
        match self {
            StateDistribution::Discrete(d) => d.fit_weighted(observations, weights),
            StateDistribution::Continuous(g) => g.fit_weighted(observations, weights),
        }
    }

    /// Draw one observation.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        match self {
            StateDistribution::Discrete(d) => d.generate(rng),
            StateDistribution::Continuous(g) => g.generate(rng),
        }
    }
}

impl From<DiscreteDistribution> for StateDistribution {
    fn from(d: DiscreteDistribution) -> Self {
        StateDistribution::Discrete(d)
    }
}

impl From<GaussianDistribution> for StateDistribution {
    fn from(g: GaussianDistribution) -> Self {
        StateDistribution::Continuous(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secure_rng::SecureRng;
    use assert_approx_eq::assert_approx_eq;

    fn refs(data: &[Vec<f64>]) -> Vec<&[f64]> {
        data.iter().map(Vec::as_slice).collect()
    }

    #[test]
    fn test_discrete_uniform_construction() {
        let d = DiscreteDistribution::new(&[4]).unwrap();
        assert_approx_eq!(d.probability(&[2.0]).unwrap(), 0.25);
        assert_eq!(d.cardinalities(), vec![4]);
        assert!(DiscreteDistribution::new(&[]).is_err());
        assert!(DiscreteDistribution::new(&[3, 0]).is_err());
    }

    #[test]
    fn test_discrete_unseen_symbol_is_zero() {
        let d = DiscreteDistribution::from_probabilities(vec![vec![0.9, 0.1]]).unwrap();
        assert_eq!(d.probability(&[5.0]).unwrap(), 0.0);
        assert_eq!(d.probability(&[0.5]).unwrap(), 0.0);
        assert_eq!(d.probability(&[-1.0]).unwrap(), 0.0);
        assert!(d.probability(&[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_discrete_fit_counts_symbols() {
        let mut d = DiscreteDistribution::new(&[3]).unwrap();
        let data = vec![vec![0.0], vec![0.0], vec![2.0], vec![0.0]];
        d.fit_weighted(&refs(&data), &[0.25; 4]).unwrap();
        assert_approx_eq!(d.symbol_probability(0, 0), 0.75);
        assert_approx_eq!(d.symbol_probability(0, 1), 0.0);
        assert_approx_eq!(d.symbol_probability(0, 2), 0.25);
    }

    #[test]
    fn test_discrete_multivariate_product() {
        let mut d = DiscreteDistribution::new(&[2, 3]).unwrap();
        let data = vec![vec![0.0, 2.0], vec![1.0, 2.0]];
        let mut dist = StateDistribution::Discrete(d.clone());
        dist.fit(&refs(&data)).unwrap();
        assert_approx_eq!(dist.probability(&[0.0, 2.0]).unwrap(), 0.5);
        assert_approx_eq!(dist.probability(&[1.0, 1.0]).unwrap(), 0.0);

        // Unnormalized weights are normalized per dimension
        d.fit_weighted(&refs(&data), &[3.0, 1.0]).unwrap();
        assert_approx_eq!(d.symbol_probability(0, 0), 0.75);
        assert_approx_eq!(d.symbol_probability(1, 2), 1.0);
    }

    #[test]
    fn test_discrete_fit_rejects_bad_symbol_without_mutating() {
        let mut d = DiscreteDistribution::new(&[2]).unwrap();
        let before = d.clone();
        let data = vec![vec![0.0], vec![7.0]];
        match d.fit_weighted(&refs(&data), &[0.5, 0.5]) {
            Err(HmmError::InvalidObservation { position, .. }) => assert_eq!(position, 1),
            other => panic!("Expected InvalidObservation, got {:?}", other),
        }
        assert_eq!(d, before);
    }

    #[test]
    fn test_fit_rejects_bad_weights() {
        let mut d = StateDistribution::Discrete(DiscreteDistribution::new(&[2]).unwrap());
        let data = vec![vec![0.0], vec![1.0]];
        assert!(d.fit_weighted(&refs(&data), &[1.0]).is_err());
        assert!(d.fit_weighted(&refs(&data), &[0.0, 0.0]).is_err());
        assert!(d.fit_weighted(&refs(&data), &[-1.0, 2.0]).is_err());
        assert!(d.fit(&[]).is_err());
    }

    #[test]
    fn test_gaussian_density_univariate() {
        let g = GaussianDistribution::new(vec![1.0], vec![vec![4.0]]).unwrap();
        // N(3 | 1, 4) = exp(-0.5) / sqrt(8π)
        let expected = (-0.5f64).exp() / (8.0 * std::f64::consts::PI).sqrt();
        assert_approx_eq!(g.probability(&[3.0]).unwrap(), expected, 1e-12);
    }

    #[test]
    fn test_gaussian_density_bivariate() {
        let g = GaussianDistribution::new(
            vec![0.0, 0.0],
            vec![vec![2.0, 1.0], vec![1.0, 2.0]],
        )
        .unwrap();
        // m = 2/3, |Σ| = 3
        let expected = (-1.0f64 / 3.0).exp() / (2.0 * std::f64::consts::PI * 3.0f64.sqrt());
        assert_approx_eq!(g.probability(&[1.0, 0.0]).unwrap(), expected, 1e-12);
    }

    #[test]
    fn test_gaussian_fit_recovers_moments() {
        let mut g = GaussianDistribution::standard(1);
        let data = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        g.fit_weighted(&refs(&data), &[1.0; 4]).unwrap();
        assert_approx_eq!(g.mean()[0], 2.5);
        assert_approx_eq!(g.covariance()[0][0], 1.25);
    }

    #[test]
    fn test_gaussian_fit_singular_keeps_previous_parameters() {
        let mut g = GaussianDistribution::standard(2);
        // Second component is constant, so the covariance has rank one
        let data = vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]];
        let result = StateDistribution::Continuous(g.clone()).fit(&refs(&data));
        assert!(matches!(result, Err(HmmError::SingularCovariance { .. })));
        assert!(g.fit_weighted(&refs(&data), &[1.0; 3]).is_err());
        assert_eq!(g.mean(), &[0.0, 0.0]);
    }

    #[test]
    fn test_gaussian_regularization_rescues_single_point() {
        let mut g = GaussianDistribution::standard(1).with_regularization(1e-3);
        let data = vec![vec![5.0]];
        g.fit_weighted(&refs(&data), &[1.0]).unwrap();
        assert_approx_eq!(g.covariance()[0][0], 1e-3);
        assert!(g.probability(&[5.0]).unwrap().is_finite());
    }

    #[test]
    fn test_gaussian_rejects_singular_construction() {
        let result = GaussianDistribution::new(vec![0.0], vec![vec![0.0]]);
        assert!(matches!(result, Err(HmmError::SingularCovariance { .. })));
    }

    #[test]
    fn test_fit_is_idempotent() {
        let data = vec![vec![0.5, 1.0], vec![1.5, -1.0], vec![2.0, 0.5], vec![-1.0, 0.0]];
        let mut g = StateDistribution::Continuous(GaussianDistribution::standard(2));
        g.fit(&refs(&data)).unwrap();
        let first = match &g {
            StateDistribution::Continuous(g) => (g.mean().to_vec(), g.covariance().to_vec()),
            _ => unreachable!(),
        };
        g.fit(&refs(&data)).unwrap();
        let second = match &g {
            StateDistribution::Continuous(g) => (g.mean().to_vec(), g.covariance().to_vec()),
            _ => unreachable!(),
        };
        assert_eq!(first, second);
    }

    #[test]
    fn test_gaussian_generate_moments() {
        let g = GaussianDistribution::new(
            vec![1.0, -2.0],
            vec![vec![1.0, 0.5], vec![0.5, 2.0]],
        )
        .unwrap();
        let mut rng = SecureRng::with_seed(42);
        let samples: Vec<Vec<f64>> = (0..20_000).map(|_| g.generate(&mut rng)).collect();

        let mut fitted = GaussianDistribution::standard(2);
        fitted
            .fit_weighted(&refs(&samples), &vec![1.0; samples.len()])
            .unwrap();
        assert_approx_eq!(fitted.mean()[0], 1.0, 0.05);
        assert_approx_eq!(fitted.mean()[1], -2.0, 0.05);
        assert_approx_eq!(fitted.covariance()[0][1], 0.5, 0.08);
        assert_approx_eq!(fitted.covariance()[1][1], 2.0, 0.1);
    }

    #[test]
    fn test_discrete_generate_frequencies() {
        let d = DiscreteDistribution::from_probabilities(vec![vec![0.1, 0.9]]).unwrap();
        let mut rng = SecureRng::with_seed(9);
        let ones = (0..5000)
            .filter(|_| d.generate(&mut rng)[0] == 1.0)
            .count();
        assert_approx_eq!(ones as f64 / 5000.0, 0.9, 0.03);
    }

    #[test]
    fn test_ln_probability_of_impossible_symbol() {
        let d = StateDistribution::from(
            DiscreteDistribution::from_probabilities(vec![vec![1.0, 0.0]]).unwrap(),
        );
        assert_eq!(d.ln_probability(&[1.0]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(d.kind_name(), "discrete");
        assert!(d.is_discrete());
    }
}
