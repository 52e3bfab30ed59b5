//! Forward-backward lattices for a single observation sequence.
//!
//! [`ForwardBackwardCalculator`] computes the raw α/β recursions, which underflow after a
//! few dozen steps in double precision. [`ForwardBackwardScaledCalculator`] divides every
//! forward step by its sum `cₜ`, recovers `ln P(O)` as `Σ ln cₜ`, and reuses the same
//! factors for the backward pass so that state posteriors stay well-scaled.

use crate::{
    errors::{HmmError, HmmResult},
    hmm_core::HiddenMarkovModel,
};

/// Unscaled forward and (optionally) backward lattices.
#[derive(Debug, Clone)]
pub struct ForwardBackwardCalculator {
    alpha: Vec<Vec<f64>>,
    beta: Option<Vec<Vec<f64>>>,
    probability: f64,
}

impl ForwardBackwardCalculator {
    /// Run the forward pass only.
    pub fn forward<O: AsRef<[f64]>>(sequence: &[O], model: &HiddenMarkovModel) -> HmmResult<Self> {
        let emissions = model.emission_table(sequence)?;
        let alpha = forward_lattice(model, &emissions);
        let probability = alpha.last().map_or(0.0, |row| row.iter().sum());
        Ok(Self {
            alpha,
            beta: None,
            probability,
        })
    }

    /// Run both the forward and the backward pass.
    pub fn forward_backward<O: AsRef<[f64]>>(
        sequence: &[O],
        model: &HiddenMarkovModel,
    ) -> HmmResult<Self> {
        let emissions = model.emission_table(sequence)?;
        let alpha = forward_lattice(model, &emissions);
        let probability = alpha.last().map_or(0.0, |row| row.iter().sum());

        let n = model.state_count();
        let t_len = emissions.len();
        let a = model.transition_matrix();
        let mut beta = vec![vec![0.0; n]; t_len];
        beta[t_len - 1] = vec![1.0; n];
        for t in (0..t_len - 1).rev() {
            for i in 0..n {
                beta[t][i] = (0..n)
                    .map(|j| a[i][j] * emissions[t + 1][j] * beta[t + 1][j])
                    .sum();
            }
        }

        Ok(Self {
            alpha,
            beta: Some(beta),
            probability,
        })
    }

    /// P(sequence) = Σᵢ α_{T-1}(i).
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// α lattice, indexed `[t][state]`.
    pub fn alpha(&self) -> &[Vec<f64>] {
        &self.alpha
    }

    /// β lattice, or `None` if only the forward pass was run.
    pub fn beta(&self) -> Option<&[Vec<f64>]> {
        self.beta.as_deref()
    }
}

/// α₀(i) = π(i)·bᵢ(o₀); αₜ(j) = bⱼ(oₜ)·Σᵢ αₜ₋₁(i)·A(i,j).
fn forward_lattice(model: &HiddenMarkovModel, emissions: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = model.state_count();
    let pi = model.initial_probabilities();
    let a = model.transition_matrix();

    let mut alpha = Vec::with_capacity(emissions.len());
    alpha.push((0..n).map(|i| pi[i] * emissions[0][i]).collect::<Vec<f64>>());
    for b in &emissions[1..] {
        let prev = &alpha[alpha.len() - 1];
        let next = (0..n)
            .map(|j| b[j] * (0..n).map(|i| prev[i] * a[i][j]).sum::<f64>())
            .collect();
        alpha.push(next);
    }
    alpha
}

/// Scaled forward-backward lattices.
///
/// With `cₜ` the sum of the unnormalized forward values at step `t`:
/// - `α̂ₜ` sums to 1 at every step,
/// - `β̂_{T-1}(i) = 1 / c_{T-1}` and `β̂ₜ(i) = Σⱼ A(i,j)·bⱼ(oₜ₊₁)·β̂ₜ₊₁(j) / cₜ`,
/// - `γₜ(i) = α̂ₜ(i)·β̂ₜ(i)·cₜ` and `ξₜ(i,j) = α̂ₜ(i)·A(i,j)·bⱼ(oₜ₊₁)·β̂ₜ₊₁(j)`.
#[derive(Debug, Clone)]
pub struct ForwardBackwardScaledCalculator {
    alpha: Vec<Vec<f64>>,
    beta: Option<Vec<Vec<f64>>>,
    scale_factors: Vec<f64>,
    ln_probability: f64,
    emissions: Vec<Vec<f64>>,
    transition: Vec<Vec<f64>>,
}

impl ForwardBackwardScaledCalculator {
    /// Run the scaled forward pass.
    ///
    /// Fails with [`HmmError::ZeroLikelihood`] at the first step where every state has zero
    /// forward mass, since the sequence is impossible under the model from there on.
    pub fn forward<O: AsRef<[f64]>>(sequence: &[O], model: &HiddenMarkovModel) -> HmmResult<Self> {
        let emissions = model.emission_table(sequence)?;
        let n = model.state_count();
        let pi = model.initial_probabilities();
        let a = model.transition_matrix();
        let t_len = emissions.len();

        let mut alpha: Vec<Vec<f64>> = Vec::with_capacity(t_len);
        let mut scale_factors = Vec::with_capacity(t_len);

        for (t, b) in emissions.iter().enumerate() {
            let mut row: Vec<f64> = match alpha.last() {
                None => (0..n).map(|i| pi[i] * b[i]).collect(),
                Some(prev) => (0..n)
                    .map(|j| b[j] * (0..n).map(|i| prev[i] * a[i][j]).sum::<f64>())
                    .collect(),
            };
            let c: f64 = row.iter().sum();
            if c <= 0.0 || !c.is_finite() {
                return Err(HmmError::ZeroLikelihood { position: t });
            }
            row.iter_mut().for_each(|x| *x /= c);
            alpha.push(row);
            scale_factors.push(c);
        }

        let ln_probability = scale_factors.iter().map(|c| c.ln()).sum();
        Ok(Self {
            alpha,
            beta: None,
            scale_factors,
            ln_probability,
            emissions,
            transition: a.to_vec(),
        })
    }

    /// Run the scaled forward pass followed by the scaled backward pass.
    pub fn forward_backward<O: AsRef<[f64]>>(
        sequence: &[O],
        model: &HiddenMarkovModel,
    ) -> HmmResult<Self> {
        let mut calc = Self::forward(sequence, model)?;
        let n = model.state_count();
        let t_len = calc.emissions.len();
        let a = &calc.transition;
        let b = &calc.emissions;
        let c = &calc.scale_factors;

        let mut beta = vec![vec![0.0; n]; t_len];
        beta[t_len - 1] = vec![1.0 / c[t_len - 1]; n];
        for t in (0..t_len - 1).rev() {
            for i in 0..n {
                let sum: f64 = (0..n).map(|j| a[i][j] * b[t + 1][j] * beta[t + 1][j]).sum();
                beta[t][i] = sum / c[t];
            }
        }

        calc.beta = Some(beta);
        Ok(calc)
    }

    /// ln P(sequence) = Σₜ ln cₜ.
    pub fn ln_probability(&self) -> f64 {
        self.ln_probability
    }

    /// Per-step scale factors `cₜ`.
    pub fn scale_factors(&self) -> &[f64] {
        &self.scale_factors
    }

    /// Normalized forward lattice α̂, indexed `[t][state]`.
    pub fn alpha(&self) -> &[Vec<f64>] {
        &self.alpha
    }

    /// Scaled backward lattice β̂, or `None` if only the forward pass was run.
    pub fn beta(&self) -> Option<&[Vec<f64>]> {
        self.beta.as_deref()
    }

    /// P(state `i` at time `t` | sequence). Needs the backward pass.
    ///
    /// # Panics
    /// Panics if `t` or `i` is out of range.
    pub fn posterior(&self, t: usize, i: usize) -> Option<f64> {
        let beta = self.beta.as_ref()?;
        Some(self.alpha[t][i] * beta[t][i] * self.scale_factors[t])
    }

    /// Full γ lattice, indexed `[t][state]`. Needs the backward pass.
    pub fn posteriors(&self) -> Option<Vec<Vec<f64>>> {
        let beta = self.beta.as_ref()?;
        Some(
            self.alpha
                .iter()
                .zip(beta)
                .zip(&self.scale_factors)
                .map(|((a, b), c)| a.iter().zip(b).map(|(x, y)| x * y * c).collect())
                .collect(),
        )
    }

    /// Pair posteriors ξₜ(i,j) = P(state i at t, state j at t+1 | sequence) for
    /// `t < T-1`. Needs the backward pass.
    ///
    /// # Panics
    /// Panics if `t + 1` is out of range.
    pub fn transition_posteriors(&self, t: usize) -> Option<Vec<Vec<f64>>> {
        let beta = self.beta.as_ref()?;
        let n = self.transition.len();
        Some(
            (0..n)
                .map(|i| {
                    (0..n)
                        .map(|j| {
                            self.alpha[t][i]
                                * self.transition[i][j]
                                * self.emissions[t + 1][j]
                                * beta[t + 1][j]
                        })
                        .collect()
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emission_models::DiscreteDistribution;
    use assert_approx_eq::assert_approx_eq;

    fn two_state_model() -> HiddenMarkovModel {
        let mut hmm = HiddenMarkovModel::new_discrete(2, &[2]).unwrap();
        hmm.set_pi(0, 0.6);
        hmm.set_pi(1, 0.4);
        hmm.set_transition_probability(0, 0, 0.7);
        hmm.set_transition_probability(0, 1, 0.3);
        hmm.set_transition_probability(1, 0, 0.4);
        hmm.set_transition_probability(1, 1, 0.6);
        let b0 = DiscreteDistribution::from_probabilities(vec![vec![0.9, 0.1]]).unwrap();
        let b1 = DiscreteDistribution::from_probabilities(vec![vec![0.2, 0.8]]).unwrap();
        hmm.set_state_distribution(0, b0.into()).unwrap();
        hmm.set_state_distribution(1, b1.into()).unwrap();
        hmm
    }

    fn symbols(s: &[usize]) -> Vec<Vec<f64>> {
        s.iter().map(|&x| vec![x as f64]).collect()
    }

    #[test]
    fn test_forward_probability_reference_value() {
        let hmm = two_state_model();
        let calc = ForwardBackwardCalculator::forward(&symbols(&[0, 0, 1, 1, 0]), &hmm).unwrap();
        assert_approx_eq!(calc.probability(), 0.032547645, 1e-9);
        assert!(calc.beta().is_none());
    }

    #[test]
    fn test_alpha_beta_product_is_constant() {
        let hmm = two_state_model();
        let seq = symbols(&[0, 1, 1, 0, 1, 0]);
        let calc = ForwardBackwardCalculator::forward_backward(&seq, &hmm).unwrap();
        let beta = calc.beta().unwrap();
        for (a, b) in calc.alpha().iter().zip(beta) {
            let total: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            assert_approx_eq!(total, calc.probability(), 1e-12);
        }
    }

    #[test]
    fn test_scaled_matches_unscaled() {
        let hmm = two_state_model();
        let seq = symbols(&[0, 0, 1, 1, 0, 1, 1, 1, 0]);
        let plain = ForwardBackwardCalculator::forward(&seq, &hmm).unwrap();
        let scaled = ForwardBackwardScaledCalculator::forward(&seq, &hmm).unwrap();
        assert_approx_eq!(scaled.ln_probability().exp(), plain.probability(), 1e-12);
        for row in scaled.alpha() {
            assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-12);
        }
    }

    #[test]
    fn test_scaled_posteriors_sum_to_one() {
        let hmm = two_state_model();
        let seq = symbols(&[1, 0, 0, 1, 1]);
        let calc = ForwardBackwardScaledCalculator::forward_backward(&seq, &hmm).unwrap();
        let gamma = calc.posteriors().unwrap();
        for row in &gamma {
            assert_approx_eq!(row.iter().sum::<f64>(), 1.0, 1e-12);
        }
        for t in 0..seq.len() - 1 {
            let xi = calc.transition_posteriors(t).unwrap();
            let total: f64 = xi.iter().flatten().sum();
            assert_approx_eq!(total, 1.0, 1e-12);
            // Marginalizing ξ over the next state gives γ.
            for i in 0..2 {
                assert_approx_eq!(xi[i].iter().sum::<f64>(), gamma[t][i], 1e-12);
            }
        }
    }

    #[test]
    fn test_scaled_posteriors_match_unscaled() {
        let hmm = two_state_model();
        let seq = symbols(&[0, 1, 0, 1]);
        let plain = ForwardBackwardCalculator::forward_backward(&seq, &hmm).unwrap();
        let scaled = ForwardBackwardScaledCalculator::forward_backward(&seq, &hmm).unwrap();
        let beta = plain.beta().unwrap();
        for t in 0..seq.len() {
            for i in 0..2 {
                let expected = plain.alpha()[t][i] * beta[t][i] / plain.probability();
                assert_approx_eq!(scaled.posterior(t, i).unwrap(), expected, 1e-12);
            }
        }
    }

    #[test]
    fn test_posteriors_need_backward_pass() {
        let hmm = two_state_model();
        let calc = ForwardBackwardScaledCalculator::forward(&symbols(&[0, 1]), &hmm).unwrap();
        assert!(calc.posterior(0, 0).is_none());
        assert!(calc.posteriors().is_none());
        assert!(calc.transition_posteriors(0).is_none());
    }

    #[test]
    fn test_empty_sequence_is_rejected() {
        let hmm = two_state_model();
        let empty: Vec<Vec<f64>> = Vec::new();
        assert_eq!(
            ForwardBackwardCalculator::forward(&empty, &hmm).unwrap_err(),
            HmmError::EmptySequence
        );
        assert_eq!(
            ForwardBackwardScaledCalculator::forward_backward(&empty, &hmm).unwrap_err(),
            HmmError::EmptySequence
        );
    }

    #[test]
    fn test_impossible_sequence_reports_zero_likelihood() {
        let mut hmm = two_state_model();
        let only_zero = DiscreteDistribution::from_probabilities(vec![vec![1.0, 0.0]]).unwrap();
        hmm.set_state_distribution(0, only_zero.clone().into()).unwrap();
        hmm.set_state_distribution(1, only_zero.into()).unwrap();

        let seq = symbols(&[0, 0, 1]);
        assert_eq!(
            ForwardBackwardScaledCalculator::forward(&seq, &hmm).unwrap_err(),
            HmmError::ZeroLikelihood { position: 2 }
        );
        let plain = ForwardBackwardCalculator::forward(&seq, &hmm).unwrap();
        assert_eq!(plain.probability(), 0.0);
    }

    #[test]
    fn test_single_observation() {
        let hmm = two_state_model();
        let calc = ForwardBackwardScaledCalculator::forward_backward(&symbols(&[1]), &hmm).unwrap();
        // 0.6·0.1 + 0.4·0.8
        assert_approx_eq!(calc.ln_probability(), 0.38f64.ln(), 1e-12);
        assert_approx_eq!(calc.posterior(0, 1).unwrap(), 0.32 / 0.38, 1e-12);
    }
}
