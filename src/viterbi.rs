//! Viterbi decoding.
//!
//! The max-product recursion runs in log space, so long sequences do not underflow.
//! Ties are broken towards the lowest state index, both in the recursion and at the final
//! step, which keeps decoding deterministic.

use crate::{
    errors::HmmResult,
    hmm_core::HiddenMarkovModel,
    math_utils::{argmax, float_ops},
};

/// Most probable hidden-state path for one observation sequence.
#[derive(Debug, Clone)]
pub struct ViterbiCalculator {
    states: Vec<usize>,
    ln_probability: f64,
}

impl ViterbiCalculator {
    /// Decode `sequence` under `model`.
    ///
    /// δ₀(i) = ln π(i) + ln bᵢ(o₀); δₜ(j) = maxᵢ [δₜ₋₁(i) + ln A(i,j)] + ln bⱼ(oₜ), with the
    /// arg-max kept as backpointer ψₜ(j).
    pub fn new<O: AsRef<[f64]>>(sequence: &[O], model: &HiddenMarkovModel) -> HmmResult<Self> {
        let ln_b = model.ln_emission_table(sequence)?;
        let n = model.state_count();
        let t_len = ln_b.len();
        let ln_a: Vec<Vec<f64>> = model
            .transition_matrix()
            .iter()
            .map(|row| row.iter().map(|&p| float_ops::ln_or_neg_infinity(p)).collect())
            .collect();

        let mut delta: Vec<f64> = (0..n)
            .map(|i| float_ops::ln_or_neg_infinity(model.pi(i)) + ln_b[0][i])
            .collect();
        let mut psi = vec![vec![0usize; n]; t_len];

        for t in 1..t_len {
            let mut next = vec![f64::NEG_INFINITY; n];
            for j in 0..n {
                let mut best = f64::NEG_INFINITY;
                let mut best_i = 0;
                for i in 0..n {
                    let candidate = delta[i] + ln_a[i][j];
                    if candidate > best {
                        best = candidate;
                        best_i = i;
                    }
                }
                next[j] = best + ln_b[t][j];
                psi[t][j] = best_i;
            }
            delta = next;
        }

        let last = argmax(&delta);
        let ln_probability = delta[last];

        let mut states = vec![0; t_len];
        states[t_len - 1] = last;
        for t in (1..t_len).rev() {
            states[t - 1] = psi[t][states[t]];
        }

        Ok(Self {
            states,
            ln_probability,
        })
    }

    /// Decoded state path, one index per observation.
    pub fn state_sequence(&self) -> &[usize] {
        &self.states
    }

    /// Consume the calculator and return the decoded path.
    pub fn into_state_sequence(self) -> Vec<usize> {
        self.states
    }

    /// ln P(sequence, decoded path). Negative infinity if every path is impossible.
    pub fn ln_probability(&self) -> f64 {
        self.ln_probability
    }
}
