//! Mathematical utility functions and constants shared by the HMM algorithms.
//!
//! Probability vectors are plain `&[f64]` slices throughout the crate; the helpers here
//! normalize them, sample from them and take their logarithms.

use rand::Rng;

/// Numerical constants used across the crate.
pub mod constants {
    /// Default tolerance when checking that probability rows sum to one
    pub const NORMALIZATION_TOLERANCE: f64 = 1e-9;

    /// ln(2π)
    pub const LN_TWO_PI: f64 = 1.837_877_066_409_345_3;
}

/// Log-space helpers.
pub mod float_ops {
    /// Natural log that maps zero to negative infinity instead of failing.
    #[inline]
    pub fn ln_or_neg_infinity(x: f64) -> f64 {
        if x > 0.0 {
            x.ln()
        } else {
            f64::NEG_INFINITY
        }
    }

    /// `ln Σ exp(vᵢ)`, shifted by the maximum so large negative terms do not underflow.
    pub fn ln_sum_exp(values: &[f64]) -> f64 {
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
    }
}

/// Divide every entry by the sum of the slice.
///
/// Returns the sum. A zero (or non-finite) sum leaves the slice untouched so the caller
/// can choose its own fallback.
pub fn normalize_in_place(values: &mut [f64]) -> f64 {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        let inv = 1.0 / sum;
        for v in values.iter_mut() {
            *v *= inv;
        }
    }
    sum
}

/// A uniform probability vector of length `n`.
pub fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Draw an index with probability proportional to `weights`.
///
/// Walks the cumulative sum and falls back to the last index when rounding leaves the
/// target just above the final cumulative value.
pub fn sample_categorical<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > target {
            return i;
        }
    }
    weights.len().saturating_sub(1)
}

/// Index of the largest value; ties resolve to the lowest index.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_value {
            best_value = v;
            best = i;
        }
    }
    best
}
