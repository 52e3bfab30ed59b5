//! Linear algebra operations for multivariate Gaussian emissions.
//!
//! Covariance matrices are stored row-major as `Vec<Vec<f64>>` in the public API and
//! converted to `nalgebra` matrices for the Cholesky decomposition that yields the
//! inverse and determinant used by the density.

use crate::errors::{HmmError, HmmResult};
use nalgebra::{Cholesky, DMatrix, DVector};

/// Relative tolerance for the symmetry check on covariance matrices
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Validates that input contains no NaN or Inf values
fn ensure_finite_matrix(a: &[Vec<f64>], operation: &str) -> HmmResult<()> {
    for (i, row) in a.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(HmmError::NumericalError {
                    reason: format!("Non-finite value ({}) at position [{},{}]", val, i, j),
                    operation: Some(operation.to_string()),
                });
            }
        }
    }
    Ok(())
}

/// Validates that a matrix is square and non-empty, returning its order
fn ensure_square_matrix(a: &[Vec<f64>]) -> HmmResult<usize> {
    let n = a.len();
    if n == 0 {
        return Err(HmmError::NumericalError {
            reason: "Empty matrix provided".to_string(),
            operation: Some("matrix_validation".to_string()),
        });
    }
    if let Some(row) = a.iter().find(|row| row.len() != n) {
        return Err(HmmError::DimensionMismatch {
            expected: n,
            actual: row.len(),
        });
    }
    Ok(n)
}

/// Convert row-major nested vectors into a dense `nalgebra` matrix.
pub fn to_dmatrix(a: &[Vec<f64>]) -> DMatrix<f64> {
    let rows = a.len();
    let cols = a.first().map_or(0, Vec::len);
    DMatrix::from_fn(rows, cols, |i, j| a[i][j])
}

/// An identity matrix in row-major nested form.
pub fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

/// Cached factorization of a symmetric positive definite covariance matrix.
///
/// Holds the lower Cholesky factor `L` (with `Σ = L·Lᵗ`), the inverse `Σ⁻¹` and the
/// determinant `|Σ|`, all computed once when the covariance changes.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceDecomposition {
    cholesky: DMatrix<f64>,
    inverse: DMatrix<f64>,
    determinant: f64,
    ln_determinant: f64,
}

impl CovarianceDecomposition {
    /// Decomposition of the `n`-dimensional identity matrix.
    pub fn identity(n: usize) -> Self {
        Self {
            cholesky: DMatrix::identity(n, n),
            inverse: DMatrix::identity(n, n),
            determinant: 1.0,
            ln_determinant: 0.0,
        }
    }

    /// Lower-triangular Cholesky factor.
    pub fn cholesky_factor(&self) -> &DMatrix<f64> {
        &self.cholesky
    }

    /// Inverse covariance (precision) matrix.
    pub fn inverse(&self) -> &DMatrix<f64> {
        &self.inverse
    }

    /// Determinant of the covariance matrix.
    pub fn determinant(&self) -> f64 {
        self.determinant
    }

    /// Natural log of the determinant, computed from the Cholesky diagonal.
    pub fn ln_determinant(&self) -> f64 {
        self.ln_determinant
    }

    /// Squared Mahalanobis distance `(x-μ)ᵗ Σ⁻¹ (x-μ)` for a centered vector `diff`.
    pub fn mahalanobis_squared(&self, diff: &[f64]) -> f64 {
        let v = DVector::from_column_slice(diff);
        v.dot(&(&self.inverse * &v))
    }

    /// Map a standard-normal vector `z` to `L·z`.
    pub fn correlate(&self, z: &[f64]) -> Vec<f64> {
        let v = &self.cholesky * DVector::from_column_slice(z);
        v.iter().copied().collect()
    }
}

/// Decompose a covariance matrix, failing with [`HmmError::SingularCovariance`] when it is
/// not symmetric positive definite.
///
/// Callers that want a ridge on the diagonal add it to `covariance` before calling, so the
/// stored covariance and the factorization always agree.
pub fn decompose_covariance(covariance: &[Vec<f64>]) -> HmmResult<CovarianceDecomposition> {
    let n = ensure_square_matrix(covariance)?;
    ensure_finite_matrix(covariance, "decompose_covariance")?;

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (covariance[i][j], covariance[j][i]);
            let scale = a.abs().max(b.abs()).max(1.0);
            if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(HmmError::SingularCovariance {
                    reason: format!("matrix is not symmetric at [{},{}]: {} vs {}", i, j, a, b),
                });
            }
        }
    }

    let cholesky =
        Cholesky::new(to_dmatrix(covariance)).ok_or_else(|| HmmError::SingularCovariance {
            reason: format!("{}x{} matrix is not positive definite", n, n),
        })?;

    let l = cholesky.l();
    let ln_determinant = 2.0 * l.diagonal().iter().map(|x| x.ln()).sum::<f64>();
    let determinant = ln_determinant.exp();
    if !ln_determinant.is_finite() || determinant <= 0.0 {
        return Err(HmmError::SingularCovariance {
            reason: format!("determinant underflows (ln|Σ| = {:.3e})", ln_determinant),
        });
    }

    Ok(CovarianceDecomposition {
        inverse: cholesky.inverse(),
        cholesky: l,
        determinant,
        ln_determinant,
    })
}
