//! Covariance shrinkage and portfolio-adjusted Kelly fraction.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use tracing::trace;

use crate::error::{RiskError, RiskResult};

/// Ceiling on the shrinkage intensity.
pub const MAX_SHRINKAGE: f64 = 0.95;

/// Floor applied to eigenvalues when projecting to PSD.
pub const EIGEN_FLOOR: f64 = 1e-10;

/// Default variance floor for [`PortfolioShrinkage::compute_portfolio_fraction`].
pub const VARIANCE_EPS: f64 = 1e-12;

/// Ledoit-Wolf style shrinkage toward a scaled identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PortfolioShrinkage;

impl PortfolioShrinkage {
    pub fn new() -> Self {
        Self
    }

    /// Build a square matrix from row vectors.
    pub fn matrix_from_rows(rows: &[Vec<f64>]) -> RiskResult<DMatrix<f64>> {
        let n = rows.len();
        if n == 0 || rows.iter().any(|r| r.len() != n) {
            return Err(RiskError::DimensionMismatch(format!(
                "covariance must be square and non-empty, got {n} rows"
            )));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(RiskError::NonFinite("covariance"));
        }
        Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
    }

    /// Shrink `sigma` toward `mu * I` and project to PSD.
    ///
    /// Returns the shrunk matrix and the intensity `delta` in `[0, 0.95]`.
    pub fn shrink(&self, sigma: &DMatrix<f64>) -> RiskResult<(DMatrix<f64>, f64)> {
        let n = sigma.nrows();
        if n == 0 || sigma.ncols() != n {
            return Err(RiskError::DimensionMismatch(format!(
                "covariance must be square, got {}x{}",
                sigma.nrows(),
                sigma.ncols()
            )));
        }
        if sigma.iter().any(|v| !v.is_finite()) {
            return Err(RiskError::NonFinite("covariance"));
        }

        let sym = (sigma + sigma.transpose()) * 0.5;
        let mu = sym.diagonal().mean();

        let mut off_energy = 0.0;
        let mut diag_energy = 0.0;
        for i in 0..n {
            for j in 0..n {
                let v = sym[(i, j)];
                if i == j {
                    diag_energy += (v - mu).powi(2);
                } else {
                    off_energy += v.powi(2);
                }
            }
        }
        let total = off_energy + diag_energy;
        let delta = if total > 0.0 {
            (off_energy / total).clamp(0.0, MAX_SHRINKAGE)
        } else {
            0.0
        };

        let target = DMatrix::<f64>::identity(n, n) * mu;
        let shrunk = &sym * (1.0 - delta) + target * delta;
        let projected = project_psd(shrunk);

        trace!(n, delta, mu, "covariance shrunk");
        Ok((projected, delta))
    }

    /// `min(f_raw / max(w' S w, eps), f_max)`, floored at zero.
    pub fn compute_portfolio_fraction(
        &self,
        f_raw: f64,
        weights: &DVector<f64>,
        sigma_hat: &DMatrix<f64>,
        f_max: f64,
        eps: f64,
    ) -> RiskResult<f64> {
        if weights.len() != sigma_hat.nrows() || sigma_hat.nrows() != sigma_hat.ncols() {
            return Err(RiskError::DimensionMismatch(format!(
                "weights of length {} against {}x{} covariance",
                weights.len(),
                sigma_hat.nrows(),
                sigma_hat.ncols()
            )));
        }
        let variance = weights.dot(&(sigma_hat * weights));
        if !variance.is_finite() || !f_raw.is_finite() {
            return Err(RiskError::NonFinite("portfolio variance"));
        }
        let fraction = (f_raw / variance.max(eps)).min(f_max);
        Ok(fraction.max(0.0))
    }
}

/// Clip negative eigenvalues to a small positive floor.
fn project_psd(m: DMatrix<f64>) -> DMatrix<f64> {
    let eigen = SymmetricEigen::new(m);
    let clipped = eigen.eigenvalues.map(|v| v.max(EIGEN_FLOOR));
    let d = DMatrix::from_diagonal(&clipped);
    let rebuilt = &eigen.eigenvectors * d * eigen.eigenvectors.transpose();
    (&rebuilt + rebuilt.transpose()) * 0.5
}
