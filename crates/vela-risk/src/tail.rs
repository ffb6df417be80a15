//! Extreme-value tail fit and CVaR admission gate.
//!
//! Losses are positive numbers. The tail above the empirical
//! `tail_quantile` is modeled with a Generalized Pareto Distribution fitted
//! by method of moments.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TailRiskConfig;
use crate::error::{RiskError, RiskResult};

/// Clamp range for the GPD shape.
pub const XI_MAX: f64 = 0.95;

/// Shape values below this use the exponential-tail closed form.
const XI_EPS: f64 = 1e-6;

/// Scale floor for a non-degenerate fit.
const BETA_FLOOR: f64 = 1e-12;

/// Fitted peaks-over-threshold model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpdFit {
    /// Threshold (empirical quantile).
    pub u: f64,
    /// Shape, clamped to `[0, 0.95]`.
    pub xi: f64,
    /// Scale; `0` marks a degenerate fit.
    pub beta: f64,
    pub n_exceedances: usize,
    pub n: usize,
    /// Quantile used for the threshold.
    pub quantile: f64,
}

impl GpdFit {
    pub fn is_degenerate(&self) -> bool {
        self.beta <= 0.0
    }

    /// Conditional value at risk at confidence `alpha`.
    ///
    /// Non-decreasing in `alpha`. Returns `u` at or below the tail quantile
    /// and for degenerate fits.
    pub fn cvar(&self, alpha: f64) -> f64 {
        if self.is_degenerate() || alpha.is_nan() || alpha <= self.quantile || self.n == 0 {
            return self.u;
        }
        if alpha >= 1.0 {
            return f64::INFINITY;
        }
        let zeta = self.n_exceedances as f64 / self.n as f64;
        let tail = 1.0 - alpha;

        let es = if self.xi < XI_EPS {
            let var = self.u + self.beta * (zeta / tail).ln();
            var + self.beta
        } else {
            let var = self.u + (self.beta / self.xi) * ((tail / zeta).powf(-self.xi) - 1.0);
            var / (1.0 - self.xi) + (self.beta - self.xi * self.u) / (1.0 - self.xi)
        };
        es.max(self.u)
    }
}

/// Linear-interpolated empirical quantile of sorted data.
fn empirical_quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[derive(Debug, Clone)]
pub struct TailRiskGate {
    config: TailRiskConfig,
}

impl TailRiskGate {
    pub fn new(config: TailRiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TailRiskConfig {
        &self.config
    }

    /// Fit the tail at the configured quantile.
    pub fn fit(&self, losses: &[f64]) -> RiskResult<GpdFit> {
        Self::fit_at(losses, self.config.tail_quantile, self.config.min_exceedances)
    }

    /// Fit a GPD to exceedances above the empirical `quantile`.
    pub fn fit_at(losses: &[f64], quantile: f64, min_exceedances: usize) -> RiskResult<GpdFit> {
        if losses.is_empty() {
            return Err(RiskError::InvalidInput("empty loss history".to_string()));
        }
        if losses.iter().any(|l| !l.is_finite()) {
            return Err(RiskError::NonFinite("loss history"));
        }
        if !(quantile > 0.0 && quantile < 1.0) {
            return Err(RiskError::InvalidInput(format!(
                "tail quantile must be in (0, 1), got {quantile}"
            )));
        }

        let mut sorted = losses.to_vec();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();
        let u = empirical_quantile(&sorted, quantile);

        let excess: Vec<f64> = sorted.iter().filter(|&&x| x > u).map(|x| x - u).collect();
        let k = excess.len();

        if k < min_exceedances {
            debug!(n, k, u, "too few exceedances, degenerate tail fit");
            return Ok(GpdFit {
                u,
                xi: 0.0,
                beta: 0.0,
                n_exceedances: k,
                n,
                quantile,
            });
        }

        let mean = excess.iter().sum::<f64>() / k as f64;
        let var = excess.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / (k - 1) as f64;

        let (xi, beta) = if var > 0.0 {
            let ratio = mean * mean / var;
            (0.5 * (1.0 - ratio), 0.5 * mean * (ratio + 1.0))
        } else {
            (0.0, mean)
        };
        let xi = xi.clamp(0.0, XI_MAX);
        let beta = beta.max(BETA_FLOOR);

        debug!(n, k, u, xi, beta, "tail fitted");
        Ok(GpdFit {
            u,
            xi,
            beta,
            n_exceedances: k,
            n,
            quantile,
        })
    }

    /// `cvar_current + max(0, delta) <= limit`. Non-finite inputs deny.
    pub fn allow_trade(cvar_current: f64, delta_cvar: f64, limit: f64) -> bool {
        if cvar_current.is_nan() || delta_cvar.is_nan() || limit.is_nan() {
            return false;
        }
        cvar_current + delta_cvar.max(0.0) <= limit
    }
}
