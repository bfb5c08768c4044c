//! Order-(1,1,1) autoregressive integrated moving-average model
//!
//! The series is differenced once and the differences follow
//!
//! ```text
//! d[t] = c + phi * d[t-1] + theta * e[t-1] + e[t]
//! ```
//!
//! Parameters are estimated by conditional sum of squares: a coarse grid
//! over `(phi, theta)` in (-0.95, 0.95), then a fine grid around the best
//! point. The intercept is tied to the sample mean of the differences,
//! `c = mean(d) * (1 - phi)`.
//!
//! Forecast variance uses the psi weights of the integrated process, so the
//! step standard deviation widens with the horizon.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::series::ForecastSeries;
use crate::error::{Error, Result};
use crate::stats;

/// Fewest observations a fit will accept
pub const MIN_OBSERVATIONS: usize = 10;

const COARSE_STEP: f64 = 0.05;
const FINE_STEP: f64 = 0.01;
const BOUND: f64 = 0.95;

/// Fitted ARIMA(1,1,1) state, enough to forecast without the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaModel {
    pub c: f64,
    pub phi: f64,
    pub theta: f64,
    /// Last observed level of the series
    pub last_level: f64,
    /// Last observed first difference
    pub last_diff: f64,
    /// Residual of the last in-sample step
    pub last_resid: f64,
    /// Innovation standard deviation
    pub sigma: f64,
}

struct Candidate {
    phi: f64,
    theta: f64,
    sse: f64,
}

fn grid(center: f64, half_width: f64, step: f64) -> Vec<f64> {
    let lo = (center - half_width).max(-BOUND);
    let hi = (center + half_width).min(BOUND);
    let n = ((hi - lo) / step).round() as usize;
    (0..=n).map(|i| lo + i as f64 * step).collect()
}

/// Residuals of the differenced series under `(phi, theta)`
fn residuals(diffs: &[f64], mean_diff: f64, phi: f64, theta: f64) -> Vec<f64> {
    let c = mean_diff * (1.0 - phi);
    let mut resid = Vec::with_capacity(diffs.len());
    resid.push(0.0);
    for t in 1..diffs.len() {
        let predicted = c + phi * diffs[t - 1] + theta * resid[t - 1];
        resid.push(diffs[t] - predicted);
    }
    resid
}

fn sse(diffs: &[f64], mean_diff: f64, phi: f64, theta: f64) -> f64 {
    residuals(diffs, mean_diff, phi, theta)
        .iter()
        .skip(1)
        .map(|e| e * e)
        .sum()
}

fn search(diffs: &[f64], mean_diff: f64, phis: &[f64], thetas: &[f64]) -> Option<Candidate> {
    phis.par_iter()
        .flat_map_iter(|&phi| {
            thetas.iter().map(move |&theta| Candidate {
                phi,
                theta,
                sse: sse(diffs, mean_diff, phi, theta),
            })
        })
        .filter(|c| c.sse.is_finite())
        .min_by(|a, b| a.sse.total_cmp(&b.sse))
}

impl ArimaModel {
    /// Fit to a level series (e.g. daily income)
    pub fn fit(series: &[f64]) -> Result<Self> {
        if series.len() < MIN_OBSERVATIONS {
            return Err(Error::InsufficientData(format!(
                "ARIMA needs at least {} observations, got {}",
                MIN_OBSERVATIONS,
                series.len()
            )));
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(Error::ModelFit("series contains non-finite values".to_string()));
        }

        let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();
        let mean_diff = stats::mean(&diffs);
        if stats::population_std(&diffs) == 0.0 {
            return Err(Error::ModelFit("differenced series has zero variance".to_string()));
        }

        let coarse = grid(0.0, BOUND, COARSE_STEP);
        let best = search(&diffs, mean_diff, &coarse, &coarse)
            .ok_or_else(|| Error::ModelFit("no finite likelihood on coarse grid".to_string()))?;

        let phis = grid(best.phi, COARSE_STEP, FINE_STEP);
        let thetas = grid(best.theta, COARSE_STEP, FINE_STEP);
        let best = search(&diffs, mean_diff, &phis, &thetas).unwrap_or(best);

        let resid = residuals(&diffs, mean_diff, best.phi, best.theta);
        let dof = (resid.len() - 1).max(1) as f64;
        let sigma = (best.sse / dof).sqrt();
        if !sigma.is_finite() {
            return Err(Error::ModelFit("innovation variance is not finite".to_string()));
        }

        Ok(Self {
            c: mean_diff * (1.0 - best.phi),
            phi: best.phi,
            theta: best.theta,
            last_level: series[series.len() - 1],
            last_diff: diffs[diffs.len() - 1],
            last_resid: resid[resid.len() - 1],
            sigma,
        })
    }

    /// Forecast `horizon` steps ahead; levels are floored at zero
    pub fn forecast(&self, horizon: usize) -> ForecastSeries {
        let mut values = Vec::with_capacity(horizon);
        let mut step_std = Vec::with_capacity(horizon);

        let mut level = self.last_level;
        let mut diff = self.c + self.phi * self.last_diff + self.theta * self.last_resid;

        // psi weights of the ARMA part, accumulated for the integration
        let mut psi = 1.0;
        let mut cumulative = 0.0;
        let mut variance = 0.0;

        for step in 0..horizon {
            if step > 0 {
                diff = self.c + self.phi * diff;
            }
            level += diff;
            values.push(level.max(0.0));

            psi = match step {
                0 => 1.0,
                1 => self.phi + self.theta,
                _ => self.phi * psi,
            };
            cumulative += psi;
            variance += cumulative * cumulative;
            step_std.push(self.sigma * variance.sqrt());
        }

        ForecastSeries { values, step_std }
    }
}
