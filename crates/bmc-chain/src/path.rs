use bmc_core::{BmcError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::special::inverse_regularized_incomplete_beta;

/// Strategy producing the tempering values visited by path sampling.
///
/// Every generated sequence starts at `theta = 1` (the posterior) and ends at
/// `theta = 0` (the prior), except [`PathSchedule::Fixed`] which yields the
/// caller's list verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "kebab-case")]
pub enum PathSchedule {
    /// `theta_i = 1 - i / steps`.
    Linear,
    /// `theta_i = 2^-i`, then a final `theta = 0`.
    Geometric,
    /// Quantiles of a Beta(alpha, beta) distribution.
    Beta {
        /// First shape parameter.
        #[serde(default = "default_shape")]
        alpha: f64,
        /// Second shape parameter.
        #[serde(default = "default_shape")]
        beta: f64,
    },
    /// Beta(1, beta) quantiles.
    OneSidedBeta {
        /// Second shape parameter.
        #[serde(default = "default_shape")]
        beta: f64,
    },
    /// `theta_i = ((steps - i) / steps)^(1 / alpha)`.
    BetaQuantile {
        /// Concentration of rungs near the prior.
        #[serde(default = "default_shape")]
        alpha: f64,
    },
    /// Logistic curve over the normalised step index.
    Sigmoid {
        /// Steepness of the curve.
        #[serde(default = "default_shape")]
        alpha: f64,
    },
    /// Explicit list consumed in order.
    Fixed {
        /// Tempering values in visiting order.
        values: Vec<f64>,
    },
}

fn default_shape() -> f64 {
    0.5
}

impl Default for PathSchedule {
    fn default() -> Self {
        PathSchedule::Linear
    }
}

impl PathSchedule {
    /// Short name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            PathSchedule::Linear => "linear",
            PathSchedule::Geometric => "geometric",
            PathSchedule::Beta { .. } => "beta",
            PathSchedule::OneSidedBeta { .. } => "one-sided-beta",
            PathSchedule::BetaQuantile { .. } => "beta-quantile",
            PathSchedule::Sigmoid { .. } => "sigmoid",
            PathSchedule::Fixed { .. } => "fixed",
        }
    }

    /// Checks shape parameters and the step count.
    pub fn validate(&self, steps: usize) -> Result<(), BmcError> {
        let shape_ok = |value: f64| value.is_finite() && value > 0.0;
        match self {
            PathSchedule::Fixed { values } => {
                if values.is_empty() {
                    return Err(
                        schedule_error("empty-path", "fixed path needs at least one value").into(),
                    );
                }
                if let Some(bad) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
                    return Err(schedule_error("theta-range", "theta must lie in [0, 1]")
                        .with_context("theta", bad.to_string())
                        .into());
                }
                return Ok(());
            }
            PathSchedule::Beta { alpha, beta } if !(shape_ok(*alpha) && shape_ok(*beta)) => {
                return Err(schedule_error("path-shape", "beta shapes must be positive")
                    .with_context("alpha", alpha.to_string())
                    .with_context("beta", beta.to_string())
                    .into());
            }
            PathSchedule::OneSidedBeta { beta } if !shape_ok(*beta) => {
                return Err(schedule_error("path-shape", "beta shape must be positive")
                    .with_context("beta", beta.to_string())
                    .into());
            }
            PathSchedule::BetaQuantile { alpha } | PathSchedule::Sigmoid { alpha }
                if !shape_ok(*alpha) =>
            {
                return Err(schedule_error("path-shape", "alpha must be positive")
                    .with_context("alpha", alpha.to_string())
                    .into());
            }
            _ => {}
        }
        if steps == 0 {
            return Err(schedule_error("path-steps", "path needs at least one step").into());
        }
        Ok(())
    }

    /// Generates the tempering values for `steps` path steps.
    ///
    /// Non-fixed schemes return `steps + 1` values.
    pub fn thetas(&self, steps: usize) -> Result<Vec<f64>, BmcError> {
        self.validate(steps)?;
        let n = steps as f64;
        let values = match self {
            PathSchedule::Fixed { values } => values.clone(),
            PathSchedule::Linear => (0..=steps).map(|i| 1.0 - i as f64 / n).collect(),
            PathSchedule::Geometric => (0..=steps)
                .map(|i| if i == steps { 0.0 } else { 2f64.powi(-(i as i32)) })
                .collect(),
            PathSchedule::Beta { alpha, beta } => beta_path(steps, *alpha, *beta),
            PathSchedule::OneSidedBeta { beta } => beta_path(steps, 1.0, *beta),
            PathSchedule::BetaQuantile { alpha } => (0..=steps)
                .map(|i| ((steps - i) as f64 / n).powf(1.0 / alpha))
                .collect(),
            PathSchedule::Sigmoid { alpha } => (0..=steps)
                .map(|i| {
                    if i == 0 {
                        1.0
                    } else if i == steps {
                        0.0
                    } else {
                        let x = (steps - i) as f64 / n - 0.5;
                        logistic(2.0 * alpha * x)
                    }
                })
                .collect(),
        };
        Ok(values)
    }
}

fn beta_path(steps: usize, alpha: f64, beta: f64) -> Vec<f64> {
    (0..=steps)
        .map(|i| {
            if i == 0 {
                1.0
            } else if i >= steps.saturating_sub(1) {
                0.0
            } else {
                let ratio = i as f64 / (steps - 1) as f64;
                1.0 - inverse_regularized_incomplete_beta(ratio, alpha, beta)
            }
        })
        .collect()
}

// e^{z/2} / (e^{z/2} + e^{-z/2}) written without overflow.
fn logistic(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

fn schedule_error(code: &str, message: &str) -> ScheduleError {
    ScheduleError(ErrorInfo::new(code, message))
}

struct ScheduleError(ErrorInfo);

impl ScheduleError {
    fn with_context(self, key: &str, value: String) -> Self {
        ScheduleError(self.0.with_context(key, value))
    }
}

impl From<ScheduleError> for BmcError {
    fn from(err: ScheduleError) -> Self {
        BmcError::Schedule(err.0)
    }
}
