use bmc_core::{BmcError, ErrorInfo};
use serde::{Deserialize, Serialize};

/// Log-likelihood trace collected at one tempering value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RungTrace {
    /// Tempering value of the rung.
    pub theta: f64,
    /// Untempered log-likelihood samples taken after burn-in.
    pub log_likelihoods: Vec<f64>,
}

/// Summary statistics of a rung trace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RungSummary {
    /// Tempering value of the rung.
    pub theta: f64,
    /// Number of samples.
    pub samples: usize,
    /// Mean log likelihood.
    pub mean: f64,
    /// Sample variance of the log likelihood.
    pub variance: f64,
}

impl RungTrace {
    /// Computes mean and variance; rejects empty or non-finite traces.
    pub fn analyse(&self) -> Result<RungSummary, BmcError> {
        if self.log_likelihoods.is_empty() {
            return Err(BmcError::Schedule(
                ErrorInfo::new("empty-trace", "rung produced no samples")
                    .with_context("theta", self.theta.to_string()),
            ));
        }
        if let Some(bad) = self.log_likelihoods.iter().find(|v| !v.is_finite()) {
            return Err(BmcError::Schedule(
                ErrorInfo::new("non-finite-trace", "rung trace contains a non-finite value")
                    .with_context("theta", self.theta.to_string())
                    .with_context("value", bad.to_string()),
            ));
        }
        let n = self.log_likelihoods.len() as f64;
        let mean = self.log_likelihoods.iter().sum::<f64>() / n;
        let variance = if self.log_likelihoods.len() > 1 {
            self.log_likelihoods
                .iter()
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0)
        } else {
            0.0
        };
        Ok(RungSummary {
            theta: self.theta,
            samples: self.log_likelihoods.len(),
            mean,
            variance,
        })
    }
}

/// Thermodynamic integration: trapezoid rule over mean log likelihood in theta.
pub fn path_sampling(rungs: &[RungSummary]) -> Result<f64, BmcError> {
    let ordered = ordered_by_theta(rungs.iter().map(|r| (r.theta, r)).collect())?;
    let estimate = ordered
        .windows(2)
        .map(|pair| (pair[1].theta - pair[0].theta) * 0.5 * (pair[1].mean + pair[0].mean))
        .sum();
    Ok(estimate)
}

/// Stepping-stone estimate from traces ordered by increasing theta.
///
/// Each ratio `r_k` uses the samples of the lower rung:
/// `log r_k = dβ·max + ln(mean(exp(dβ·(ℓ - max))))`.
pub fn stepping_stone(traces: &[RungTrace]) -> Result<f64, BmcError> {
    let ordered = ordered_by_theta(traces.iter().map(|t| (t.theta, t)).collect())?;
    let mut estimate = 0.0;
    for pair in ordered.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        lower.analyse()?;
        let delta = upper.theta - lower.theta;
        let max = lower
            .log_likelihoods
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let n = lower.log_likelihoods.len() as f64;
        let mean = lower
            .log_likelihoods
            .iter()
            .map(|ll| (delta * (ll - max)).exp())
            .sum::<f64>()
            / n;
        estimate += delta * max + mean.ln();
    }
    Ok(estimate)
}

fn ordered_by_theta<T>(mut items: Vec<(f64, &T)>) -> Result<Vec<&T>, BmcError> {
    if items.len() < 2 {
        return Err(BmcError::Schedule(
            ErrorInfo::new("too-few-rungs", "an estimate needs at least two rungs")
                .with_context("rungs", items.len().to_string()),
        ));
    }
    items.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(items.into_iter().map(|(_, item)| item).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_likelihood_integrates_exactly() {
        let rungs: Vec<RungSummary> = [1.0, 0.5, 0.0]
            .iter()
            .map(|&theta| RungSummary {
                theta,
                samples: 10,
                mean: -4.0,
                variance: 0.0,
            })
            .collect();
        assert!((path_sampling(&rungs).unwrap() + 4.0).abs() < 1e-12);

        let traces: Vec<RungTrace> = [1.0, 0.5, 0.0]
            .iter()
            .map(|&theta| RungTrace {
                theta,
                log_likelihoods: vec![-4.0; 10],
            })
            .collect();
        assert!((stepping_stone(&traces).unwrap() + 4.0).abs() < 1e-12);
    }

    #[test]
    fn empty_trace_is_rejected() {
        let trace = RungTrace {
            theta: 0.3,
            log_likelihoods: Vec::new(),
        };
        assert_eq!(trace.analyse().unwrap_err().code(), "empty-trace");
    }
}
