use bmc_core::RngHandle;

/// Outcome of one Metropolis-Hastings decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceDecision {
    /// Whether the proposal was accepted.
    pub accepted: bool,
    /// Unclamped `(new - old) * temperature + hastings`.
    pub log_ratio: f64,
    /// `min(log_ratio, 0)`, the log acceptance probability fed to coercion.
    pub coerced_log_ratio: f64,
}

/// Metropolis-Hastings acceptance with temperature scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptanceCriterion {
    temperature: f64,
}

impl Default for AcceptanceCriterion {
    fn default() -> Self {
        Self { temperature: 1.0 }
    }
}

impl AcceptanceCriterion {
    /// Creates a criterion scaling score differences by `temperature`.
    pub fn new(temperature: f64) -> Self {
        Self { temperature }
    }

    /// Tempering scalar applied to score differences.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Log acceptance ratio without drawing.
    pub fn log_ratio(&self, old_score: f64, new_score: f64, hastings_ratio: f64) -> f64 {
        (new_score - old_score) * self.temperature + hastings_ratio
    }

    /// Draws exactly one uniform and accepts when `ln(u) < log_ratio`.
    pub fn accept(
        &self,
        old_score: f64,
        new_score: f64,
        hastings_ratio: f64,
        rng: &mut RngHandle,
    ) -> AcceptanceDecision {
        let log_ratio = self.log_ratio(old_score, new_score, hastings_ratio);
        let draw = rng.uniform().ln();
        decide(log_ratio, draw)
    }
}

/// Pure decision given a pre-drawn `ln(u)`.
pub fn decide(log_ratio: f64, log_draw: f64) -> AcceptanceDecision {
    let log_ratio = if log_ratio.is_nan() {
        f64::NEG_INFINITY
    } else {
        log_ratio
    };
    AcceptanceDecision {
        accepted: log_draw < log_ratio,
        log_ratio,
        coerced_log_ratio: log_ratio.min(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_ratio_never_accepts() {
        let decision = decide(f64::NAN, -1e-12);
        assert!(!decision.accepted);
        assert_eq!(decision.coerced_log_ratio, f64::NEG_INFINITY);
    }

    #[test]
    fn temperature_scales_difference_only() {
        let criterion = AcceptanceCriterion::new(0.5);
        assert_eq!(criterion.log_ratio(-10.0, -8.0, 0.25), 1.25);
    }
}
