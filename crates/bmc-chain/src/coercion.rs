use bmc_core::BmcError;
use tracing::info;

use crate::context::SimulationContext;
use crate::options::ChainOptions;
use crate::runner::{ChainOutcome, ChainRunner, Segment};
use crate::schedule::OperatorSchedule;

/// Adaptive tuning of coercible operators during the opening steps of a run.
///
/// During the first `delay` steps every coercible tunable `p` moves by
/// `(exp(min(log_r, 0)) - target) / (T(n) + 1)` after each of its proposals,
/// where `n` is the operator's accept+reject count and `T` the schedule's
/// optimisation transform. When the window closes all modes are switched off
/// and the counters are zeroed so reported acceptance covers only the frozen
/// kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionController {
    delay: u64,
    use_coercion: bool,
    target: f64,
}

impl CoercionController {
    /// Creates a controller with an explicit window.
    pub fn new(delay: u64, use_coercion: bool, target: f64) -> Self {
        Self {
            delay,
            use_coercion,
            target,
        }
    }

    /// Reads the window, the switch and the target from chain options.
    pub fn from_options(options: &ChainOptions) -> Self {
        Self::new(
            options.coercion_delay(),
            options.use_coercion(),
            options.adaptation_target(),
        )
    }

    /// Length of the adaptation window in steps.
    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Whether operators in default mode are tuned.
    pub fn use_coercion(&self) -> bool {
        self.use_coercion
    }

    /// Chain-wide target acceptance probability.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Adaptive steps still owed when the chain resumes at `start_step` with
    /// `remaining` steps left.
    pub fn adaptive_steps(&self, start_step: u64, remaining: u64) -> u64 {
        self.delay.saturating_sub(start_step).min(remaining)
    }

    /// Applies one tuning update to the operator at `index`; returns the new
    /// tunable when it changed.
    pub fn coerce(
        &self,
        schedule: &mut OperatorSchedule,
        index: usize,
        log_ratio: f64,
    ) -> Result<Option<f64>, BmcError> {
        let transform = schedule.transform();
        let entry = schedule.entry_mut(index)?;
        if !entry.is_coercible(self.use_coercion) {
            return Ok(None);
        }
        let Some(current) = entry.operator().tunable() else {
            return Ok(None);
        };
        let denominator = transform.apply(entry.stats().total()) + 1.0;
        let target = entry.operator().target_acceptance().unwrap_or(self.target);
        let updated = current + (log_ratio.min(0.0).exp() - target) / denominator;
        if !updated.is_finite() {
            return Ok(None);
        }
        entry.operator_mut().set_tunable(updated);
        Ok(Some(updated))
    }

    /// Closes the adaptation window.
    pub fn freeze(&self, schedule: &mut OperatorSchedule) {
        schedule.freeze_all();
        schedule.reset_counters();
    }

    /// Runs the chain from its current step to `chain_length`, adapting for
    /// the part of the window that has not run yet.
    pub fn drive(
        &self,
        runner: &mut ChainRunner,
        ctx: &mut SimulationContext,
        chain_length: u64,
    ) -> Result<ChainOutcome, BmcError> {
        let start = runner.current_step();
        let remaining = chain_length.saturating_sub(start);
        let adaptive = self.adaptive_steps(start, remaining);
        if self.delay > 0 && start == self.delay {
            // A checkpoint on the last adaptive step is written before the
            // window closes, so its counters still hold adaptation proposals.
            self.freeze(&mut ctx.schedule);
        } else if self.delay > 0 && start > self.delay {
            ctx.schedule.freeze_all();
        }
        if adaptive > 0 {
            let outcome = runner.run_chain(ctx, adaptive, Segment::adaptive())?;
            if outcome.stopped {
                return Ok(outcome);
            }
            self.freeze(&mut ctx.schedule);
            info!(
                step = runner.current_step(),
                window = self.delay,
                "adaptation window closed; tunables frozen"
            );
        }
        let outcome = runner.run_chain(ctx, remaining - adaptive, Segment::sampling())?;
        Ok(ChainOutcome { start_step: start, ..outcome })
    }
}
