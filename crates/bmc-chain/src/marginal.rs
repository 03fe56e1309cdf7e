use std::path::PathBuf;

use bmc_core::BmcError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::MarginalLikelihoodConfig;
use crate::context::SimulationContext;
use crate::estimators::{self, RungSummary, RungTrace};
use crate::path::PathSchedule;
use crate::report::OperatorAnalysis;
use crate::runner::{ChainRunner, Segment};

/// Outcome of one tempering level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RungResult {
    /// Position on the path, starting at zero.
    pub index: usize,
    /// Tempering value applied to the likelihood.
    pub theta: f64,
    /// Burn-in steps run before sampling.
    pub burnin: u64,
    /// Sampling steps run after burn-in.
    pub chain_length: u64,
    /// Untempered log likelihoods logged during sampling.
    pub trace: RungTrace,
    /// Whether burn-in and sampling both ran to their full length.
    pub complete: bool,
    /// Trace statistics; `None` when the rung was abandoned.
    pub summary: Option<RungSummary>,
    /// Operator performance over the rung, read before the counters reset.
    pub operators: OperatorAnalysis,
}

/// Everything a path-sampling run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalLikelihoodRun {
    /// Path scheme name.
    pub scheme: String,
    /// Rungs in the order they ran.
    pub rungs: Vec<RungResult>,
    /// Whether a stop request ended the run early.
    pub stopped: bool,
}

impl MarginalLikelihoodRun {
    /// Traces of every rung that was not abandoned.
    pub fn traces(&self) -> Vec<RungTrace> {
        self.rungs
            .iter()
            .filter(|rung| rung.summary.is_some())
            .map(|rung| rung.trace.clone())
            .collect()
    }

    /// Summaries of every rung that was not abandoned.
    pub fn summaries(&self) -> Vec<RungSummary> {
        self.rungs.iter().filter_map(|rung| rung.summary).collect()
    }

    /// Number of rungs left out of the estimates: cut short by a stop
    /// request, or with a trace that could not be analysed.
    pub fn abandoned(&self) -> usize {
        self.rungs.iter().filter(|rung| rung.summary.is_none()).count()
    }

    /// Thermodynamic-integration estimate of the log marginal likelihood.
    pub fn path_sampling_estimate(&self) -> Result<f64, BmcError> {
        estimators::path_sampling(&self.summaries())
    }

    /// Stepping-stone estimate of the log marginal likelihood.
    pub fn stepping_stone_estimate(&self) -> Result<f64, BmcError> {
        estimators::stepping_stone(&self.traces())
    }
}

/// Runs a chain through a sequence of power posteriors.
///
/// Every rung sets the tempering parameter, burns in without logging (with
/// coercion for operators that allow it), samples with logging, and then
/// zeroes the operator counters. Tunables carry over from rung to rung.
#[derive(Debug, Clone)]
pub struct MarginalLikelihoodOrchestrator {
    path: PathSchedule,
    path_steps: usize,
    chain_length: u64,
    burnin: u64,
    pre_run: u64,
    report_file: Option<PathBuf>,
}

impl MarginalLikelihoodOrchestrator {
    /// Builds an orchestrator from validated configuration.
    pub fn new(config: &MarginalLikelihoodConfig) -> Result<Self, BmcError> {
        config.validate()?;
        Ok(Self {
            path: config.path.clone(),
            path_steps: config.path_steps,
            chain_length: config.chain_length,
            burnin: config.burnin(),
            pre_run: config.pre_run,
            report_file: None,
        })
    }

    /// Also writes the operator table of the final rung to `path`.
    pub fn with_report_file(mut self, path: Option<PathBuf>) -> Self {
        self.report_file = path;
        self
    }

    /// Tempering values in visiting order.
    pub fn thetas(&self) -> Result<Vec<f64>, BmcError> {
        self.path.thetas(self.path_steps)
    }

    /// Runs every rung and terminates the runner.
    pub fn run(
        &self,
        runner: &mut ChainRunner,
        ctx: &mut SimulationContext,
    ) -> Result<MarginalLikelihoodRun, BmcError> {
        let result = self.run_rungs(runner, ctx);
        let terminated = runner.terminate(ctx);
        let run = result?;
        terminated?;
        if let (Some(path), Some(last)) = (&self.report_file, run.rungs.last()) {
            last.operators.write_to(path)?;
        }
        Ok(run)
    }

    fn run_rungs(
        &self,
        runner: &mut ChainRunner,
        ctx: &mut SimulationContext,
    ) -> Result<MarginalLikelihoodRun, BmcError> {
        let thetas = self.thetas()?;
        let mut run = MarginalLikelihoodRun {
            scheme: self.path.name().to_string(),
            rungs: Vec::with_capacity(thetas.len()),
            stopped: false,
        };

        if self.pre_run > 0 {
            info!(steps = self.pre_run, "pre-run at theta = 1");
            ctx.objective.set_tempering_parameter(1.0);
            let outcome = runner.run_chain(ctx, self.pre_run, Segment::burn_in())?;
            runner.take_samples();
            if outcome.stopped {
                run.stopped = true;
                return Ok(run);
            }
        }

        let last = thetas.len().saturating_sub(1);
        for (index, &theta) in thetas.iter().enumerate() {
            info!(
                theta,
                "theta ({}/{}) for {} iterations + {} burn-in",
                index,
                last,
                self.chain_length,
                self.burnin
            );
            ctx.objective.set_tempering_parameter(theta);

            let burn = runner.run_chain(ctx, self.burnin, Segment::burn_in())?;
            let stopped = burn.stopped
                || runner
                    .run_chain(ctx, self.chain_length, Segment::sampling())?
                    .stopped;

            let trace = RungTrace {
                theta,
                log_likelihoods: runner
                    .take_samples()
                    .into_iter()
                    .map(|sample| sample.score.log_likelihood)
                    .collect(),
            };
            let operators = OperatorAnalysis::from_schedule(&ctx.schedule);
            info!(theta, "operator analysis\n{operators}");
            ctx.schedule.reset_counters();

            let summary = match trace.analyse() {
                _ if stopped => {
                    warn!(
                        theta,
                        samples = trace.log_likelihoods.len(),
                        "rung cut short by a stop request; abandoning rung"
                    );
                    None
                }
                Ok(summary) => Some(summary),
                Err(err) => {
                    warn!(theta, error = %err, "rung trace analysis failed; abandoning rung");
                    None
                }
            };
            run.rungs.push(RungResult {
                index,
                theta,
                burnin: self.burnin,
                chain_length: self.chain_length,
                trace,
                complete: !stopped,
                summary,
                operators,
            });

            if stopped {
                run.stopped = true;
                break;
            }
        }
        Ok(run)
    }
}
