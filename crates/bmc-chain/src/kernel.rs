use std::path::{Path, PathBuf};

use bmc_core::{BmcError, ErrorInfo, Score};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkpoint::{CheckpointCodec, CheckpointWriter};
use crate::config::RunConfig;
use crate::context::SimulationContext;
use crate::logger::TraceLogger;
use crate::manifest::{self, RunManifest};
use crate::marginal::{MarginalLikelihoodOrchestrator, MarginalLikelihoodRun};
use crate::report::OperatorAnalysis;
use crate::runner::{ChainRunner, Sample};

/// Outcome of [`run`] or [`resume`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Step the chain started from (non-zero after a resume).
    pub start_step: u64,
    /// Step the chain ended at.
    pub final_step: u64,
    /// Whether a stop request ended the run early.
    pub stopped: bool,
    /// Tracked score at the final step.
    pub final_score: Score,
    /// Log posterior at step zero, when the run started there.
    pub initial_log_posterior: Option<f64>,
    /// Highest log posterior seen.
    pub best_log_posterior: f64,
    /// Operator performance after the adaptation window.
    pub operators: OperatorAnalysis,
    /// Trace file written during the run.
    pub trace_path: Option<PathBuf>,
    /// Set when a run directory was configured.
    pub manifest_path: Option<PathBuf>,
    /// Checkpoint files retained at the end of the run.
    pub checkpoints: Vec<PathBuf>,
    /// Samples taken at the logging interval.
    pub samples: Vec<Sample>,
}

/// Result of a marginal-likelihood run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalLikelihoodSummary {
    /// Per-rung traces and statistics.
    pub run: MarginalLikelihoodRun,
    /// Thermodynamic-integration estimate, when at least two rungs survived.
    pub path_sampling: Option<f64>,
    /// Stepping-stone estimate, when at least two rungs survived.
    pub stepping_stone: Option<f64>,
}

/// Builds a runner with the loggers and checkpoint writer `config` asks for.
///
/// `resume_step` makes the trace logger continue an existing file from that
/// step.
pub fn prepare_runner(config: &RunConfig, resume_step: Option<u64>) -> Result<ChainRunner, BmcError> {
    config.validate()?;
    let mut runner = ChainRunner::new(config.chain.clone()).with_log_every(config.log_every);
    if let Some(run_dir) = &config.output.run_directory {
        let trace = TraceLogger::new(run_dir.join(&config.output.trace_file)).resuming_at(resume_step);
        runner.add_logger(Box::new(trace));
    }
    if let Some(directory) = config.output.checkpoint_directory(&config.checkpoint) {
        runner.set_checkpoint_writer(CheckpointWriter::new(config.checkpoint.clone(), directory));
    }
    Ok(runner)
}

/// Runs the chain from step zero.
pub fn run(config: &RunConfig, ctx: &mut SimulationContext) -> Result<RunSummary, BmcError> {
    let runner = prepare_runner(config, None)?;
    run_prepared(config, ctx, runner)
}

/// Restores `checkpoint` into `ctx` and runs the remaining steps.
pub fn resume(
    config: &RunConfig,
    ctx: &mut SimulationContext,
    checkpoint: &Path,
) -> Result<RunSummary, BmcError> {
    config.validate()?;
    let codec = CheckpointCodec::new(config.checkpoint.full_precision);
    let restored = codec.read_file(ctx, checkpoint, &config.restore)?;
    info!(
        step = restored.step,
        log_posterior = restored.score.log_posterior,
        path = %checkpoint.display(),
        "resuming from checkpoint"
    );
    let mut runner = prepare_runner(config, Some(restored.step))?;
    runner.set_current_step(restored.step);
    run_prepared(config, ctx, runner)
}

/// Drives an already prepared runner through the configured chain length.
pub fn run_prepared(
    config: &RunConfig,
    ctx: &mut SimulationContext,
    mut runner: ChainRunner,
) -> Result<RunSummary, BmcError> {
    let start_step = runner.current_step();
    let outcome = runner.run(ctx)?;
    let operators = OperatorAnalysis::from_schedule(&ctx.schedule);
    info!(step = outcome.end_step, "operator analysis\n{operators}");

    let checkpoints = runner.checkpoint_paths().to_vec();
    let mut trace_path = None;
    let mut manifest_path = None;
    if let Some(run_dir) = &config.output.run_directory {
        if let Some(file) = &config.output.operator_analysis_file {
            operators.write_to(&run_dir.join(file))?;
        }
        trace_path = Some(run_dir.join(&config.output.trace_file));
        let path = run_dir.join(&config.output.manifest_file);
        write_manifest(config, run_dir, &path, &outcome.score, outcome.end_step, &checkpoints)?;
        manifest_path = Some(path);
    }

    Ok(RunSummary {
        start_step,
        final_step: outcome.end_step,
        stopped: outcome.stopped,
        final_score: outcome.score,
        initial_log_posterior: runner.initial_score(),
        best_log_posterior: runner.best_score(),
        operators,
        trace_path,
        manifest_path,
        checkpoints,
        samples: runner.take_samples(),
    })
}

/// Runs the tempering path configured under `marginal_likelihood`.
pub fn run_marginal_likelihood(
    config: &RunConfig,
    ctx: &mut SimulationContext,
) -> Result<MarginalLikelihoodSummary, BmcError> {
    let runner = prepare_runner(config, None)?;
    run_marginal_likelihood_prepared(config, ctx, runner)
}

/// Path sampling with an already prepared runner.
pub fn run_marginal_likelihood_prepared(
    config: &RunConfig,
    ctx: &mut SimulationContext,
    runner: ChainRunner,
) -> Result<MarginalLikelihoodSummary, BmcError> {
    let Some(ml) = &config.marginal_likelihood else {
        return Err(BmcError::Config(
            ErrorInfo::new(
                "missing-marginal-likelihood",
                "configuration has no marginal_likelihood section",
            )
            .with_hint("add a marginal_likelihood block with at least chain_length"),
        ));
    };
    let report_file = match (&config.output.run_directory, &config.output.operator_analysis_file) {
        (Some(run_dir), Some(file)) => Some(run_dir.join(file)),
        _ => None,
    };
    let mut runner = runner.with_log_every(ml.log_every);
    let orchestrator = MarginalLikelihoodOrchestrator::new(ml)?.with_report_file(report_file);
    let run = orchestrator.run(&mut runner, ctx)?;
    if run.abandoned() > 0 {
        warn!(abandoned = run.abandoned(), "some rungs were abandoned");
    }

    let path_sampling = estimate("path sampling", run.path_sampling_estimate());
    let stepping_stone = estimate("stepping stone", run.stepping_stone_estimate());
    if let Some(value) = path_sampling {
        info!(log_marginal_likelihood = value, "path sampling estimate");
    }
    if let Some(value) = stepping_stone {
        info!(log_marginal_likelihood = value, "stepping stone estimate");
    }
    Ok(MarginalLikelihoodSummary {
        run,
        path_sampling,
        stepping_stone,
    })
}

fn estimate(method: &str, result: Result<f64, BmcError>) -> Option<f64> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(method, error = %err, "marginal likelihood estimate unavailable");
            None
        }
    }
}

fn write_manifest(
    config: &RunConfig,
    run_dir: &Path,
    path: &Path,
    score: &Score,
    final_step: u64,
    checkpoints: &[PathBuf],
) -> Result<(), BmcError> {
    let final_checkpoint_sha256 = match checkpoints.last() {
        Some(last) => Some(manifest::file_digest(last)?),
        None => None,
    };
    let relative = |path: &PathBuf| {
        path.strip_prefix(run_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone())
    };
    let manifest = RunManifest {
        config: config.clone(),
        master_seed: config.seed_policy.master_seed,
        seed_label: config.seed_policy.label.clone(),
        final_step,
        final_log_posterior: score.log_posterior,
        trace_file: Some(config.output.trace_file.clone()),
        checkpoints: checkpoints.iter().map(relative).collect(),
        final_checkpoint_sha256,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    manifest.write(path)
}
