#![deny(missing_docs)]
#![doc = include_str!("../docs/chain-api.md")]

/// Metropolis-Hastings accept/reject decision.
pub mod acceptance;
/// Checkpoint text format, restore and periodic writer.
pub mod checkpoint;
/// Adaptive tuning of operator tunables.
pub mod coercion;
/// YAML run configuration.
pub mod config;
/// Explicit per-run simulation context.
pub mod context;
/// Path-sampling and stepping-stone estimators.
pub mod estimators;
/// Public `run`/`resume` entry points.
pub mod kernel;
/// Tab-separated trace logger.
pub mod logger;
/// Run manifest serialization helpers.
pub mod manifest;
/// Power-posterior orchestration for marginal likelihoods.
pub mod marginal;
/// Immutable chain options.
pub mod options;
/// Tempering path schedules.
pub mod path;
/// Operator analysis table.
pub mod report;
/// Step-by-step chain driver.
pub mod runner;
/// Weighted operator schedule with counters.
pub mod schedule;
/// Gamma and incomplete beta functions.
pub mod special;

pub use acceptance::{AcceptanceCriterion, AcceptanceDecision};
pub use checkpoint::{Checkpoint, CheckpointCodec, CheckpointWriter, RestoredCheckpoint};
pub use coercion::CoercionController;
pub use config::{
    CheckpointConfig, MarginalLikelihoodConfig, OutputConfig, RestoreConfig, RunConfig,
    SeedPolicy,
};
pub use context::SimulationContext;
pub use estimators::{RungSummary, RungTrace};
pub use kernel::{resume, run, run_marginal_likelihood, MarginalLikelihoodSummary, RunSummary};
pub use logger::TraceLogger;
pub use marginal::{MarginalLikelihoodOrchestrator, MarginalLikelihoodRun, RungResult};
pub use options::{ChainOptions, ChainOptionsBuilder};
pub use path::PathSchedule;
pub use report::OperatorAnalysis;
pub use runner::{ChainControl, ChainOutcome, ChainPhase, ChainRunner, Sample, Segment};
pub use schedule::{OperatorSchedule, OperatorStats, OptimizationTransform};
