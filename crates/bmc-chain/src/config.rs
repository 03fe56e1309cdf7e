use std::fs;
use std::path::{Path, PathBuf};

use bmc_core::{BmcError, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::options::ChainOptions;
use crate::path::PathSchedule;

/// YAML-configurable parameters governing one sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Chain length, drift-check cadence, adaptation and temperature.
    #[serde(default)]
    pub chain: ChainOptions,
    /// Checkpoint writing behaviour.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Checkpoint restore behaviour.
    #[serde(default)]
    pub restore: RestoreConfig,
    /// Master seed policy.
    #[serde(default)]
    pub seed_policy: SeedPolicy,
    /// Sampling interval for loggers.
    #[serde(default = "default_log_every")]
    pub log_every: u64,
    /// Where run artefacts land.
    #[serde(default)]
    pub output: OutputConfig,
    /// Marginal-likelihood path sampling; absent for plain MCMC runs.
    #[serde(default)]
    pub marginal_likelihood: Option<MarginalLikelihoodConfig>,
}

fn default_log_every() -> u64 {
    1000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            chain: ChainOptions::default(),
            checkpoint: CheckpointConfig::default(),
            restore: RestoreConfig::default(),
            seed_policy: SeedPolicy::default(),
            log_every: default_log_every(),
            output: OutputConfig::default(),
            marginal_likelihood: None,
        }
    }
}

impl RunConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(contents: &str) -> Result<Self, BmcError> {
        let config: RunConfig = serde_yaml::from_str(contents).map_err(|err| {
            BmcError::Config(ErrorInfo::new("config-parse", err.to_string()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn load(path: &Path) -> Result<Self, BmcError> {
        let located = |info: ErrorInfo| info.with_context("path", path.display().to_string());
        let contents = fs::read_to_string(path)
            .map_err(|err| BmcError::Config(located(ErrorInfo::new("config-read", err.to_string()))))?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            BmcError::Config(info) => BmcError::Config(located(info)),
            other => other,
        })
    }

    /// Checks cross-field constraints not expressible through serde.
    pub fn validate(&self) -> Result<(), BmcError> {
        self.chain.validate()?;
        if self.log_every == 0 {
            return Err(BmcError::Config(ErrorInfo::new(
                "invalid-log-every",
                "log_every must be positive",
            )));
        }
        if self.checkpoint.max_to_keep == 0 {
            return Err(BmcError::Config(
                ErrorInfo::new("invalid-retention", "max_to_keep must be positive")
                    .with_hint("disable checkpoints with save_every: 0 instead"),
            ));
        }
        if !(self.restore.lnl_tolerance >= 0.0) {
            return Err(BmcError::Config(ErrorInfo::new(
                "invalid-lnl-tolerance",
                "lnl_tolerance must be non-negative",
            )));
        }
        if let Some(ml) = &self.marginal_likelihood {
            ml.validate()?;
        }
        Ok(())
    }
}

/// Checkpoint writing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Interval in steps between checkpoint writes (0 disables periodic writes).
    #[serde(default)]
    pub save_every: u64,
    /// Single step at which a checkpoint is written.
    #[serde(default)]
    pub save_at: Option<u64>,
    /// Directory override; defaults to `<run_directory>/<checkpoint_dir>`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Maximum number of periodic checkpoints to retain.
    #[serde(default = "default_max_to_keep")]
    pub max_to_keep: usize,
    /// Write doubles as `<text>/<hex-bits>`.
    #[serde(default)]
    pub full_precision: bool,
    /// Write a final checkpoint when the chain finishes.
    #[serde(default = "default_save_on_finish")]
    pub save_on_finish: bool,
}

fn default_max_to_keep() -> usize {
    4
}

fn default_save_on_finish() -> bool {
    true
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            save_every: 0,
            save_at: None,
            directory: None,
            max_to_keep: default_max_to_keep(),
            full_precision: false,
            save_on_finish: default_save_on_finish(),
        }
    }
}

impl CheckpointConfig {
    /// Whether a checkpoint is due after `completed` steps.
    pub fn is_due(&self, completed: u64) -> bool {
        (self.save_every > 0 && completed % self.save_every == 0) || self.save_at == Some(completed)
    }
}

/// Checkpoint restore configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreConfig {
    /// Resume even when the recomputed log posterior differs from the saved one.
    #[serde(default)]
    pub force_resume: bool,
    /// Absolute tolerance for the restored log-posterior cross-check.
    #[serde(default)]
    pub lnl_tolerance: f64,
    /// Reseeds the generator instead of restoring the saved stream.
    #[serde(default)]
    pub checkpoint_seed: Option<u64>,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            force_resume: false,
            lnl_tolerance: 0.0,
            checkpoint_seed: None,
        }
    }
}

/// Seed for the chain's random stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPolicy {
    /// Feeds [`bmc_core::RngHandle::from_seed`].
    #[serde(default = "default_seed")]
    pub master_seed: u64,
    /// Optional label recorded in manifests.
    #[serde(default)]
    pub label: Option<String>,
}

fn default_seed() -> u64 {
    0x05EE_D5EE_DD15_5EED_u64
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self {
            master_seed: default_seed(),
            label: None,
        }
    }
}

/// File names under the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for run artefacts. Nothing is written when absent.
    #[serde(default)]
    pub run_directory: Option<PathBuf>,
    /// Trace filename relative to `run_directory`.
    #[serde(default = "default_trace_name")]
    pub trace_file: PathBuf,
    /// Operator analysis filename relative to `run_directory`.
    #[serde(default = "default_operator_table_name")]
    pub operator_analysis_file: Option<PathBuf>,
    /// JSON run record.
    #[serde(default = "default_manifest_name")]
    pub manifest_file: PathBuf,
    /// Checkpoint subdirectory, unless `checkpoint.directory` overrides it.
    #[serde(default = "default_checkpoint_subdir")]
    pub checkpoint_dir: PathBuf,
}

fn default_trace_name() -> PathBuf {
    PathBuf::from("trace.log")
}

fn default_operator_table_name() -> Option<PathBuf> {
    Some(PathBuf::from("operators.txt"))
}

fn default_manifest_name() -> PathBuf {
    PathBuf::from("manifest.json")
}

fn default_checkpoint_subdir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_directory: None,
            trace_file: default_trace_name(),
            operator_analysis_file: default_operator_table_name(),
            manifest_file: default_manifest_name(),
            checkpoint_dir: default_checkpoint_subdir(),
        }
    }
}

impl OutputConfig {
    /// Resolves the checkpoint directory, honouring the checkpoint override.
    pub fn checkpoint_directory(&self, checkpoint: &CheckpointConfig) -> Option<PathBuf> {
        match (&checkpoint.directory, &self.run_directory) {
            (Some(dir), _) => Some(dir.clone()),
            (None, Some(run)) => Some(run.join(&self.checkpoint_dir)),
            (None, None) => None,
        }
    }
}

/// Path-sampling run settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalLikelihoodConfig {
    /// Tempering path.
    #[serde(default)]
    pub path: PathSchedule,
    /// Number of path steps; the path visits `path_steps + 1` values of theta.
    #[serde(default = "default_path_steps")]
    pub path_steps: usize,
    /// Sampling steps per rung.
    pub chain_length: u64,
    /// Burn-in per rung; 10% of `chain_length` when omitted.
    #[serde(default)]
    pub burnin: Option<u64>,
    /// Equilibration steps at theta = 1 before the first rung.
    #[serde(default)]
    pub pre_run: u64,
    /// Log every N steps within a rung.
    #[serde(default = "default_rung_log_every")]
    pub log_every: u64,
}

fn default_path_steps() -> usize {
    100
}

fn default_rung_log_every() -> u64 {
    1000
}

impl MarginalLikelihoodConfig {
    /// Burn-in actually applied to each rung.
    pub fn burnin(&self) -> u64 {
        self.burnin.unwrap_or(self.chain_length / 10)
    }

    /// Checks ranges and the path parameters.
    pub fn validate(&self) -> Result<(), BmcError> {
        if self.chain_length == 0 {
            return Err(BmcError::Config(ErrorInfo::new(
                "invalid-chain-length",
                "marginal likelihood chain length must be positive",
            )));
        }
        if self.log_every == 0 {
            return Err(BmcError::Config(ErrorInfo::new(
                "invalid-log-every",
                "marginal likelihood log_every must be positive",
            )));
        }
        self.path.validate(self.path_steps)
    }
}
