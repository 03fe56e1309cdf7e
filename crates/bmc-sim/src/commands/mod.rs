//! Subcommand implementations.

pub mod inspect;
pub mod mcmc;
pub mod mle;

use std::error::Error;
use std::fs;
use std::path::Path;

use bmc_chain::RunConfig;

use crate::model::ModelConfig;

/// Loads the run configuration and applies command-line overrides.
pub fn load_run_config(
    path: &Path,
    out: Option<&Path>,
    seed: Option<u64>,
) -> Result<RunConfig, Box<dyn Error>> {
    let mut config = RunConfig::load(path)?;
    if let Some(out) = out {
        fs::create_dir_all(out)?;
        config.output.run_directory = Some(out.to_path_buf());
    }
    if let Some(seed) = seed {
        config.seed_policy.master_seed = seed;
    }
    Ok(config)
}

/// Loads a model file, or the built-in demo model when `path` is `None`.
pub fn load_model(path: Option<&Path>) -> Result<ModelConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => ModelConfig::load(path)?,
        None => ModelConfig::default(),
    })
}

/// Pretty-prints `value` as JSON to `path`.
pub fn write_json<P: AsRef<Path>, T: serde::Serialize>(
    path: P,
    value: &T,
) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
