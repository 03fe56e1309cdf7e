use std::fs;
use std::path::{Path, PathBuf};

use bmc_core::{BmcError, ErrorInfo};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RunConfig;

/// What a finished run leaves behind in `manifest.json`.
///
/// Paths are relative to the run directory. Enough is recorded to repeat the
/// run or to check that a checkpoint on disk is the one the run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Settings as resolved after CLI overrides.
    pub config: RunConfig,
    /// Seed the stream started from.
    pub master_seed: u64,
    /// `seed_policy.label`, copied through.
    pub seed_label: Option<String>,
    /// Last completed step.
    pub final_step: u64,
    /// Tracked score at `final_step`.
    pub final_log_posterior: f64,
    /// Absent when tracing was off.
    pub trace_file: Option<PathBuf>,
    /// Retained checkpoints, oldest first.
    pub checkpoints: Vec<PathBuf>,
    /// Digest of the newest checkpoint, see [`file_digest`].
    pub final_checkpoint_sha256: Option<String>,
    /// Wall-clock time of writing, RFC 3339.
    pub created_at: String,
}

impl RunManifest {
    /// Pretty JSON, creating parent directories as needed.
    pub fn write(&self, path: &Path) -> Result<(), BmcError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| io_failure("manifest-mkdir", parent, err))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| io_failure("manifest-serialize", path, err))?;
        fs::write(path, json).map_err(|err| io_failure("manifest-write", path, err))
    }

    /// Reads back a file produced by [`RunManifest::write`].
    pub fn load(path: &Path) -> Result<Self, BmcError> {
        let contents =
            fs::read_to_string(path).map_err(|err| io_failure("manifest-read", path, err))?;
        serde_json::from_str(&contents).map_err(|err| io_failure("manifest-parse", path, err))
    }
}

/// Lower-case hex SHA-256 of a file.
pub fn file_digest(path: &Path) -> Result<String, BmcError> {
    let bytes = fs::read(path).map_err(|err| io_failure("digest-read", path, err))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn io_failure(code: &str, path: &Path, err: impl ToString) -> BmcError {
    BmcError::Serde(ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()))
}
