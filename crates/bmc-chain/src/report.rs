use std::fmt;
use std::fs;
use std::path::Path;

use bmc_core::{BmcError, CoercionMode, ErrorInfo};
use serde::{Deserialize, Serialize};

use crate::schedule::OperatorSchedule;

/// One row of the operator analysis table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorRow {
    /// Operator name.
    pub name: String,
    /// Tunable value at report time.
    pub tunable: Option<f64>,
    /// Coercion mode at report time.
    pub mode: CoercionMode,
    /// Accepted proposals.
    pub accepted: u64,
    /// Rejected proposals.
    pub rejected: u64,
    /// `accepted / (accepted + rejected)`.
    pub acceptance_rate: Option<f64>,
}

/// Snapshot of per-operator performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorAnalysis {
    /// Rows in schedule order.
    pub rows: Vec<OperatorRow>,
}

impl OperatorAnalysis {
    /// Reads counters, modes and tunables from `schedule`.
    pub fn from_schedule(schedule: &OperatorSchedule) -> Self {
        let rows = schedule
            .entries()
            .map(|entry| {
                let stats = entry.stats();
                OperatorRow {
                    name: entry.name().to_string(),
                    tunable: entry.operator().tunable(),
                    mode: entry.mode(),
                    accepted: stats.accepted,
                    rejected: stats.rejected,
                    acceptance_rate: stats.acceptance_rate(),
                }
            })
            .collect();
        Self { rows }
    }

    /// Writes the rendered table to `path`.
    pub fn write_to(&self, path: &Path) -> Result<(), BmcError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BmcError::Serde(
                    ErrorInfo::new("report-mkdir", err.to_string())
                        .with_context("path", parent.display().to_string()),
                )
            })?;
        }
        fs::write(path, self.to_string()).map_err(|err| {
            BmcError::Serde(
                ErrorInfo::new("report-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })
    }
}

impl fmt::Display for OperatorAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .rows
            .iter()
            .map(|row| row.name.len())
            .max()
            .unwrap_or(0)
            .max("Operator".len());
        writeln!(
            f,
            "{:<width$}  {:>12}  {:>7}  {:>10}  {:>10}  {:>8}",
            "Operator", "Tuning", "Mode", "Accepted", "Rejected", "Pr(acc)"
        )?;
        for row in &self.rows {
            let tunable = row
                .tunable
                .map(|value| format!("{value:.6}"))
                .unwrap_or_else(|| "-".to_string());
            let mode = match row.mode {
                CoercionMode::Default => "default",
                CoercionMode::On => "on",
                CoercionMode::Off => "off",
            };
            let rate = row
                .acceptance_rate
                .map(|value| format!("{value:.4}"))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<width$}  {:>12}  {:>7}  {:>10}  {:>10}  {:>8}",
                row.name, tunable, mode, row.accepted, row.rejected, rate
            )?;
        }
        Ok(())
    }
}
