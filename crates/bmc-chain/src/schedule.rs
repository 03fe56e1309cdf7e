use bmc_core::state::check_record_name;
use bmc_core::{BmcError, CoercionMode, ErrorInfo, Operator, RngHandle};
use serde::{Deserialize, Serialize};

/// Accept/reject counters of one operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorStats {
    /// Accepted proposals since the last reset.
    pub accepted: u64,
    /// Rejected (or failed) proposals since the last reset.
    pub rejected: u64,
}

impl OperatorStats {
    /// Accepted plus rejected.
    pub fn total(&self) -> u64 {
        self.accepted + self.rejected
    }

    /// Fraction of accepted proposals, `None` before the first proposal.
    pub fn acceptance_rate(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| self.accepted as f64 / total as f64)
    }
}

/// Maps an operator's operation count to the coercion step denominator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationTransform {
    /// Same as [`OptimizationTransform::Log`].
    #[default]
    Default,
    /// `ln(n)`
    Log,
    /// `sqrt(n)`
    Sqrt,
    /// `n`
    Linear,
}

impl OptimizationTransform {
    /// Applies the transform to an operation count.
    pub fn apply(&self, count: u64) -> f64 {
        let n = count as f64;
        match self {
            OptimizationTransform::Default | OptimizationTransform::Log => n.ln(),
            OptimizationTransform::Sqrt => n.sqrt(),
            OptimizationTransform::Linear => n,
        }
    }
}

/// One weighted schedule entry.
pub struct ScheduledOperator {
    operator: Box<dyn Operator>,
    weight: f64,
    mode: CoercionMode,
    stats: OperatorStats,
}

impl std::fmt::Debug for ScheduledOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledOperator")
            .field("name", &self.operator.name())
            .field("weight", &self.weight)
            .field("mode", &self.mode)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ScheduledOperator {
    /// Operator name.
    pub fn name(&self) -> &str {
        self.operator.name()
    }

    /// Relative selection weight.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Current coercion mode.
    pub fn mode(&self) -> CoercionMode {
        self.mode
    }

    /// Current counters.
    pub fn stats(&self) -> OperatorStats {
        self.stats
    }

    /// Borrow the operator.
    pub fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }

    /// Mutably borrow the operator.
    pub fn operator_mut(&mut self) -> &mut dyn Operator {
        self.operator.as_mut()
    }

    /// Whether the tunable is adjusted when adaptation runs.
    pub fn is_coercible(&self, use_coercion: bool) -> bool {
        self.operator.tunable().is_some()
            && match self.mode {
                CoercionMode::On => true,
                CoercionMode::Default => use_coercion,
                CoercionMode::Off => false,
            }
    }
}

/// Frozen copy of the mutable per-operator fields, used to roll back a
/// failed checkpoint restore.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSnapshot {
    entries: Vec<(OperatorStats, CoercionMode, Option<f64>)>,
}

/// Ordered, weighted set of proposal operators.
#[derive(Debug, Default)]
pub struct OperatorSchedule {
    entries: Vec<ScheduledOperator>,
    total_weight: f64,
    transform: OptimizationTransform,
}

impl OperatorSchedule {
    /// Creates an empty schedule using the default (log) transform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the coercion step transform.
    pub fn with_transform(mut self, transform: OptimizationTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Adds an operator in [`CoercionMode::Default`].
    pub fn add(&mut self, operator: Box<dyn Operator>, weight: f64) -> Result<(), BmcError> {
        self.add_with_mode(operator, weight, CoercionMode::Default)
    }

    /// Adds an operator with an explicit coercion mode.
    pub fn add_with_mode(
        &mut self,
        operator: Box<dyn Operator>,
        weight: f64,
        mode: CoercionMode,
    ) -> Result<(), BmcError> {
        check_record_name("operator", operator.name()).map_err(BmcError::Schedule)?;
        if !(weight.is_finite() && weight > 0.0) {
            return Err(BmcError::Schedule(
                ErrorInfo::new("operator-weight", "operator weight must be positive")
                    .with_context("operator", operator.name())
                    .with_context("weight", weight.to_string()),
            ));
        }
        if self.position(operator.name()).is_some() {
            return Err(BmcError::Schedule(
                ErrorInfo::new("duplicate-operator", "operator names must be unique")
                    .with_context("operator", operator.name()),
            ));
        }
        self.total_weight += weight;
        self.entries.push(ScheduledOperator {
            operator,
            weight,
            mode,
            stats: OperatorStats::default(),
        });
        Ok(())
    }

    /// Number of operators.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the schedule has no operators.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Coercion step transform.
    pub fn transform(&self) -> OptimizationTransform {
        self.transform
    }

    /// Weighted random pick; consumes exactly one uniform draw.
    pub fn next_index(&self, rng: &mut RngHandle) -> Result<usize, BmcError> {
        if self.entries.is_empty() {
            return Err(BmcError::Schedule(ErrorInfo::new(
                "empty-schedule",
                "operator schedule has no operators",
            )));
        }
        let mut target = rng.uniform() * self.total_weight;
        for (idx, entry) in self.entries.iter().enumerate() {
            if target < entry.weight {
                return Ok(idx);
            }
            target -= entry.weight;
        }
        Ok(self.entries.len() - 1)
    }

    /// Entry by schedule index.
    pub fn entry(&self, index: usize) -> Result<&ScheduledOperator, BmcError> {
        self.entries
            .get(index)
            .ok_or_else(|| unknown_index(index))
    }

    /// Mutable entry by schedule index.
    pub fn entry_mut(&mut self, index: usize) -> Result<&mut ScheduledOperator, BmcError> {
        self.entries
            .get_mut(index)
            .ok_or_else(|| unknown_index(index))
    }

    /// Entries in schedule order.
    pub fn entries(&self) -> impl Iterator<Item = &ScheduledOperator> + '_ {
        self.entries.iter()
    }

    /// Schedule index of the operator called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name() == name)
    }

    /// Counts one accepted proposal.
    pub fn record_accept(&mut self, index: usize) -> Result<(), BmcError> {
        self.entry_mut(index)?.stats.accepted += 1;
        Ok(())
    }

    /// Counts one rejected proposal.
    pub fn record_reject(&mut self, index: usize) -> Result<(), BmcError> {
        self.entry_mut(index)?.stats.rejected += 1;
        Ok(())
    }

    /// Overwrites counters, used by checkpoint restore.
    pub fn set_stats(&mut self, index: usize, stats: OperatorStats) -> Result<(), BmcError> {
        self.entry_mut(index)?.stats = stats;
        Ok(())
    }

    /// Changes the coercion mode of one operator.
    pub fn set_mode(&mut self, index: usize, mode: CoercionMode) -> Result<(), BmcError> {
        self.entry_mut(index)?.mode = mode;
        Ok(())
    }

    /// Switches every operator to [`CoercionMode::Off`].
    pub fn freeze_all(&mut self) {
        for entry in &mut self.entries {
            entry.mode = CoercionMode::Off;
        }
    }

    /// Zeroes every accept/reject counter; tunables are left untouched.
    pub fn reset_counters(&mut self) {
        for entry in &mut self.entries {
            entry.stats = OperatorStats::default();
        }
    }

    /// Smallest accept+reject count across operators (0 when empty).
    pub fn minimum_accept_and_reject_count(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.stats.total())
            .min()
            .unwrap_or(0)
    }

    /// Captures counters, modes and tunables.
    pub fn snapshot(&self) -> ScheduleSnapshot {
        ScheduleSnapshot {
            entries: self
                .entries
                .iter()
                .map(|entry| (entry.stats, entry.mode, entry.operator.tunable()))
                .collect(),
        }
    }

    /// Reinstates a snapshot taken from this schedule.
    pub fn restore_snapshot(&mut self, snapshot: &ScheduleSnapshot) {
        for (entry, (stats, mode, tunable)) in self.entries.iter_mut().zip(&snapshot.entries) {
            entry.stats = *stats;
            entry.mode = *mode;
            if let Some(value) = tunable {
                entry.operator.set_tunable(*value);
            }
        }
    }
}

fn unknown_index(index: usize) -> BmcError {
    BmcError::Schedule(
        ErrorInfo::new("operator-index", "operator index out of range")
            .with_context("index", index.to_string()),
    )
}
