use bmc_core::{BmcError, Objective, RngHandle, Score, SimulationState};

use crate::schedule::OperatorSchedule;

/// Everything one simulation run owns: the model graph, its objective, the
/// operator schedule and the random stream.
///
/// The runner, the checkpoint codec and the path-sampling orchestrator all
/// operate on a context passed in explicitly; nothing is registered globally.
pub struct SimulationContext {
    /// Parameters and trees being sampled.
    pub state: SimulationState,
    /// Prior times (tempered) likelihood.
    pub objective: Box<dyn Objective>,
    /// Weighted proposal operators and their counters.
    pub schedule: OperatorSchedule,
    /// Random stream shared by selection, proposals and acceptance.
    pub rng: RngHandle,
}

impl SimulationContext {
    /// Bundles the pieces of one run.
    pub fn new(
        state: SimulationState,
        objective: Box<dyn Objective>,
        schedule: OperatorSchedule,
        rng: RngHandle,
    ) -> Self {
        Self {
            state,
            objective,
            schedule,
            rng,
        }
    }

    /// Evaluates the objective, possibly from cached partial results.
    pub fn evaluate(&mut self) -> Result<Score, BmcError> {
        self.objective.evaluate(&self.state)
    }

    /// Invalidates every cache and evaluates from scratch.
    pub fn evaluate_full(&mut self) -> Result<Score, BmcError> {
        self.objective.mark_dirty();
        self.objective.evaluate(&self.state)
    }
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("state", &self.state)
            .field("schedule", &self.schedule)
            .field("theta", &self.objective.tempering_parameter())
            .finish()
    }
}
