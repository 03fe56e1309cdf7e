#![allow(dead_code)]

use bmc_chain::{ChainOptions, OperatorSchedule, SimulationContext};
use bmc_core::{
    BmcError, Density, Objective, Operator, Parameter, PowerPosterior, RngHandle, Score,
    SimulationState, TreeGraph, TreeNode,
};

/// Independent normal likelihood around 1 with a wide normal prior, over every
/// parameter component.
#[derive(Debug, Clone, Copy)]
pub struct Normals;

impl Density for Normals {
    fn log_prior(&self, state: &SimulationState) -> Result<f64, BmcError> {
        Ok(state
            .parameters()
            .flat_map(|p| p.values().iter())
            .map(|v| -0.5 * v * v / 100.0)
            .sum())
    }

    fn log_likelihood(&self, state: &SimulationState) -> Result<f64, BmcError> {
        Ok(state
            .parameters()
            .flat_map(|p| p.values().iter())
            .map(|v| -0.5 * (v - 1.0) * (v - 1.0))
            .sum())
    }
}

/// Uniform random walk on one parameter component with a log-scale tunable.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    name: String,
    parameter: String,
    index: usize,
    log_window: f64,
}

impl RandomWalk {
    pub fn new(parameter: &str, index: usize, window: f64) -> Self {
        Self {
            name: format!("walk-{parameter}-{index}"),
            parameter: parameter.to_string(),
            index,
            log_window: window.ln(),
        }
    }
}

impl Operator for RandomWalk {
    fn name(&self) -> &str {
        &self.name
    }

    fn propose(&mut self, state: &mut SimulationState, rng: &mut RngHandle) -> Result<f64, BmcError> {
        let window = self.log_window.exp();
        let parameter = state.parameter_mut(&self.parameter)?;
        let value = parameter.value(self.index)?;
        parameter.set_value(self.index, value + (rng.uniform() - 0.5) * 2.0 * window)?;
        Ok(0.0)
    }

    fn tunable(&self) -> Option<f64> {
        Some(self.log_window)
    }

    fn set_tunable(&mut self, value: f64) {
        self.log_window = value;
    }
}

/// Operator without a tunable that always refuses its move.
#[derive(Debug, Clone)]
pub struct Refusing;

impl Operator for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }

    fn propose(&mut self, _state: &mut SimulationState, _rng: &mut RngHandle) -> Result<f64, BmcError> {
        Err(BmcError::operator_failed("refusing", "no valid move"))
    }
}

/// Wraps an objective and shifts incremental evaluations by `offset` once
/// more than `fault_after` of them have run. Full evaluations stay exact.
pub struct DriftingObjective<O> {
    inner: O,
    dirty: bool,
    incremental: u64,
    fault_after: u64,
    offset: f64,
}

impl<O: Objective> DriftingObjective<O> {
    pub fn new(inner: O, fault_after: u64, offset: f64) -> Self {
        Self {
            inner,
            dirty: true,
            incremental: 0,
            fault_after,
            offset,
        }
    }
}

impl<O: Objective> Objective for DriftingObjective<O> {
    fn evaluate(&mut self, state: &SimulationState) -> Result<Score, BmcError> {
        let mut score = self.inner.evaluate(state)?;
        if self.dirty {
            self.dirty = false;
            return Ok(score);
        }
        self.incremental += 1;
        if self.incremental > self.fault_after {
            score.log_posterior += self.offset;
        }
        Ok(score)
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.inner.mark_dirty();
    }

    fn set_tempering_parameter(&mut self, theta: f64) {
        self.inner.set_tempering_parameter(theta);
    }

    fn tempering_parameter(&self) -> f64 {
        self.inner.tempering_parameter()
    }
}

pub fn scalar_state() -> SimulationState {
    let mut state = SimulationState::new();
    state.add_parameter(Parameter::scalar("mu", 0.0)).unwrap();
    state.add_parameter(Parameter::scalar("kappa", 2.0)).unwrap();
    state.add_parameter(Parameter::new("rates", vec![0.5, 1.5])).unwrap();
    state
}

pub fn three_walk_schedule() -> OperatorSchedule {
    let mut schedule = OperatorSchedule::new();
    schedule.add(Box::new(RandomWalk::new("mu", 0, 0.8)), 1.0).unwrap();
    schedule.add(Box::new(RandomWalk::new("kappa", 0, 0.8)), 1.0).unwrap();
    schedule.add(Box::new(RandomWalk::new("rates", 1, 0.8)), 2.0).unwrap();
    schedule
}

pub fn scalar_context(seed: u64) -> SimulationContext {
    SimulationContext::new(
        scalar_state(),
        Box::new(PowerPosterior::new(Normals)),
        three_walk_schedule(),
        RngHandle::from_seed(seed),
    )
}

/// ((a, b), c) with an edge trait column.
pub fn rated_tree() -> TreeGraph {
    TreeGraph::new(
        "species",
        vec![
            TreeNode::leaf(0.0, "a"),
            TreeNode::leaf(0.0, "b"),
            TreeNode::leaf(0.0, "c"),
            TreeNode::internal(1.0),
            TreeNode::internal(2.5),
        ],
        vec![Some(3), Some(3), Some(4), Some(4), None],
    )
    .unwrap()
    .with_traits(
        vec!["rate".to_string()],
        vec![vec![1.0], vec![1.1], vec![0.9], vec![1.2], vec![1.0]],
    )
    .unwrap()
}

/// (x, y) without traits.
pub fn cherry_tree() -> TreeGraph {
    TreeGraph::new(
        "gene",
        vec![
            TreeNode::leaf(0.0, "x"),
            TreeNode::leaf(0.5, "y"),
            TreeNode::internal(3.0),
        ],
        vec![Some(2), Some(2), None],
    )
    .unwrap()
}

/// Five parameters, two trees and four operators.
pub fn rich_context(seed: u64) -> SimulationContext {
    let mut state = SimulationState::new();
    state.add_parameter(Parameter::scalar("mu", 0.1)).unwrap();
    state
        .add_parameter(Parameter::scalar("sigma", 1.0).with_bounds(Some(0.0), None))
        .unwrap();
    state.add_parameter(Parameter::new("rates", vec![0.2, 0.4, 0.6])).unwrap();
    state.add_parameter(Parameter::scalar("kappa", 2.0)).unwrap();
    state
        .add_parameter(Parameter::new("freqs", vec![0.25, 0.25, 0.25, 0.25]))
        .unwrap();
    state.add_tree(rated_tree()).unwrap();
    state.add_tree(cherry_tree()).unwrap();

    let mut schedule = OperatorSchedule::new();
    schedule.add(Box::new(RandomWalk::new("mu", 0, 0.5)), 1.0).unwrap();
    schedule.add(Box::new(RandomWalk::new("sigma", 0, 0.3)), 1.0).unwrap();
    schedule.add(Box::new(RandomWalk::new("rates", 2, 0.2)), 1.0).unwrap();
    schedule.add(Box::new(Refusing), 0.5).unwrap();

    SimulationContext::new(
        state,
        Box::new(PowerPosterior::new(Normals)),
        schedule,
        RngHandle::from_seed(seed),
    )
}

pub fn options(chain_length: u64) -> ChainOptions {
    ChainOptions::builder(chain_length)
        .full_evaluation_count(100)
        .build()
        .unwrap()
}
