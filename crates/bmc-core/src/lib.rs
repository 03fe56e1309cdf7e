#![deny(missing_docs)]
#![doc = "Core data model and collaborator contracts for the Bayesian MCMC engine."]

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod parameter;
pub mod rng;
pub mod state;
pub mod tree;

pub use errors::{BmcError, ErrorInfo};
pub use parameter::Parameter;
pub use rng::{derive_substream_seed, RngHandle, RngState};
pub use state::SimulationState;
pub use tree::{TreeGraph, TreeNode, TreeStructure};

/// Prior, likelihood and tempered posterior of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Log prior density.
    pub log_prior: f64,
    /// Untempered log likelihood.
    pub log_likelihood: f64,
    /// `theta * log_likelihood + log_prior`, with numerical errors mapped to `-inf`.
    pub log_posterior: f64,
}

impl Score {
    /// Combines prior and likelihood under tempering parameter `theta`.
    pub fn tempered(log_prior: f64, log_likelihood: f64, theta: f64) -> Self {
        let log_posterior = if log_prior == f64::NEG_INFINITY || log_prior.is_nan() {
            f64::NEG_INFINITY
        } else if theta == 0.0 {
            // 0 * -inf is NaN; the prior alone defines the target here.
            log_prior
        } else {
            let value = theta * log_likelihood + log_prior;
            if value.is_nan() {
                f64::NEG_INFINITY
            } else {
                value
            }
        };
        Self {
            log_prior,
            log_likelihood,
            log_posterior,
        }
    }

    /// Score of an impossible state.
    pub fn impossible() -> Self {
        Self {
            log_prior: f64::NEG_INFINITY,
            log_likelihood: f64::NEG_INFINITY,
            log_posterior: f64::NEG_INFINITY,
        }
    }
}

/// Scored black box evaluated by the chain (prior x likelihood).
pub trait Objective: Send {
    /// Evaluates the current state. Implementations may reuse cached partial
    /// results until [`Objective::mark_dirty`] is called.
    fn evaluate(&mut self, state: &SimulationState) -> Result<Score, BmcError>;

    /// Invalidates every cache so the next evaluation is computed from scratch.
    fn mark_dirty(&mut self);

    /// Sets the power-posterior exponent `theta` applied to the likelihood.
    fn set_tempering_parameter(&mut self, theta: f64);

    /// Current power-posterior exponent.
    fn tempering_parameter(&self) -> f64;

    /// Called before a proposal mutates the state.
    fn store_state(&mut self) {}

    /// Called after a rejected proposal has been rolled back.
    fn restore_state(&mut self) {}

    /// Called after a proposal has been accepted.
    fn accept_state(&mut self) {}

    /// Optional per-component breakdown used in diagnostics.
    fn diagnosis(&self) -> Option<String> {
        None
    }
}

/// Uncached prior and likelihood densities.
pub trait Density: Send {
    /// Log prior density of `state`.
    fn log_prior(&self, state: &SimulationState) -> Result<f64, BmcError>;
    /// Log likelihood of `state`.
    fn log_likelihood(&self, state: &SimulationState) -> Result<f64, BmcError>;
}

/// Adapts a [`Density`] into a tempered [`Objective`] without caching.
#[derive(Debug, Clone)]
pub struct PowerPosterior<D> {
    density: D,
    theta: f64,
}

impl<D: Density> PowerPosterior<D> {
    /// Wraps `density` with `theta = 1`.
    pub fn new(density: D) -> Self {
        Self {
            density,
            theta: 1.0,
        }
    }

    /// Borrow the wrapped density.
    pub fn density(&self) -> &D {
        &self.density
    }
}

impl<D: Density> Objective for PowerPosterior<D> {
    fn evaluate(&mut self, state: &SimulationState) -> Result<Score, BmcError> {
        let log_prior = self.density.log_prior(state)?;
        if log_prior == f64::NEG_INFINITY {
            return Ok(Score {
                log_prior,
                log_likelihood: f64::NEG_INFINITY,
                log_posterior: f64::NEG_INFINITY,
            });
        }
        let log_likelihood = self.density.log_likelihood(state)?;
        Ok(Score::tempered(log_prior, log_likelihood, self.theta))
    }

    fn mark_dirty(&mut self) {}

    fn set_tempering_parameter(&mut self, theta: f64) {
        self.theta = theta;
    }

    fn tempering_parameter(&self) -> f64 {
        self.theta
    }
}

/// Per-operator tuning switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoercionMode {
    /// Tuned whenever the chain has adaptation enabled.
    #[default]
    Default,
    /// Always tuned.
    On,
    /// Never tuned.
    Off,
}

/// Proposal operator contract.
///
/// Selection, counting and tuning live in the chain; an operator only knows
/// how to perturb the state and how to expose its step-size-like tunable.
pub trait Operator: Send {
    /// Stable name used in reports and checkpoints.
    fn name(&self) -> &str;

    /// Mutates `state` in place and returns the log Hastings ratio.
    ///
    /// Returning [`BmcError::operator_failed`] refuses the move; the chain
    /// counts it as a rejection and rolls the state back.
    fn propose(&mut self, state: &mut SimulationState, rng: &mut RngHandle)
        -> Result<f64, BmcError>;

    /// Hook invoked after acceptance with the change in log posterior.
    fn accept(&mut self, _deviation: f64) {}

    /// Hook invoked after rejection.
    fn reject(&mut self) {}

    /// Current coercible parameter, if the operator is tunable.
    fn tunable(&self) -> Option<f64> {
        None
    }

    /// Overwrites the coercible parameter.
    fn set_tunable(&mut self, _value: f64) {}

    /// Operator-specific target acceptance probability.
    fn target_acceptance(&self) -> Option<f64> {
        None
    }

    /// Gibbs moves are always accepted.
    fn is_gibbs(&self) -> bool {
        false
    }
}

/// Observer notified at step boundaries.
pub trait ChainListener: Send {
    /// Called at the start of every step with the current state.
    fn current_state(
        &mut self,
        _step: u64,
        _state: &SimulationState,
        _score: &Score,
    ) -> Result<(), BmcError> {
        Ok(())
    }

    /// Called after a proposal was accepted.
    fn accepted_state(&mut self, _step: u64, _operator: &str, _state: &SimulationState, _score: &Score) {}

    /// Called when a new best log posterior is found.
    fn best_state(&mut self, _step: u64, _state: &SimulationState, _score: &Score) {}

    /// Called exactly once when the chain terminates.
    fn finished(&mut self, _chain_length: u64) -> Result<(), BmcError> {
        Ok(())
    }
}

/// Sample sink.
pub trait ChainLogger: Send {
    /// Opens the sink.
    fn start_logging(&mut self) -> Result<(), BmcError>;
    /// Records one sample.
    fn log(&mut self, step: u64, state: &SimulationState, score: &Score) -> Result<(), BmcError>;
    /// Flushes and closes the sink.
    fn stop_logging(&mut self) -> Result<(), BmcError>;
}
