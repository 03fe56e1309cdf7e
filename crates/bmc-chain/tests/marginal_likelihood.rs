mod common;

use bmc_chain::estimators::RungTrace;
use bmc_chain::{
    ChainOptions, ChainRunner, MarginalLikelihoodConfig, MarginalLikelihoodOrchestrator,
    PathSchedule,
};
use bmc_chain::ChainControl;
use bmc_core::{
    BmcError, ChainListener, Parameter, PowerPosterior, RngHandle, Score, SimulationState,
};

use bmc_chain::{OperatorSchedule, SimulationContext};
use common::{Normals, RandomWalk};

fn config(path: PathSchedule, steps: usize) -> MarginalLikelihoodConfig {
    MarginalLikelihoodConfig {
        path,
        path_steps: steps,
        chain_length: 2_000,
        burnin: Some(200),
        pre_run: 100,
        log_every: 10,
    }
}

/// One scalar with prior N(0, 10^2) and likelihood N(x; 1, 1).
fn single_normal(seed: u64) -> SimulationContext {
    let mut state = SimulationState::new();
    state.add_parameter(Parameter::scalar("x", 0.0)).unwrap();
    let mut schedule = OperatorSchedule::new();
    schedule.add(Box::new(RandomWalk::new("x", 0, 1.0)), 1.0).unwrap();
    SimulationContext::new(
        state,
        Box::new(PowerPosterior::new(Normals)),
        schedule,
        RngHandle::from_seed(seed),
    )
}

fn runner() -> ChainRunner {
    let options = ChainOptions::builder(1).full_evaluation_count(500).build().unwrap();
    ChainRunner::new(options).with_log_every(10)
}

#[test]
fn every_rung_is_sampled_and_counters_reset() {
    let mut ctx = single_normal(12);
    let mut runner = runner();
    let orchestrator =
        MarginalLikelihoodOrchestrator::new(&config(PathSchedule::Linear, 4)).unwrap();
    let run = orchestrator.run(&mut runner, &mut ctx).unwrap();

    assert_eq!(run.rungs.len(), 5);
    assert!(!run.stopped);
    assert_eq!(run.abandoned(), 0);
    let thetas: Vec<f64> = run.rungs.iter().map(|rung| rung.theta).collect();
    assert_eq!(thetas, vec![1.0, 0.75, 0.5, 0.25, 0.0]);
    for rung in &run.rungs {
        // Burn-in and sampling since the previous reset; the first rung also
        // carries the pre-run.
        let total: u64 = rung.operators.rows.iter().map(|row| row.accepted + row.rejected).sum();
        let expected = if rung.index == 0 { 2_300 } else { 2_200 };
        assert_eq!(total, expected);
        assert!(rung.trace.log_likelihoods.len() >= 200);
    }
    assert_eq!(ctx.schedule.entries().map(|e| e.stats().total()).sum::<u64>(), 0);
    assert_eq!(runner.current_step(), 100 + 5 * 2_200);
    assert_eq!(ctx.objective.tempering_parameter(), 0.0);
}

#[test]
fn estimates_approach_the_analytic_evidence() {
    // ln E_prior[exp(-(x - 1)^2 / 2)] for x ~ N(0, 10^2).
    let analytic = -0.5 * 101f64.ln() - 0.5 / 101.0;
    let mut ctx = single_normal(3);
    let mut runner = runner();
    let orchestrator = MarginalLikelihoodOrchestrator::new(&config(
        PathSchedule::BetaQuantile { alpha: 0.3 },
        24,
    ))
    .unwrap();
    let run = orchestrator.run(&mut runner, &mut ctx).unwrap();
    let ps = run.path_sampling_estimate().unwrap();
    let ss = run.stepping_stone_estimate().unwrap();
    assert!(ps.is_finite() && ss.is_finite());
    assert!((ss - analytic).abs() < 1.0, "stepping stone {ss} vs {analytic}");
    assert!((ps - ss).abs() < 1.5, "path sampling {ps} vs stepping stone {ss}");
}

#[test]
fn beta_path_runs_its_double_prior_rung() {
    let mut ctx = single_normal(5);
    let mut runner = runner();
    let orchestrator = MarginalLikelihoodOrchestrator::new(&config(
        PathSchedule::Beta {
            alpha: 0.3,
            beta: 1.0,
        },
        3,
    ))
    .unwrap();
    let run = orchestrator.run(&mut runner, &mut ctx).unwrap();
    let thetas: Vec<f64> = run.rungs.iter().map(|rung| rung.theta).collect();
    assert_eq!(thetas.len(), 4);
    assert_eq!(thetas[0], 1.0);
    assert_eq!(thetas[2], 0.0);
    assert_eq!(thetas[3], 0.0);
    assert!(run.stepping_stone_estimate().unwrap().is_finite());
}

#[test]
fn stop_request_ends_the_path_early() {
    let mut ctx = single_normal(9);
    let mut runner = runner();
    runner.control().please_stop();
    let orchestrator =
        MarginalLikelihoodOrchestrator::new(&config(PathSchedule::Linear, 4)).unwrap();
    let run = orchestrator.run(&mut runner, &mut ctx).unwrap();
    assert!(run.stopped);
    assert!(run.rungs.is_empty());
    assert_eq!(runner.current_step(), 0);
}

#[test]
fn unusable_traces_are_rejected_by_analysis() {
    let trace = RungTrace {
        theta: 0.5,
        log_likelihoods: vec![-1.0, f64::NAN],
    };
    assert_eq!(trace.analyse().unwrap_err().code(), "non-finite-trace");
}

/// Requests a stop when the chain reaches `at`.
struct StopAt {
    at: u64,
    control: ChainControl,
}

impl ChainListener for StopAt {
    fn current_state(
        &mut self,
        step: u64,
        _state: &SimulationState,
        _score: &Score,
    ) -> Result<(), BmcError> {
        if step == self.at {
            self.control.please_stop();
        }
        Ok(())
    }
}

#[test]
fn rung_cut_short_is_left_out_of_the_estimates() {
    let mut ctx = single_normal(3);
    let mut runner = runner();
    let control = runner.control();
    // Rung 0 covers steps 100..2300 after the pre-run; rung 1 samples from 2500.
    runner.add_listener(Box::new(StopAt { at: 3_000, control }));
    let orchestrator =
        MarginalLikelihoodOrchestrator::new(&config(PathSchedule::Linear, 4)).unwrap();
    let run = orchestrator.run(&mut runner, &mut ctx).unwrap();

    assert!(run.stopped);
    assert_eq!(run.rungs.len(), 2);
    assert!(run.rungs[0].complete);
    assert!(run.rungs[0].summary.is_some());
    assert!(!run.rungs[1].complete);
    assert!(run.rungs[1].summary.is_none());
    assert!(!run.rungs[1].trace.log_likelihoods.is_empty());
    assert_eq!(run.abandoned(), 1);
    assert_eq!(run.summaries().len(), 1);
    assert_eq!(run.traces().len(), 1);
    assert!(run.path_sampling_estimate().is_err());
}
