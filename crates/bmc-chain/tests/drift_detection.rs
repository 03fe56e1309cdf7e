mod common;

use bmc_chain::{ChainOptions, ChainRunner, SimulationContext};
use bmc_core::{PowerPosterior, RngHandle};

use common::{scalar_state, three_walk_schedule, DriftingObjective, Normals};

fn drifting_context(fault_after: u64) -> SimulationContext {
    SimulationContext::new(
        scalar_state(),
        Box::new(DriftingObjective::new(
            PowerPosterior::new(Normals),
            fault_after,
            1.0,
        )),
        three_walk_schedule(),
        RngHandle::from_seed(77),
    )
}

fn drift_options() -> ChainOptions {
    ChainOptions::builder(1_000)
        .full_evaluation_count(100)
        .evaluation_test_threshold(1e-6)
        .use_coercion(false)
        .coercion_delay(0)
        .build()
        .unwrap()
}

#[test]
fn injected_mismatch_aborts_at_the_next_boundary() {
    let mut ctx = drifting_context(500);
    let mut runner = ChainRunner::new(drift_options());
    let err = runner.run(&mut ctx).unwrap_err();
    assert_eq!(err.code(), "evaluation-drift");
    let step = runner.current_step();
    assert!(step == 500 || step == 600, "drift reported at step {step}");
    assert!(step >= 500);
    assert_eq!(step % 100, 0);
    assert!(err.info().context.contains_key("incremental"));
}

#[test]
fn exact_objective_runs_clean() {
    let mut ctx = drifting_context(u64::MAX);
    let mut runner = ChainRunner::new(drift_options());
    let outcome = runner.run(&mut ctx).unwrap();
    assert_eq!(outcome.end_step, 1_000);
    assert!(!outcome.stopped);
}

#[test]
fn disabled_check_tolerates_drift() {
    let mut ctx = drifting_context(10);
    let options = ChainOptions::builder(300)
        .full_evaluation_count(0)
        .use_coercion(false)
        .build()
        .unwrap();
    let mut runner = ChainRunner::new(options);
    assert!(runner.run(&mut ctx).is_ok());
}
