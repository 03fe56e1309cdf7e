mod common;

use bmc_chain::{ChainRunner, OperatorAnalysis};

use common::{options, scalar_context};

fn run_once(seed: u64) -> (Vec<(u64, f64)>, OperatorAnalysis, bmc_core::RngState) {
    let mut ctx = scalar_context(seed);
    let mut runner = ChainRunner::new(options(2_000)).with_log_every(10);
    runner.run(&mut ctx).unwrap();
    let samples = runner
        .take_samples()
        .into_iter()
        .map(|sample| (sample.step, sample.score.log_posterior))
        .collect();
    (samples, OperatorAnalysis::from_schedule(&ctx.schedule), ctx.rng.state())
}

#[test]
fn identical_seeds_reproduce_the_trace() {
    let (samples_a, ops_a, rng_a) = run_once(2024);
    let (samples_b, ops_b, rng_b) = run_once(2024);
    assert_eq!(samples_a, samples_b);
    assert_eq!(ops_a, ops_b);
    assert_eq!(rng_a, rng_b);
    assert_eq!(samples_a.len(), 201);
    assert_eq!(samples_a.first().map(|s| s.0), Some(0));
    assert_eq!(samples_a.last().map(|s| s.0), Some(2_000));
}

#[test]
fn different_seeds_diverge() {
    let (samples_a, _, _) = run_once(1);
    let (samples_b, _, _) = run_once(2);
    assert_ne!(samples_a, samples_b);
}

#[test]
fn refused_moves_count_as_rejections() {
    let mut ctx = common::rich_context(5);
    let before = ctx.state.clone();
    let mut runner = ChainRunner::new(
        bmc_chain::ChainOptions::builder(400)
            .use_coercion(false)
            .build()
            .unwrap(),
    );
    runner.run(&mut ctx).unwrap();
    let position = ctx.schedule.position("refusing").unwrap();
    let stats = ctx.schedule.entry(position).unwrap().stats();
    assert_eq!(stats.accepted, 0);
    assert!(stats.rejected > 0);
    // Trees are never touched by the walks.
    assert_eq!(ctx.state.tree("species").unwrap(), before.tree("species").unwrap());
}

#[test]
fn best_score_dominates_samples() {
    let mut ctx = scalar_context(8);
    let mut runner = ChainRunner::new(options(1_000)).with_log_every(1);
    runner.run(&mut ctx).unwrap();
    let best = runner.best_score();
    assert!(runner.initial_score().is_some());
    for sample in runner.take_samples() {
        assert!(sample.score.log_posterior <= best);
    }
}
