use std::fs;

use bmc_chain::{run, run_marginal_likelihood, ChainOptions, MarginalLikelihoodConfig, PathSchedule, RunConfig};
use bmc_core::{Density, Operator, RngHandle};
use bmc_sim::model::{ModelConfig, OperatorWeights, RootHeightGibbs, RootHeightScale, MEAN, TREE};
use tempfile::tempdir;

#[test]
fn default_tree_is_a_caterpillar() {
    let tree = ModelConfig::default().tree().unwrap();
    assert_eq!(tree.node_count(), 7);
    let root = tree.root();
    assert_eq!(root, 6);
    assert!((tree.height(root).unwrap() - 0.3).abs() < 1e-12);
    let mut children = tree.children(root);
    children.sort_unstable();
    assert_eq!(children, vec![3, 5]);
    assert_eq!(tree.parent(0).unwrap(), Some(4));
    assert_eq!(tree.parent(1).unwrap(), Some(4));
}

#[test]
fn exact_evidence_matches_quadrature() {
    let model = ModelConfig {
        prior_sd: 2.0,
        ..ModelConfig::default()
    };
    let density = model.density();
    let mut ctx = model.build_context(1).unwrap();

    let step: f64 = 1e-3;
    let mut terms = Vec::new();
    let mut mu = -20.0;
    while mu <= 20.0 {
        ctx.state.parameter_mut(MEAN).unwrap().set_value(0, mu).unwrap();
        let log_likelihood = density.log_likelihood(&ctx.state).unwrap();
        let z = mu / model.prior_sd;
        let log_prior = -0.5 * (2.0 * std::f64::consts::PI * model.prior_sd.powi(2)).ln() - 0.5 * z * z;
        terms.push(log_likelihood + log_prior + step.ln());
        mu += step;
    }
    let max = terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let numeric = max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln();

    assert!((numeric - density.log_evidence()).abs() < 1e-4);
}

#[test]
fn gibbs_draws_follow_the_shifted_exponential() {
    let model = ModelConfig::default();
    let mut ctx = model.build_context(5).unwrap();
    let mut gibbs = RootHeightGibbs::new(TREE, 2.0);
    assert!(gibbs.is_gibbs());

    let draws = 20_000;
    let mut total = 0.0;
    for _ in 0..draws {
        gibbs.propose(&mut ctx.state, &mut ctx.rng).unwrap();
        let tree = ctx.state.tree(TREE).unwrap();
        tree.validate().unwrap();
        total += tree.height(tree.root()).unwrap() - 0.2;
    }
    let mean_excess = total / draws as f64;
    assert!((mean_excess - 0.5).abs() < 0.03, "mean excess {mean_excess}");
}

#[test]
fn scale_move_refuses_to_cross_a_child() {
    let model = ModelConfig::default();
    let ctx = model.build_context(9).unwrap();
    let mut scale = RootHeightScale::new(TREE, 2.0);
    let mut rng = RngHandle::from_seed(17);

    let mut accepted = 0;
    let mut refused = 0;
    for _ in 0..500 {
        let mut state = ctx.state.clone();
        let before = state.tree(TREE).unwrap().height(6).unwrap();
        match scale.propose(&mut state, &mut rng) {
            Ok(log_hastings) => {
                let tree = state.tree(TREE).unwrap();
                tree.validate().unwrap();
                let after = tree.height(6).unwrap();
                assert!((log_hastings - (after / before).ln()).abs() < 1e-9);
                accepted += 1;
            }
            Err(err) => {
                assert!(err.is_operator_failure());
                refused += 1;
            }
        }
    }
    assert!(accepted > 100);
    assert!(refused > 100);
}

#[test]
fn chain_recovers_the_posterior_mean() {
    let dir = tempdir().unwrap();
    let model = ModelConfig::default();
    let mut config = RunConfig::default();
    config.chain = ChainOptions::builder(20_000).build().unwrap();
    config.log_every = 10;
    config.checkpoint.save_on_finish = false;
    config.output.run_directory = Some(dir.path().to_path_buf());

    let mut ctx = model.build_context(config.seed_policy.master_seed).unwrap();
    let summary = run(&config, &mut ctx).unwrap();
    assert_eq!(summary.final_step, 20_000);
    assert!(summary.checkpoints.is_empty());

    let trace = fs::read_to_string(dir.path().join("trace.log")).unwrap();
    let mut lines = trace.lines();
    assert_eq!(
        lines.next(),
        Some("state\tposterior\tprior\tlikelihood\tmu\tspecies.height")
    );
    let values: Vec<f64> = lines
        .skip(200)
        .map(|line| line.split('\t').nth(4).unwrap().parse().unwrap())
        .collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let (expected, sd) = model.density().posterior_mean();
    assert!((mean - expected).abs() < 0.15, "mean {mean}, expected {expected} (sd {sd})");

    let rows: Vec<_> = summary.operators.rows.iter().map(|row| row.name.as_str()).collect();
    assert_eq!(rows, vec!["mu-walk", "root-height-scale", "root-height-gibbs"]);
}

#[test]
fn stepping_stone_estimate_is_close_to_the_exact_evidence() {
    let model = ModelConfig {
        prior_sd: 2.0,
        ..ModelConfig::default()
    };
    let mut config = RunConfig::default();
    config.marginal_likelihood = Some(MarginalLikelihoodConfig {
        path: PathSchedule::BetaQuantile { alpha: 0.3 },
        path_steps: 20,
        chain_length: 2000,
        burnin: None,
        pre_run: 1000,
        log_every: 10,
    });

    let mut ctx = model.build_context(config.seed_policy.master_seed).unwrap();
    let summary = run_marginal_likelihood(&config, &mut ctx).unwrap();
    assert_eq!(summary.run.rungs.len(), 21);
    assert_eq!(summary.run.abandoned(), 0);

    let exact = model.density().log_evidence();
    let stepping_stone = summary.stepping_stone.unwrap();
    let path_sampling = summary.path_sampling.unwrap();
    assert!((stepping_stone - exact).abs() < 1.0, "ss {stepping_stone}, exact {exact}");
    assert!((path_sampling - exact).abs() < 1.0, "ps {path_sampling}, exact {exact}");
}

#[test]
fn model_settings_are_validated() {
    let parsed: ModelConfig = serde_yaml::from_str("prior_sd: 2.5\n").unwrap();
    assert_eq!(parsed.prior_sd, 2.5);
    assert_eq!(parsed.observations.len(), 6);
    assert_eq!(parsed.weights, OperatorWeights::default());
    parsed.validate().unwrap();

    let silent = ModelConfig {
        weights: OperatorWeights {
            mean_walk: 0.0,
            height_scale: 0.0,
            height_gibbs: 0.0,
        },
        ..ModelConfig::default()
    };
    assert_eq!(silent.validate().unwrap_err().code(), "model-weights");

    let lonely = ModelConfig {
        taxa: vec!["solo".to_string()],
        ..ModelConfig::default()
    };
    assert_eq!(lonely.build_context(1).unwrap_err().code(), "model-taxa");

    let negative = ModelConfig {
        noise_sd: -1.0,
        ..ModelConfig::default()
    };
    let err = negative.validate().unwrap_err();
    assert_eq!(err.code(), "model-range");
    assert_eq!(err.info().context.get("field").map(String::as_str), Some("noise_sd"));

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.yaml");
    fs::write(&path, "observations: [oops\n").unwrap();
    assert_eq!(ModelConfig::load(&path).unwrap_err().code(), "model-parse");
}
