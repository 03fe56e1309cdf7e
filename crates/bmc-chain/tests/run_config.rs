use std::fs;
use std::path::PathBuf;

use bmc_chain::{PathSchedule, RunConfig};
use tempfile::tempdir;

#[test]
fn empty_document_uses_defaults() {
    let config = RunConfig::from_yaml_str("{}").unwrap();
    assert_eq!(config, RunConfig::default());
    assert_eq!(config.chain.chain_length(), 10_000);
    assert_eq!(config.chain.full_evaluation_count(), 2000);
    assert_eq!(config.chain.coercion_delay(), 100);
    assert_eq!(config.checkpoint.max_to_keep, 4);
    assert!(config.checkpoint.save_on_finish);
    assert_eq!(config.restore.lnl_tolerance, 0.0);
    assert_eq!(config.output.trace_file, PathBuf::from("trace.log"));
    assert!(config.marginal_likelihood.is_none());
}

#[test]
fn marginal_likelihood_block_parses() {
    let yaml = r#"
chain:
  chain_length: 500
  adaptation_target: 0.3
marginal_likelihood:
  path:
    scheme: beta-quantile
    alpha: 0.3
  path_steps: 16
  chain_length: 1000
"#;
    let config = RunConfig::from_yaml_str(yaml).unwrap();
    assert_eq!(config.chain.adaptation_target(), 0.3);
    let ml = config.marginal_likelihood.unwrap();
    assert_eq!(ml.path, PathSchedule::BetaQuantile { alpha: 0.3 });
    assert_eq!(ml.burnin(), 100);
    assert_eq!(ml.pre_run, 0);
}

#[test]
fn invalid_values_are_reported_with_codes() {
    let err = RunConfig::from_yaml_str("chain:\n  chain_length: 0\n").unwrap_err();
    assert_eq!(err.code(), "invalid-chain-length");
    let err = RunConfig::from_yaml_str("chain:\n  chain_length: 10\n  temperature: -1\n")
        .unwrap_err();
    assert_eq!(err.code(), "invalid-temperature");
    let err = RunConfig::from_yaml_str("log_every: 0\n").unwrap_err();
    assert_eq!(err.code(), "invalid-log-every");
    let err = RunConfig::from_yaml_str("chain: [").unwrap_err();
    assert_eq!(err.code(), "config-parse");
}

#[test]
fn load_attaches_the_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, "checkpoint:\n  max_to_keep: 0\n").unwrap();
    let err = RunConfig::load(&path).unwrap_err();
    assert_eq!(err.code(), "invalid-retention");
    assert_eq!(
        err.info().context.get("path"),
        Some(&path.display().to_string())
    );
    let missing = RunConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
    assert_eq!(missing.code(), "config-read");
}
