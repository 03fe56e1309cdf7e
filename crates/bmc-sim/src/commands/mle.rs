use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use serde_json::json;

use super::{load_model, load_run_config, write_json};

#[derive(Args, Debug)]
pub struct MleArgs {
    /// YAML run configuration with a `marginal_likelihood` section.
    #[arg(long)]
    pub config: PathBuf,
    /// YAML model description; the built-in demo model when omitted.
    #[arg(long)]
    pub model: Option<PathBuf>,
    /// Output directory for the rung table and estimates.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Overrides the configured master seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run(args: &MleArgs) -> Result<(), Box<dyn Error>> {
    let config = load_run_config(&args.config, args.out.as_deref(), args.seed)?;
    let model = load_model(args.model.as_deref())?;
    let mut ctx = model.build_context(config.seed_policy.master_seed)?;

    let summary = bmc_chain::run_marginal_likelihood(&config, &mut ctx)?;
    let exact = model.density().log_evidence();

    println!("theta\tsamples\tmean lnL\tvar lnL");
    for rung in &summary.run.rungs {
        match rung.summary {
            Some(stats) => println!(
                "{:.6}\t{}\t{:.4}\t{:.4}",
                stats.theta, stats.samples, stats.mean, stats.variance
            ),
            None if !rung.complete => println!("{:.6}\tcut short", rung.theta),
            None => println!("{:.6}\tabandoned", rung.theta),
        }
    }
    println!("path sampling:  {}", format_estimate(summary.path_sampling));
    println!("stepping stone: {}", format_estimate(summary.stepping_stone));
    println!("exact:          {exact:.4}");

    if let Some(out) = &args.out {
        let report = json!({
            "scheme": summary.run.scheme,
            "stopped": summary.run.stopped,
            "rungs": summary.run.summaries(),
            "path_sampling": summary.path_sampling,
            "stepping_stone": summary.stepping_stone,
            "exact": exact,
        });
        write_json(out.join("marginal_likelihood.json"), &report)?;
    }
    Ok(())
}

fn format_estimate(value: Option<f64>) -> String {
    value.map_or_else(|| "unavailable".to_string(), |v| format!("{v:.4}"))
}
