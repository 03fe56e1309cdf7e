use std::error::Error;
use std::fs;
use std::path::PathBuf;

use clap::Args;
use tracing::info;

use super::{load_model, load_run_config, write_json};

#[derive(Args, Debug)]
pub struct McmcArgs {
    /// YAML run configuration.
    #[arg(long)]
    pub config: PathBuf,
    /// YAML model description; the built-in demo model when omitted.
    #[arg(long)]
    pub model: Option<PathBuf>,
    /// Output directory for the trace, checkpoints and manifest.
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Checkpoint file to resume from.
    #[arg(long)]
    pub resume: Option<PathBuf>,
    /// Overrides the configured master seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Resume even when the restored log posterior disagrees with the saved one.
    #[arg(long)]
    pub force_resume: bool,
}

pub fn run(args: &McmcArgs) -> Result<(), Box<dyn Error>> {
    let mut config = load_run_config(&args.config, args.out.as_deref(), args.seed)?;
    if args.force_resume {
        config.restore.force_resume = true;
    }
    let model = load_model(args.model.as_deref())?;
    let mut ctx = model.build_context(config.seed_policy.master_seed)?;

    let summary = match &args.resume {
        Some(checkpoint) => bmc_chain::resume(&config, &mut ctx, checkpoint)?,
        None => bmc_chain::run(&config, &mut ctx)?,
    };
    info!(
        final_step = summary.final_step,
        stopped = summary.stopped,
        "chain finished"
    );

    println!("{}", summary.operators);
    println!(
        "state {}  posterior {:.4}  best {:.4}",
        summary.final_step, summary.final_score.log_posterior, summary.best_log_posterior
    );

    if let Some(out) = &args.out {
        write_json(out.join("summary.json"), &summary)?;
        // Keep the inputs next to the outputs so the run can be repeated.
        fs::copy(&args.config, out.join("config.yaml")).ok();
        if let Some(model) = &args.model {
            fs::copy(model, out.join("model.yaml")).ok();
        }
    }
    Ok(())
}
