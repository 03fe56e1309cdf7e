use std::error::Error;

use bmc_sim::commands::{
    inspect::{self, InspectArgs},
    mcmc::{self, McmcArgs},
    mle::{self, MleArgs},
};
use bmc_sim::telemetry::init_tracing;
use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "bmc-sim", about = "Bayesian MCMC sampler CLI")]
struct Cli {
    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    /// Default log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value_t = Level::INFO)]
    log_level: Level,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run (or resume) a chain on the demo model.
    Mcmc(McmcArgs),
    /// Estimate the marginal likelihood by path sampling.
    Mle(MleArgs),
    /// Summarise a checkpoint file.
    Inspect(InspectArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json, cli.log_level);
    match cli.command {
        Command::Mcmc(args) => mcmc::run(&args),
        Command::Mle(args) => mle::run(&args),
        Command::Inspect(args) => inspect::run(&args),
    }
}
