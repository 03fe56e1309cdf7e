use std::error::Error;
use std::path::PathBuf;

use bmc_chain::checkpoint::describe;
use bmc_chain::CheckpointCodec;
use clap::Args;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Checkpoint file to read.
    #[arg(long)]
    pub checkpoint: PathBuf,
    /// Print the parsed checkpoint as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &InspectArgs) -> Result<(), Box<dyn Error>> {
    let checkpoint = CheckpointCodec::default().load_file(&args.checkpoint)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    } else {
        print!("{}", describe(&checkpoint));
    }
    Ok(())
}
