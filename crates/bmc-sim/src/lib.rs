//! Demo model and subcommands behind the `bmc-sim` binary.

pub mod commands;
pub mod model;
pub mod telemetry;
