//! CLI command implementations for sparsenet

use clap::{Parser, Subcommand};

use crate::error::CliResult;

pub mod init;
pub mod run;
pub mod stats;
pub mod sweep;

/// sparsenet - reproducible sparse network simulations
#[derive(Parser, Debug)]
#[command(
    name = "sparsenet",
    version,
    about = "Reproducible simulation of sparse neural networks",
    long_about = "sparsenet builds sparse weighted networks, evolves their state under a \
                  configurable dynamics rule with external stimulation and optional \
                  plasticity, and exports bit-reproducible trajectories."
)]
pub struct SparsenetCli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example configuration file
    #[command(alias = "new")]
    Init(init::InitCommand),

    /// Run one simulation and export its trajectory
    Run(run::RunCommand),

    /// Run one configuration across many seeds
    Sweep(sweep::SweepCommand),

    /// Print summary statistics of an exported trajectory
    Stats(stats::StatsCommand),
}

impl SparsenetCli {
    /// Execute the CLI command
    pub fn execute(self) -> CliResult<()> {
        match self.command {
            Commands::Init(cmd) => cmd.execute(),
            Commands::Run(cmd) => cmd.execute(),
            Commands::Sweep(cmd) => cmd.execute(),
            Commands::Stats(cmd) => cmd.execute(),
        }
    }
}
