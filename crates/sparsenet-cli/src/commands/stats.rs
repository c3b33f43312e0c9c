//! Summary statistics of an exported trajectory

use clap::Args;
use std::path::PathBuf;

use sparsenet_analysis::summarize;
use sparsenet_storage::read_trajectory;

use crate::error::CliResult;

/// Print the summary of a trajectory file as JSON
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Trajectory file (json or bincode)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Single-line JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,
}

impl StatsCommand {
    pub fn execute(self) -> CliResult<()> {
        let trajectory = read_trajectory(&self.input)?.into_trajectory()?;
        let summary = summarize(&trajectory);
        let json = if self.compact {
            serde_json::to_string(&summary)?
        } else {
            serde_json::to_string_pretty(&summary)?
        };
        println!("{}", json);
        Ok(())
    }
}
