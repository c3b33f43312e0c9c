//! Single simulation run

use clap::Args;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sparsenet_analysis::{summarize, TrajectorySummary};
use sparsenet_engine::SimulationDriver;
use sparsenet_storage::{write_connectivity, write_trajectory, Format, TrajectoryRecord};

use crate::{
    config::{load_config, RunOverrides},
    error::{CliError, CliResult},
};

/// Run one simulation and export its trajectory
#[derive(Args, Debug)]
pub struct RunCommand {
    /// Simulation configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Trajectory output file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output format (json or bincode); inferred from the extension by default
    #[arg(long)]
    pub format: Option<Format>,

    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Also write the final connectivity as a binary snapshot
    #[arg(long)]
    pub connectivity_out: Option<PathBuf>,
}

impl RunCommand {
    pub fn execute(self) -> CliResult<()> {
        let config = load_config(&self.config, &self.overrides)?;
        let format = resolve_format(self.format, &self.output)?;
        info!(
            "Running {} ({} nodes, {} steps, seed {})",
            self.config.display(),
            config.node_count,
            config.total_steps,
            config.seed
        );

        match SimulationDriver::new(config)?.run() {
            Ok(result) => {
                write_trajectory(&self.output, &TrajectoryRecord::from_result(&result), format)?;
                if let Some(path) = &self.connectivity_out {
                    write_connectivity(path, &result.connectivity)?;
                    info!("Wrote connectivity snapshot to {}", path.display());
                }
                log_summary(&summarize(&result.trajectory));
                Ok(())
            }
            Err(failure) => {
                write_trajectory(&self.output, &TrajectoryRecord::from_failure(&failure), format)?;
                warn!(
                    "Wrote partial trajectory ({} samples) to {}",
                    failure.trajectory.len(),
                    self.output.display()
                );
                if self.connectivity_out.is_some() {
                    warn!("No connectivity snapshot for a failed run");
                }
                Err(CliError::RunFailed {
                    steps_completed: failure.steps_completed,
                    source: failure.error,
                })
            }
        }
    }
}

/// Explicit format, or the one implied by the file extension
pub(crate) fn resolve_format(format: Option<Format>, path: &Path) -> CliResult<Format> {
    match format {
        Some(format) => Ok(format),
        None => Ok(Format::from_path(path)?),
    }
}

fn log_summary(summary: &TrajectorySummary) {
    info!(
        "{} samples, mean activity {:.4} (std {:.4}), active fraction {:.3}",
        summary.sample_count, summary.mean_activity, summary.activity_std, summary.mean_active_fraction
    );
    if let Some(chi) = summary.synchrony {
        info!("Synchrony {:.4}, {} resets", chi, summary.total_resets);
    }
    if summary.total_spikes > 0 {
        info!("{} spikes, {:.5} per node per step", summary.total_spikes, summary.spike_rate);
    }
}
