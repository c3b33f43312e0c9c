//! Seed sweeps

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

use sparsenet_analysis::{summarize, TrajectorySummary};
use sparsenet_engine::run_seeds_with_progress;
use sparsenet_storage::{write_trajectory, Format, TrajectoryRecord};

use crate::{
    config::{load_config, RunOverrides},
    error::{CliError, CliResult},
};

/// Run one configuration once per seed, in parallel
#[derive(Args, Debug)]
pub struct SweepCommand {
    /// Simulation configuration (TOML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Comma-separated seeds
    #[arg(long, value_delimiter = ',', conflicts_with = "count")]
    pub seeds: Vec<u64>,

    /// Number of consecutive seeds starting at the configured seed
    #[arg(long)]
    pub count: Option<u64>,

    /// Directory receiving one trajectory per seed and summary.json
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Trajectory format
    #[arg(long, default_value = "json")]
    pub format: Format,

    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Hide the progress bar
    #[arg(long)]
    pub quiet: bool,
}

/// One line of summary.json
#[derive(Debug, Serialize)]
pub struct SweepEntry {
    /// Seed of the run
    pub seed: u64,
    /// Trajectory file name inside the output directory
    pub file: String,
    /// Error that stopped the run, if any
    pub error: Option<String>,
    /// Statistics of the (possibly partial) trajectory
    pub summary: TrajectorySummary,
}

impl SweepCommand {
    pub fn execute(self) -> CliResult<()> {
        let config = load_config(&self.config, &self.overrides)?;
        let seeds = self.seed_list(config.seed)?;
        std::fs::create_dir_all(&self.out_dir)?;

        let progress = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(seeds.len() as u64)
        };
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} runs ({eta})")
                .map_err(anyhow::Error::from)?
                .progress_chars("#>-"),
        );
        let runs = run_seeds_with_progress(&config, &seeds, |_| progress.inc(1))?;
        progress.finish_and_clear();

        let mut entries = Vec::with_capacity(runs.len());
        for run in runs {
            let file = format!("seed_{}.{}", run.seed, self.format.extension());
            let path = self.out_dir.join(&file);
            let (record, trajectory, error) = match run.outcome {
                Ok(result) => (TrajectoryRecord::from_result(&result), result.trajectory, None),
                Err(failure) => {
                    warn!("Seed {} failed: {}", run.seed, failure.error);
                    (
                        TrajectoryRecord::from_failure(&failure),
                        failure.trajectory,
                        Some(failure.error.to_string()),
                    )
                }
            };
            write_trajectory(&path, &record, self.format)?;
            entries.push(SweepEntry {
                seed: run.seed,
                file,
                error,
                summary: summarize(&trajectory),
            });
        }

        let summary_path = self.out_dir.join("summary.json");
        std::fs::write(&summary_path, serde_json::to_string_pretty(&entries)?)?;
        info!("Wrote {} runs and {}", entries.len(), summary_path.display());

        let failed = entries.iter().filter(|e| e.error.is_some()).count();
        if failed > 0 {
            return Err(CliError::SweepFailed {
                failed,
                total: entries.len(),
            });
        }
        Ok(())
    }

    fn seed_list(&self, base: u64) -> CliResult<Vec<u64>> {
        let seeds = match (self.seeds.is_empty(), self.count) {
            (false, _) => self.seeds.clone(),
            (true, Some(count)) => (0..count).map(|i| base.wrapping_add(i)).collect(),
            (true, None) => return Err(CliError::invalid_args("either --seeds or --count is required")),
        };
        if seeds.is_empty() {
            return Err(CliError::invalid_args("sweep needs at least one seed"));
        }
        Ok(seeds)
    }
}
