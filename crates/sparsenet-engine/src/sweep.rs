//! Independent runs across seeds

use log::info;

use crate::{
    config::SimulationConfig,
    driver::{SimulationDriver, SimulationResult},
    error::*,
};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Outcome of one sweep member
#[derive(Debug)]
pub struct SeedRun {
    /// Seed of the run
    pub seed: u64,
    /// Completed run or failure with partial trajectory
    pub outcome: std::result::Result<SimulationResult, RunFailure>,
}

/// Run `config` once per seed.
///
/// Each run builds its own connectivity, state and random stream; nothing
/// mutable is shared, so runs execute in parallel when the `parallel` feature
/// is enabled. Results are returned in the order of `seeds`. Configuration
/// errors are reported once, before any run starts.
pub fn run_seeds(config: &SimulationConfig, seeds: &[u64]) -> Result<Vec<SeedRun>> {
    run_seeds_with_progress(config, seeds, |_| {})
}

/// Like [`run_seeds`], calling `on_finished` as each run ends, in completion
/// order
pub fn run_seeds_with_progress(
    config: &SimulationConfig,
    seeds: &[u64],
    on_finished: impl Fn(&SeedRun) + Sync,
) -> Result<Vec<SeedRun>> {
    config.validate()?;
    info!("Starting sweep over {} seeds", seeds.len());

    let run = |&seed: &u64| -> Result<SeedRun> {
        let driver = SimulationDriver::new(config.clone().with_seed(seed))?;
        let run = SeedRun {
            seed,
            outcome: driver.run(),
        };
        on_finished(&run);
        Ok(run)
    };

    #[cfg(feature = "parallel")]
    let runs: Result<Vec<SeedRun>> = seeds.par_iter().map(run).collect();
    #[cfg(not(feature = "parallel"))]
    let runs: Result<Vec<SeedRun>> = seeds.iter().map(run).collect();

    let runs = runs?;
    let failed = runs.iter().filter(|r| r.outcome.is_err()).count();
    info!("Sweep finished: {} runs, {} failed", runs.len(), failed);
    Ok(runs)
}
