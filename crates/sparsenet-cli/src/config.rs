//! Loading simulation configurations for the CLI

use std::path::Path;

use anyhow::Context;
use clap::Args;
use sparsenet_engine::SimulationConfig;

use crate::error::{CliError, CliResult};

/// Command-line overrides applied on top of a configuration file
#[derive(Args, Debug, Clone, Default)]
pub struct RunOverrides {
    /// Override the seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the number of steps
    #[arg(long)]
    pub steps: Option<u64>,

    /// Override the sampling stride
    #[arg(long)]
    pub stride: Option<u64>,
}

impl RunOverrides {
    /// Apply every override that was given
    pub fn apply(&self, mut config: SimulationConfig) -> SimulationConfig {
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        if let Some(steps) = self.steps {
            config = config.with_total_steps(steps);
        }
        if let Some(stride) = self.stride {
            config = config.with_sampling_stride(stride);
        }
        config
    }
}

/// Parse a configuration from TOML text
pub fn parse_config(text: &str) -> CliResult<SimulationConfig> {
    toml::from_str(text).map_err(|e| CliError::config(format!("Invalid config: {}", e)))
}

/// Load a configuration file, apply overrides and validate the result
pub fn load_config(path: &Path, overrides: &RunOverrides) -> CliResult<SimulationConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = overrides.apply(parse_config(&text)?);
    config.validate()?;
    Ok(config)
}
