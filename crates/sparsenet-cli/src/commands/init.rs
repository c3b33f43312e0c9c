//! Example configuration command

use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::error::{CliError, CliResult};

/// Write an example configuration: two mutually inhibiting populations of
/// pulse-coupled oscillators under Poisson drive
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Destination of the configuration file
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

const POPULATION_SIZE: usize = 200;

impl InitCommand {
    pub fn execute(self) -> CliResult<()> {
        if self.path.exists() && !self.force {
            return Err(CliError::invalid_args(format!(
                "{} already exists (use --force to overwrite)",
                self.path.display()
            )));
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, example_config())?;
        info!("Wrote example configuration to {}", self.path.display());
        Ok(())
    }
}

/// The example configuration as TOML
pub fn example_config() -> String {
    let n = 2 * POPULATION_SIZE;
    let targets = (0..n).map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
    TEMPLATE
        .replace("{node_count}", &n.to_string())
        .replace("{population}", &POPULATION_SIZE.to_string())
        .replace("{targets}", &targets)
}

const TEMPLATE: &str = r#"# sparsenet simulation configuration
#
# Two inhibitory populations of leaky integrate-and-fire units in phase
# representation. Phases advance by `dt` per step; a unit fires at phase 1,
# resets to 0 and shifts the phases of its targets.

node_count = {node_count}
total_steps = 2000
sampling_stride = 5
seed = 42

# magnitude bound on any state value; remove to disable
instability_bound = 1e6

# each unit receives on average `in_degree` inputs from every population
[topology]
kind = "populations"
sizes = [{population}, {population}]
in_degree = 26.0

# matrix[k][l]: coupling from population l onto population k
[weights]
kind = "population_coupling"
matrix = [[-0.6, -0.3], [-0.3, -0.6]]

[initial]
kind = "uniform"
low = 0.0
high = 1.0

[dynamics]
kind = "phase_oscillator"
current = 4.0
gamma = 1.0
dt = 0.01
# spikes reach their targets this many steps after firing
delay_steps = 5

# external Poisson drive onto every unit
[[stimulation]]
kind = "poisson"
targets = [{targets}]
rate = 0.1
amount = 0.02
start = 0
duration = 2000

# optional weight adaptation; uncomment to enable
# [plasticity.rule]
# kind = "hebbian"
# rate = 0.001
# decay = 0.0
# w_max = 1.0
#
# [plasticity.pruning]
# threshold = 0.01
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(&example_config()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.node_count, 400);
        assert_eq!(config.stimulation.len(), 1);
        assert_eq!(config.expected_samples(), 400);
        assert!(matches!(
            config.dynamics,
            sparsenet_engine::DynamicsSpec::PhaseOscillator { delay_steps: 5, .. }
        ));
    }
}
