//! Run configuration

use serde::{Deserialize, Serialize};

use crate::{
    dynamics::{DynamicsSpec, StabilityGuard},
    error::*,
    plasticity::PlasticitySpec,
    rng::RandomStream,
    stimulation::StimulusSpec,
    topology::{TopologyBuilder, TopologySpec, WeightSpec},
};

/// Default magnitude bound for the instability guard
pub const DEFAULT_INSTABILITY_BOUND: f64 = 1.0e6;

/// Stream selectors derived from the run seed, one per consumer
pub(crate) mod streams {
    pub const TOPOLOGY: u64 = 1;
    pub const INITIAL: u64 = 2;
    pub const STIMULATION: u64 = 3;
    pub const DYNAMICS: u64 = 4;
}

/// State at time 0
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialCondition {
    /// All nodes at zero
    #[default]
    Zeros,
    /// All nodes at `value`
    Constant {
        /// Initial value
        value: f32,
    },
    /// Independent uniform values in `[low, high)`
    Uniform {
        /// Lower bound
        low: f32,
        /// Upper bound
        high: f32,
    },
    /// Each node at `value` with probability `p`, zero otherwise
    Bernoulli {
        /// Activation probability
        p: f64,
        /// Value of active nodes
        #[serde(default = "default_active")]
        value: f32,
    },
    /// One value per node
    Explicit {
        /// Initial values
        values: Vec<f32>,
    },
}

fn default_active() -> f32 {
    1.0
}

impl InitialCondition {
    /// Check parameters against the node count
    pub fn validate(&self, node_count: usize) -> Result<()> {
        match self {
            Self::Zeros => Ok(()),
            Self::Constant { value } => {
                if value.is_finite() {
                    Ok(())
                } else {
                    Err(EngineError::invalid_spec("initial.value", value, "finite"))
                }
            }
            Self::Uniform { low, high } => {
                if low.is_finite() && high.is_finite() && low <= high {
                    Ok(())
                } else {
                    Err(EngineError::invalid_spec(
                        "initial.high",
                        format!("{} (with low={})", high, low),
                        ">= low",
                    ))
                }
            }
            Self::Bernoulli { p, value } => {
                if !(0.0..=1.0).contains(p) {
                    return Err(EngineError::invalid_spec("initial.p", p, "in [0, 1]"));
                }
                if !value.is_finite() {
                    return Err(EngineError::invalid_spec("initial.value", value, "finite"));
                }
                Ok(())
            }
            Self::Explicit { values } => {
                if values.len() != node_count {
                    return Err(EngineError::dimension_mismatch(
                        "initial.values",
                        node_count,
                        values.len(),
                    ));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(EngineError::invalid_spec("initial.values", "non-finite", "finite"));
                }
                Ok(())
            }
        }
    }

    /// Produce the initial state, drawing one value per node in index order
    /// for the random variants
    pub fn materialize(&self, node_count: usize, rng: &mut RandomStream) -> Result<Vec<f32>> {
        self.validate(node_count)?;
        Ok(match self {
            Self::Zeros => vec![0.0; node_count],
            Self::Constant { value } => vec![*value; node_count],
            Self::Uniform { low, high } => (0..node_count)
                .map(|_| rng.uniform_range(*low as f64, *high as f64) as f32)
                .collect(),
            Self::Bernoulli { p, value } => (0..node_count)
                .map(|_| if rng.bernoulli(*p) { *value } else { 0.0 })
                .collect(),
            Self::Explicit { values } => values.clone(),
        })
    }
}

fn default_stride() -> u64 {
    1
}

fn default_window() -> usize {
    1
}

fn default_bound() -> Option<f64> {
    Some(DEFAULT_INSTABILITY_BOUND)
}

/// Everything needed to reproduce a run.
///
/// All fields are required except the plasticity pair, which defaults to
/// disabled; the remaining optional fields have fixed defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of nodes
    pub node_count: usize,
    /// Graph family
    pub topology: TopologySpec,
    /// Weight distribution
    pub weights: WeightSpec,
    /// Permit self-connections
    #[serde(default)]
    pub allow_self_loops: bool,
    /// State at time 0
    #[serde(default)]
    pub initial: InitialCondition,
    /// Transition rule
    pub dynamics: DynamicsSpec,
    /// External stimulation patterns
    #[serde(default)]
    pub stimulation: Vec<StimulusSpec>,
    /// Fail on two overrides of one node at one time
    #[serde(default)]
    pub reject_override_conflicts: bool,
    /// Weight adaptation; disabled when absent
    #[serde(default)]
    pub plasticity: Option<PlasticitySpec>,
    /// Trailing window of states visible to plasticity
    #[serde(default = "default_window")]
    pub plasticity_window: usize,
    /// Number of steps to run
    pub total_steps: u64,
    /// Steps between recorded samples
    #[serde(default = "default_stride")]
    pub sampling_stride: u64,
    /// Seed of the root random stream
    pub seed: u64,
    /// Magnitude bound on state values; `None` disables the check
    #[serde(default = "default_bound")]
    pub instability_bound: Option<f64>,
}

impl SimulationConfig {
    /// Configuration with defaults for all optional fields
    pub fn new(
        node_count: usize,
        topology: TopologySpec,
        weights: WeightSpec,
        dynamics: DynamicsSpec,
        total_steps: u64,
        seed: u64,
    ) -> Self {
        Self {
            node_count,
            topology,
            weights,
            allow_self_loops: false,
            initial: InitialCondition::Zeros,
            dynamics,
            stimulation: Vec::new(),
            reject_override_conflicts: false,
            plasticity: None,
            plasticity_window: default_window(),
            total_steps,
            sampling_stride: default_stride(),
            seed,
            instability_bound: default_bound(),
        }
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of steps
    pub fn with_total_steps(mut self, total_steps: u64) -> Self {
        self.total_steps = total_steps;
        self
    }

    /// Set the sampling stride
    pub fn with_sampling_stride(mut self, stride: u64) -> Self {
        self.sampling_stride = stride;
        self
    }

    /// Set the initial condition
    pub fn with_initial(mut self, initial: InitialCondition) -> Self {
        self.initial = initial;
        self
    }

    /// Add a stimulation pattern
    pub fn with_stimulus(mut self, stimulus: StimulusSpec) -> Self {
        self.stimulation.push(stimulus);
        self
    }

    /// Enable plasticity
    pub fn with_plasticity(mut self, plasticity: PlasticitySpec) -> Self {
        self.plasticity = Some(plasticity);
        self
    }

    /// Set the plasticity window length
    pub fn with_plasticity_window(mut self, window: usize) -> Self {
        self.plasticity_window = window;
        self
    }

    /// Permit self-connections
    pub fn with_self_loops(mut self, allowed: bool) -> Self {
        self.allow_self_loops = allowed;
        self
    }

    /// Set or disable the instability bound
    pub fn with_instability_bound(mut self, bound: Option<f64>) -> Self {
        self.instability_bound = bound;
        self
    }

    /// Reject conflicting overrides
    pub fn with_conflict_rejection(mut self, reject: bool) -> Self {
        self.reject_override_conflicts = reject;
        self
    }

    /// Number of samples a completed run records
    pub fn expected_samples(&self) -> usize {
        if self.sampling_stride == 0 {
            return 0;
        }
        self.total_steps.div_ceil(self.sampling_stride) as usize
    }

    /// Topology builder for this configuration
    pub fn topology_builder(&self) -> Result<TopologyBuilder> {
        TopologyBuilder::new(self.node_count, self.topology.clone(), self.weights.clone())?
            .with_self_loops(self.allow_self_loops)
    }

    /// Check every parameter before any step runs
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(EngineError::invalid_spec("node_count", self.node_count, "> 0"));
        }
        if self.total_steps == 0 {
            return Err(EngineError::invalid_spec("total_steps", self.total_steps, "> 0"));
        }
        if self.sampling_stride == 0 {
            return Err(EngineError::invalid_spec(
                "sampling_stride",
                self.sampling_stride,
                "> 0",
            ));
        }
        if self.plasticity_window == 0 {
            return Err(EngineError::invalid_spec(
                "plasticity_window",
                self.plasticity_window,
                "> 0",
            ));
        }

        self.topology_builder()?;
        self.dynamics.validate()?;
        self.initial.validate(self.node_count)?;
        StabilityGuard::new(self.instability_bound)?;
        if let Some(plasticity) = &self.plasticity {
            plasticity.validate()?;
        }

        for stimulus in &self.stimulation {
            validate_stimulus(stimulus, self.node_count)?;
        }
        Ok(())
    }
}

fn validate_stimulus(stimulus: &StimulusSpec, node_count: usize) -> Result<()> {
    let targets = match stimulus {
        StimulusSpec::Pulse { targets, .. }
        | StimulusSpec::Constant { targets, .. }
        | StimulusSpec::Clamp { targets, .. } => targets,
        StimulusSpec::Poisson { targets, rate, .. } => {
            if !(*rate > 0.0) || !rate.is_finite() {
                return Err(EngineError::invalid_spec("stimulation.rate", rate, "> 0"));
            }
            targets
        }
    };
    if targets.is_empty() {
        return Err(EngineError::invalid_spec("stimulation.targets", "[]", "at least one node"));
    }
    if let Some(bad) = targets.iter().find(|t| t.index() >= node_count) {
        return Err(EngineError::NodeOutOfRange {
            node: bad.index(),
            node_count,
        });
    }
    Ok(())
}
