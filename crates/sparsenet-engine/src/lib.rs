//! Simulation engine for sparse neural networks
//!
//! This crate builds sparse weighted connectivity, evolves network state in
//! discrete steps under a pluggable dynamics rule, an external stimulation
//! schedule and optional weight plasticity, and records a reproducible
//! trajectory for downstream analysis.
//!
//! Every random draw comes from an explicit [`RandomStream`]; the same
//! [`SimulationConfig`] and seed always produce a bit-identical [`Trajectory`].

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

pub mod config;
pub mod connectivity;
pub mod driver;
pub mod dynamics;
pub mod error;
pub mod plasticity;
pub mod recorder;
pub mod rng;
pub mod stimulation;
pub mod sweep;
pub mod topology;

pub use config::{InitialCondition, SimulationConfig};
pub use connectivity::{Connectivity, ConnectivityStats, Edge};
pub use driver::{CancelToken, RunStats, RunStatus, SimulationDriver, SimulationResult};
pub use dynamics::{DynamicsRule, DynamicsSpec, StabilityGuard, StepContext, ThresholdMode};
pub use error::{EngineError, Result, RunFailure};
pub use plasticity::{
    Plasticity, PlasticityKind, PlasticityRule, PlasticitySpec, PlasticityStats, PruningPolicy,
    StateWindow,
};
pub use recorder::{Recorder, RunMetadata, Sample, Spike, Trajectory};
pub use rng::RandomStream;
pub use stimulation::{Payload, StimulationEvent, StimulationSchedule, StimulusSpec};
pub use sweep::{run_seeds, run_seeds_with_progress, SeedRun};
pub use topology::{TopologyBuilder, TopologySpec, WeightSpec};

/// Engine version recorded in every trajectory
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Node identifier in `[0, node_count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node id
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Node id from a vector index
    pub fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    /// Index into state vectors
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw value
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
