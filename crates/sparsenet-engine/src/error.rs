//! Error types for the simulation engine

use std::time::Duration;

use thiserror::Error;

use crate::{driver::RunStatus, recorder::Trajectory};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while building or running a simulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A topology, weight, dynamics or run parameter is inconsistent
    #[error("Invalid parameter {parameter}: {value} (expected {constraint})")]
    InvalidSpec {
        /// Parameter name
        parameter: String,
        /// Offending value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// A state value left the configured magnitude bound
    #[error("Numerical instability at step {step}: node {node} reached {value} (bound {bound})")]
    NumericalInstability {
        /// Step that produced the value
        step: u64,
        /// Offending node
        node: usize,
        /// Offending value
        value: f64,
        /// Configured magnitude bound
        bound: f64,
    },

    /// A plasticity update produced a non-finite weight
    #[error("Non-finite weight {value} on edge {source_node} -> {target_node} after plasticity at step {step}")]
    NonFiniteWeight {
        /// Step whose state drove the update
        step: u64,
        /// Edge source
        source_node: usize,
        /// Edge target
        target_node: usize,
        /// Offending weight
        value: f64,
    },

    /// Step requested on a driver that already reached a terminal status
    #[error("Run is {status:?}; no further step accepted")]
    RunFinished {
        /// Status the run ended in
        status: RunStatus,
    },

    /// Two override events target the same node at the same time
    #[error("Schedule conflict at time {time}: node {node} has more than one override")]
    ScheduleConflict {
        /// Event time
        time: u64,
        /// Node targeted twice
        node: usize,
    },

    /// Append attempted on a sealed recorder
    #[error("Recorder is sealed; rejected sample at time {time}")]
    SealedRecorder {
        /// Time of the rejected sample
        time: u64,
    },

    /// Node index outside `[0, node_count)`
    #[error("Node {node} out of range (node count {node_count})")]
    NodeOutOfRange {
        /// Offending node
        node: usize,
        /// Number of nodes
        node_count: usize,
    },

    /// Vector length does not match the node count
    #[error("Dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        /// What was measured
        what: String,
        /// Expected length
        expected: usize,
        /// Actual length
        found: usize,
    },
}

impl EngineError {
    /// Create an invalid spec error
    pub fn invalid_spec(
        parameter: impl Into<String>,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::InvalidSpec {
            parameter: parameter.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(what: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            found,
        }
    }

    /// True for errors raised by configuration checks before any step runs
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpec { .. } | Self::NodeOutOfRange { .. } | Self::DimensionMismatch { .. }
        )
    }
}

/// A run that stopped on an unrecovered error.
///
/// Carries the sealed trajectory recorded up to the last completed step so the
/// failure can be inspected without re-running.
#[derive(Error, Debug, Clone)]
#[error("Simulation failed after {steps_completed} steps: {error}")]
pub struct RunFailure {
    /// The error that stopped the run
    #[source]
    pub error: EngineError,
    /// Partial trajectory, sealed
    pub trajectory: Trajectory,
    /// Steps fully completed before the failure
    pub steps_completed: u64,
    /// Time spent in the stepping loop
    pub wall_clock: Duration,
}
