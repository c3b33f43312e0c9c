//! Summary statistics over completed sparsenet runs
//!
//! Everything here reads a sealed [`Trajectory`](sparsenet_engine::Trajectory)
//! or a [`Connectivity`](sparsenet_engine::Connectivity); nothing depends on
//! driver internals.

#![warn(missing_docs)]

pub mod activity;
pub mod correlation;
pub mod summary;

pub use activity::{
    active_fraction, node_statistics, phase_resets, population_activity, spike_counts, NodeStats,
};
pub use correlation::{autocorrelation, synchrony};
pub use summary::{
    summarize, summarize_connectivity, ConnectivitySummary, TrajectorySummary, ACTIVE_THRESHOLD,
};
