//! Per-sample and per-node activity measures

use serde::{Deserialize, Serialize};
use sparsenet_engine::Trajectory;

/// Mean and variance of one node over all samples
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeStats {
    /// Mean value
    pub mean: f64,
    /// Population variance
    pub variance: f64,
}

/// Mean state over nodes, per sample
pub fn population_activity(trajectory: &Trajectory) -> Vec<(u64, f64)> {
    trajectory
        .samples()
        .iter()
        .map(|s| (s.time, mean(s.state.iter().map(|&v| v as f64), s.state.len())))
        .collect()
}

/// Fraction of nodes whose value exceeds `threshold`, per sample
pub fn active_fraction(trajectory: &Trajectory, threshold: f32) -> Vec<(u64, f64)> {
    trajectory
        .samples()
        .iter()
        .map(|s| {
            let active = s.state.iter().filter(|&&v| v > threshold).count();
            let n = s.state.len().max(1);
            (s.time, active as f64 / n as f64)
        })
        .collect()
}

/// Mean and variance of every node across samples
pub fn node_statistics(trajectory: &Trajectory) -> Vec<NodeStats> {
    let n = trajectory.node_count();
    let count = trajectory.len();
    if count == 0 {
        return vec![NodeStats::default(); n];
    }

    let mut sums = vec![0.0f64; n];
    for sample in trajectory.samples() {
        for (acc, &v) in sums.iter_mut().zip(&sample.state) {
            *acc += v as f64;
        }
    }
    let means: Vec<f64> = sums.iter().map(|s| s / count as f64).collect();

    let mut squares = vec![0.0f64; n];
    for sample in trajectory.samples() {
        for ((acc, &v), m) in squares.iter_mut().zip(&sample.state).zip(&means) {
            let d = v as f64 - m;
            *acc += d * d;
        }
    }

    means
        .into_iter()
        .zip(squares)
        .map(|(mean, sq)| NodeStats {
            mean,
            variance: sq / count as f64,
        })
        .collect()
}

/// Number of samples per node at which the value dropped below its
/// predecessor (the initial state precedes the first sample).
///
/// In phase representation a drop is a reset, i.e. a spike.
pub fn phase_resets(trajectory: &Trajectory) -> Vec<usize> {
    let mut resets = vec![0usize; trajectory.node_count()];
    let mut previous = trajectory.initial_state();
    for sample in trajectory.samples() {
        for ((count, &now), &before) in resets.iter_mut().zip(&sample.state).zip(previous) {
            if now < before {
                *count += 1;
            }
        }
        previous = sample.state.as_slice();
    }
    resets
}

/// Recorded spikes per node, counted over every step of the run.
///
/// Zero everywhere for rules without discrete spike events.
pub fn spike_counts(trajectory: &Trajectory) -> Vec<usize> {
    let mut counts = vec![0usize; trajectory.node_count()];
    for spike in trajectory.spikes() {
        counts[spike.node.index()] += 1;
    }
    counts
}

pub(crate) fn mean(values: impl Iterator<Item = f64>, len: usize) -> f64 {
    if len == 0 {
        return 0.0;
    }
    values.sum::<f64>() / len as f64
}
