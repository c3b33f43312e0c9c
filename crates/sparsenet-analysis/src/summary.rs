//! Bundled run and connectivity summaries

use log::debug;
use serde::{Deserialize, Serialize};
use sparsenet_engine::{Connectivity, ConnectivityStats, RunStatus, Trajectory};

use crate::{
    activity::{active_fraction, node_statistics, phase_resets, population_activity, spike_counts},
    correlation::{autocorrelation, synchrony, variance},
};

/// Value above which a node counts as active
pub const ACTIVE_THRESHOLD: f32 = 0.5;

/// Largest lag of the activity autocorrelation in a summary
pub const SUMMARY_MAX_LAG: usize = 10;

/// Scalar description of a trajectory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    /// Number of nodes
    pub node_count: usize,
    /// Number of samples
    pub sample_count: usize,
    /// Steps completed by the run
    pub steps_completed: u64,
    /// Final status of the run
    pub status: RunStatus,
    /// Dynamics rule name
    pub dynamics: String,
    /// Time-averaged population activity
    pub mean_activity: f64,
    /// Standard deviation of the population activity over time
    pub activity_std: f64,
    /// Time-averaged fraction of nodes above [`ACTIVE_THRESHOLD`]
    pub mean_active_fraction: f64,
    /// Mean per-node variance
    pub mean_node_variance: f64,
    /// Golomb synchrony, when defined
    pub synchrony: Option<f64>,
    /// Resets summed over nodes
    pub total_resets: usize,
    /// Resets per node per sample
    pub reset_rate: f64,
    /// Recorded spikes summed over nodes
    pub total_spikes: usize,
    /// Spikes per node per completed step
    pub spike_rate: f64,
    /// Autocorrelation of the population activity, lags 0..=10
    pub activity_autocorrelation: Vec<f64>,
}

/// Compute every trajectory statistic at once
pub fn summarize(trajectory: &Trajectory) -> TrajectorySummary {
    let activity: Vec<f64> = population_activity(trajectory)
        .into_iter()
        .map(|(_, a)| a)
        .collect();
    let fractions = active_fraction(trajectory, ACTIVE_THRESHOLD);
    let nodes = node_statistics(trajectory);
    let resets = phase_resets(trajectory);
    let total_resets: usize = resets.iter().sum();
    let total_spikes: usize = spike_counts(trajectory).iter().sum();
    let steps = trajectory.metadata().end_step;

    let n = trajectory.node_count();
    let samples = trajectory.len();
    let summary = TrajectorySummary {
        node_count: n,
        sample_count: samples,
        steps_completed: steps,
        status: trajectory.metadata().status,
        dynamics: trajectory.metadata().dynamics.clone(),
        mean_activity: average(&activity),
        activity_std: variance(&activity).sqrt(),
        mean_active_fraction: average(&fractions.iter().map(|(_, f)| *f).collect::<Vec<_>>()),
        mean_node_variance: average(&nodes.iter().map(|s| s.variance).collect::<Vec<_>>()),
        synchrony: synchrony(trajectory),
        total_resets,
        reset_rate: if n > 0 && samples > 0 {
            total_resets as f64 / (n * samples) as f64
        } else {
            0.0
        },
        total_spikes,
        spike_rate: if n > 0 && steps > 0 {
            total_spikes as f64 / (n as f64 * steps as f64)
        } else {
            0.0
        },
        activity_autocorrelation: autocorrelation(&activity, SUMMARY_MAX_LAG),
    };
    debug!(
        "Summarized {} samples of {} nodes: mean activity {:.4}",
        samples, n, summary.mean_activity
    );
    summary
}

/// Structural description of a connectivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivitySummary {
    /// Counts, density and weight balance
    pub stats: ConnectivityStats,
    /// `in_degree_histogram[k]` nodes have in-degree k
    pub in_degree_histogram: Vec<usize>,
    /// `out_degree_histogram[k]` nodes have out-degree k
    pub out_degree_histogram: Vec<usize>,
}

/// Degree histograms plus [`Connectivity::stats`]
pub fn summarize_connectivity(connectivity: &Connectivity) -> ConnectivitySummary {
    ConnectivitySummary {
        stats: connectivity.stats(),
        in_degree_histogram: histogram(&connectivity.in_degrees()),
        out_degree_histogram: histogram(&connectivity.out_degrees()),
    }
}

fn histogram(values: &[usize]) -> Vec<usize> {
    let mut counts = vec![0usize; values.iter().copied().max().map_or(0, |m| m + 1)];
    for &v in values {
        counts[v] += 1;
    }
    counts
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trajectory;
    use sparsenet_engine::{Edge, NodeId, Spike};

    #[test]
    fn test_summarize() {
        let t = trajectory(
            &[0.0, 0.0],
            &[(0, &[1.0, 1.0]), (1, &[0.0, 0.0]), (2, &[1.0, 1.0]), (3, &[0.0, 0.0])],
        );
        let s = summarize(&t);
        assert_eq!(s.sample_count, 4);
        assert_eq!(s.mean_activity, 0.5);
        assert_eq!(s.activity_std, 0.5);
        assert_eq!(s.mean_active_fraction, 0.5);
        assert_eq!(s.synchrony, Some(1.0));
        assert_eq!(s.total_resets, 4);
        assert_eq!(s.reset_rate, 0.5);
        assert_eq!(s.total_spikes, 0);
        assert_eq!(s.spike_rate, 0.0);
        assert_eq!(s.activity_autocorrelation.len(), 4);

        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"synchrony\":1.0"));
    }

    #[test]
    fn test_spike_rate_over_steps() {
        let t = trajectory(&[0.0, 0.0], &[(0, &[0.0, 0.0]), (1, &[0.0, 0.0])])
            .with_spikes(vec![Spike {
                time: 1,
                node: NodeId::new(1),
            }])
            .unwrap();
        let s = summarize(&t);
        assert_eq!(s.total_spikes, 1);
        assert_eq!(s.spike_rate, 0.25);
    }

    #[test]
    fn test_connectivity_summary() {
        let c = Connectivity::from_edges(
            3,
            vec![
                Edge::new(NodeId::new(0), NodeId::new(1), 1.0),
                Edge::new(NodeId::new(0), NodeId::new(2), -1.0),
            ],
        )
        .unwrap();
        let s = summarize_connectivity(&c);
        assert_eq!(s.in_degree_histogram, vec![1, 2]);
        assert_eq!(s.out_degree_histogram, vec![2, 0, 1]);
        assert_eq!(s.stats.excitatory, 1);
        assert_eq!(s.stats.inhibitory, 1);
    }
}
