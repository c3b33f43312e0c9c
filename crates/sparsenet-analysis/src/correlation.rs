//! Synchrony and temporal correlation

use sparsenet_engine::Trajectory;

use crate::activity::{node_statistics, population_activity};

/// Golomb synchrony measure.
///
/// `chi = sqrt(var(population mean) / mean(per-node variance))`: close to 1
/// when nodes move together, close to 0 when they fluctuate independently.
/// `None` with fewer than two samples or when no node varies.
pub fn synchrony(trajectory: &Trajectory) -> Option<f64> {
    if trajectory.len() < 2 {
        return None;
    }
    let activity: Vec<f64> = population_activity(trajectory)
        .into_iter()
        .map(|(_, a)| a)
        .collect();
    let population_variance = variance(&activity);

    let stats = node_statistics(trajectory);
    let mean_node_variance = stats.iter().map(|s| s.variance).sum::<f64>() / stats.len().max(1) as f64;
    if mean_node_variance <= 0.0 {
        return None;
    }
    Some((population_variance / mean_node_variance).sqrt())
}

/// Normalized autocorrelation of `series` for lags `0..=max_lag`.
///
/// Lags beyond the series length are dropped. A constant series has no
/// defined correlation and yields zeros.
pub fn autocorrelation(series: &[f64], max_lag: usize) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let lags = max_lag.min(series.len() - 1);
    let m = series.iter().sum::<f64>() / series.len() as f64;
    let centered: Vec<f64> = series.iter().map(|x| x - m).collect();
    let denom: f64 = centered.iter().map(|x| x * x).sum();
    if denom == 0.0 {
        return vec![0.0; lags + 1];
    }

    (0..=lags)
        .map(|k| {
            centered
                .iter()
                .zip(&centered[k..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / denom
        })
        .collect()
}

pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trajectory;

    #[test]
    fn test_full_synchrony() {
        let t = trajectory(
            &[0.0, 0.0],
            &[(0, &[0.0, 0.0]), (1, &[1.0, 1.0]), (2, &[0.0, 0.0]), (3, &[1.0, 1.0])],
        );
        let chi = synchrony(&t).unwrap();
        assert!((chi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_antiphase_has_no_synchrony() {
        let t = trajectory(
            &[0.0, 0.0],
            &[(0, &[0.0, 1.0]), (1, &[1.0, 0.0]), (2, &[0.0, 1.0]), (3, &[1.0, 0.0])],
        );
        assert_eq!(synchrony(&t), Some(0.0));
    }

    #[test]
    fn test_synchrony_undefined() {
        let constant = trajectory(&[0.0], &[(0, &[1.0]), (1, &[1.0])]);
        assert_eq!(synchrony(&constant), None);
        let single = trajectory(&[0.0], &[(0, &[1.0])]);
        assert_eq!(synchrony(&single), None);
    }

    #[test]
    fn test_autocorrelation() {
        let alternating = [1.0, -1.0, 1.0, -1.0];
        let r = autocorrelation(&alternating, 10);
        assert_eq!(r.len(), 4);
        assert_eq!(r[0], 1.0);
        assert_eq!(r[1], -0.75);
        assert_eq!(r[2], 0.5);

        assert_eq!(autocorrelation(&[2.0, 2.0, 2.0], 1), vec![0.0, 0.0]);
        assert!(autocorrelation(&[], 3).is_empty());
    }
}
