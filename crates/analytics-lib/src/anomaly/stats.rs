//! Rolling statistics over a window snapshot
//!
//! Stateless: every evaluation recomputes from the values it is given. Uses
//! the two-pass formulation (mean first, then squared deviations), which is
//! stable for the window sizes this service runs with.

/// Mean and sample standard deviation of one window snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStatistics {
    /// Arithmetic mean (0.0 for an empty window)
    pub mean: f64,
    /// Sample standard deviation (0.0 for fewer than two values)
    pub std_dev: f64,
    /// Number of values the statistics were computed from
    pub count: usize,
}

impl RollingStatistics {
    /// Compute statistics for a snapshot of values
    pub fn from_values(values: &[f64]) -> Self {
        let mean = Self::mean(values);
        Self {
            mean,
            std_dev: Self::std_dev(values, mean),
            count: values.len(),
        }
    }

    /// Arithmetic mean, 0.0 for empty input
    pub fn mean(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    /// Sample standard deviation around `mean` (Bessel's correction)
    pub fn std_dev(values: &[f64], mean: f64) -> f64 {
        if values.len() <= 1 {
            return 0.0;
        }

        let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (sum_sq / (values.len() - 1) as f64).sqrt()
    }
}

/// Smallest value of a snapshot
pub fn min(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

/// Largest value of a snapshot
pub fn max(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window() {
        let stats = RollingStatistics::from_values(&[]);

        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.std_dev, 0.0);
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn test_single_value_has_zero_std_dev() {
        let stats = RollingStatistics::from_values(&[42.0]);

        assert_eq!(stats.mean, 42.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_identical_values_have_exactly_zero_std_dev() {
        let stats = RollingStatistics::from_values(&[10.0; 5]);

        assert_eq!(stats.mean, 10.0);
        assert_eq!(stats.std_dev, 0.0);
    }

    #[test]
    fn test_sample_std_dev_uses_n_minus_one() {
        // 2, 4, 4, 4, 5, 5, 7, 9: population sd = 2, sample sd = sqrt(32/7)
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let stats = RollingStatistics::from_values(&values);

        assert_eq!(stats.mean, 5.0);
        assert!((stats.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_mixed_window() {
        let stats = RollingStatistics::from_values(&[10.0, 12.0, 9.0, 11.0, 10.0, 60.0]);

        assert!((stats.mean - 18.6667).abs() < 1e-3);
        assert!((stats.std_dev - 20.2748).abs() < 1e-3);
    }

    #[test]
    fn test_two_pass_is_stable_for_large_offsets() {
        let values: Vec<f64> = (0..100).map(|i| 1e9 + (i % 2) as f64).collect();
        let stats = RollingStatistics::from_values(&values);

        assert!((stats.mean - (1e9 + 0.5)).abs() < 1e-6);
        assert!((stats.std_dev - 0.502519).abs() < 1e-5);
    }

    #[test]
    fn test_min_max() {
        let values = [3.0, -1.0, 7.5];

        assert_eq!(min(&values), Some(-1.0));
        assert_eq!(max(&values), Some(7.5));
        assert_eq!(min(&[]), None);
    }
}
