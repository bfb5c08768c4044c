//! Shared descriptive statistics
//!
//! Thin wrappers over `statrs` that give empty and single-element inputs a
//! defined value instead of NaN.

use statrs::statistics::Statistics;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

/// Sample standard deviation (n - 1); 0 for fewer than two values
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.std_dev()
}

/// Population standard deviation (n); 0 for an empty slice
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.population_std_dev()
}

/// Quantile with linear interpolation between closest ranks
///
/// `sorted` must be ascending.
pub fn quantile_linear(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lower = pos.floor() as usize;
            let upper = pos.ceil() as usize;
            let frac = pos - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Inclusive `[Q1 - k*IQR, Q3 + k*IQR]` band for a set of values
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let q1 = quantile_linear(&sorted, 0.25);
    let q3 = quantile_linear(&sorted, 0.75);
    let iqr = q3 - q1;
    Some((q1 - k * iqr, q3 + k * iqr))
}

/// Coefficient of variation, with a caller-chosen value when the mean is 0
pub fn coefficient_of_variation(mean: f64, std: f64, when_zero_mean: f64) -> f64 {
    if mean > 0.0 {
        std / mean
    } else {
        when_zero_mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_single_inputs_are_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(sample_std(&[]), 0.0);
        assert_eq!(sample_std(&[42.0]), 0.0);
        assert_eq!(population_std(&[]), 0.0);
        assert_eq!(population_std(&[42.0]), 0.0);
    }

    #[test]
    fn test_sample_vs_population_std() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(&values) - 2.0).abs() < 1e-9);
        assert!((sample_std(&values) - 2.138_089_935).abs() < 1e-6);
    }

    #[test]
    fn test_quantile_linear_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile_linear(&sorted, 0.25) - 1.75).abs() < 1e-9);
        assert!((quantile_linear(&sorted, 0.75) - 3.25).abs() < 1e-9);
        assert_eq!(quantile_linear(&sorted, 0.0), 1.0);
        assert_eq!(quantile_linear(&sorted, 1.0), 4.0);
    }

    #[test]
    fn test_iqr_bounds_flags_extreme_value() {
        let values = [100.0, 110.0, 90.0, 105.0, 95.0, 100_000.0];
        let (lo, hi) = iqr_bounds(&values, 3.0).unwrap();
        assert!(lo < 90.0);
        assert!(hi < 100_000.0);
        assert!(hi > 110.0);
    }

    #[test]
    fn test_iqr_bounds_identical_values() {
        let (lo, hi) = iqr_bounds(&[50.0, 50.0, 50.0], 3.0).unwrap();
        assert_eq!((lo, hi), (50.0, 50.0));
    }

    #[test]
    fn test_cv_zero_mean() {
        assert_eq!(coefficient_of_variation(0.0, 5.0, 1.0), 1.0);
        assert_eq!(coefficient_of_variation(10.0, 5.0, 1.0), 0.5);
    }
}
