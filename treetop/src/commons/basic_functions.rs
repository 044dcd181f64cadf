//! Small numeric helpers shared by the grid filters and the stand statistics.

use std::cmp::Ordering;

/// Round to `digits` decimal places, halves away from zero.
///
/// `round_to(0.125, 2) == 0.13`, `round_to(-0.125, 2) == -0.13`.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// Round to 2 decimal places, the precision of every stand statistic.
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Sort ascending; values are expected to be finite.
pub fn sort_values(values: &mut [f64]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
}

/// Median of an ascending slice: middle value for odd counts, mean of the
/// two central values for even counts. `None` when empty.
pub fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Percentile (0-100) of an ascending slice by rounded rank over `n - 1`.
///
/// 100 selects the maximum and 0 the minimum; the result is always one of
/// the input values. `None` when empty.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    Some(sorted[idx.min(sorted.len() - 1)])
}

/// Arithmetic mean, `None` when empty.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
