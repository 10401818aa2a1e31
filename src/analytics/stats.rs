//! Descriptive statistics over `f64` samples.

/// Arithmetic mean; 0 for an empty sample
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by `n`)
///
/// # Arguments
/// * `values` - The data points
/// * `mean_value` - Optional pre-calculated mean to avoid recalculation
pub fn population_std_dev(values: &[f64], mean_value: Option<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mean = mean_value.unwrap_or_else(|| mean(values));
    let variance = values.iter()
        .map(|x| (x - mean).powi(2))
        .sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

/// Linear-interpolation percentile of an ascending sample.
///
/// `rank = p / 100 * (n - 1)`; the result interpolates between the values
/// at `floor(rank)` and `ceil(rank)`. `None` for an empty sample or `p`
/// outside `[0, 100]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

pub fn median(sorted: &[f64]) -> Option<f64> {
    percentile(sorted, 50.0)
}
