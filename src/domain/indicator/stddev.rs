//! Rolling sample standard deviation.
//!
//! Used by the Bollinger bands and the volatility metrics.
//! STDDEV(n)[i] = sqrt(sum((C[j] - mean)^2 for j in window) / (len - 1))
//! A window holding a single observation has no spread and yields 0.

/// Trailing sample standard deviation over at most `period` values.
pub fn rolling_sample_std(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(period);
            sample_std(&values[start..=i])
        })
        .collect()
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values.
pub fn sample_std(window: &[f64]) -> f64 {
    if window.len() < 2 {
        return 0.0;
    }
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1.0);
    variance.sqrt()
}
