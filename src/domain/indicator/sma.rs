//! Simple Moving Average with partial warmup windows.
//!
//! SMA(n)[i] = mean(C[max(0, i-n+1)..=i])
//! Early bars average over the history available, so every point is valid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

/// Trailing mean over at most `period` values ending at each index.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(period);
            let window = &values[start..=i];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let means = rolling_mean(&closes, period);

    let values = bars
        .iter()
        .zip(means)
        .map(|(bar, mean)| IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(mean),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
