//! Rate of change of a moving average, used as a trend slope.
//!
//! SLOPE(n, k)[i] = SMA(n)[i] / SMA(n)[i-k] - 1
//! If SMA(n)[i-k] == 0 the point is invalid.
//! Warmup: first k bars invalid (the ratio needs k bars of history).

use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::{OhlcvBar, closes};

pub fn calculate_slope(bars: &[OhlcvBar], period: usize, lookback: usize) -> IndicatorSeries {
    let means = rolling_mean(&closes(bars), period);
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let base = i.checked_sub(lookback).map(|j| means[j]);
        let (valid, value) = match base {
            Some(prev) if lookback > 0 && prev != 0.0 => (true, means[i] / prev - 1.0),
            _ => (false, 0.0),
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: IndicatorValue::Simple(value),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Slope { period, lookback },
        values,
    }
}
