//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over at most n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! Where StdDev is the sample standard deviation (divides by N-1) over the
//! same window. Default parameters: period=20, multiplier=2.0.
//! No warmup: the first bar has zero spread, so all three bands coincide.

use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::stddev::rolling_sample_std;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_bollinger(
    bars: &[OhlcvBar],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let mult = stddev_mult_x100 as f64 / 100.0;
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let middles = rolling_mean(&closes, period);
    let stds = rolling_sample_std(&closes, period);

    let values = bars
        .iter()
        .zip(middles.iter().zip(stds.iter()))
        .map(|(bar, (&middle, &std))| IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Bollinger {
                upper: middle + mult * std,
                middle,
                lower: middle - mult * std,
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

/// (upper - lower) / middle; 0 when the middle band is 0.
pub fn band_width(upper: f64, middle: f64, lower: f64) -> f64 {
    if middle == 0.0 {
        0.0
    } else {
        (upper - lower) / middle
    }
}

/// Where `close` sits between the bands: 0 at the lower band, 1 at the upper.
/// `None` when the bands have collapsed onto each other.
pub fn band_position(close: f64, upper: f64, lower: f64) -> Option<f64> {
    let range = upper - lower;
    if range > 0.0 {
        Some((close - lower) / range)
    } else {
        None
    }
}
