//! Volume ratio: current volume relative to its trailing mean.
//!
//! VOLUME_RATIO(n)[i] = V[i] / mean(V[max(0, i-n+1)..=i])
//! Points where the trailing mean volume is zero are invalid.

use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_volume_ratio(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let means = rolling_mean(&volumes, period);

    let values = bars
        .iter()
        .zip(means)
        .map(|(bar, mean)| {
            let valid = mean > 0.0;
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Simple(if valid { bar.volume / mean } else { 0.0 }),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeRatio(period),
        values,
    }
}
