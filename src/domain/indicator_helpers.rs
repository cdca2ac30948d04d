//! Shared helper functions for indicator calculations.

use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::channel::calculate_box;
use crate::domain::indicator::roc::calculate_slope;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::{calculate_sma, rolling_mean};
use crate::domain::indicator::volume::calculate_volume_ratio;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorSet, IndicatorType, IndicatorValue,
};
use crate::domain::ohlcv::OhlcvBar;

/// True range per bar. The first bar has no prior close and uses high - low.
pub fn true_ranges(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect()
}

/// ATR as the trailing mean of true range over at most `period` bars.
pub fn calc_atr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let atrs = rolling_mean(&true_ranges(bars), period);

    let values = bars
        .iter()
        .zip(atrs)
        .map(|(bar, atr)| IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(atr),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

pub fn calculate_indicator(bars: &[OhlcvBar], indicator_type: IndicatorType) -> IndicatorSeries {
    match indicator_type {
        IndicatorType::Sma(period) => calculate_sma(bars, period),
        IndicatorType::Atr(period) => calc_atr(bars, period),
        IndicatorType::Rsi(period) => calculate_rsi(bars, period),
        IndicatorType::VolumeRatio(period) => calculate_volume_ratio(bars, period),
        IndicatorType::Slope { period, lookback } => calculate_slope(bars, period, lookback),
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => calculate_bollinger(bars, period, stddev_mult_x100),
        IndicatorType::Box(period) => calculate_box(bars, period),
    }
}

/// Compute every requested indicator over the full bar history.
/// Duplicate requests are computed once.
pub fn compute_indicators(bars: &[OhlcvBar], types: &[IndicatorType]) -> IndicatorSet {
    let mut set = IndicatorSet::default();
    for ty in types {
        if set.get(ty).is_none() {
            set.insert(calculate_indicator(bars, *ty));
        }
    }
    set
}
