//! Raw entry/exit signals derived from the indicator set.
//!
//! Signals are stateless: the value at bar `t` depends only on bars `t` and
//! `t - 1` and their indicator values. Whether a signal is acted upon is the
//! position state machine's decision.

use crate::domain::indicator::bollinger::band_width;
use crate::domain::indicator::{IndicatorSet, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::strategy::{EntryFilters, Strategy, StrategyKind, VOLUME_PERIOD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawSignal {
    Enter,
    Exit,
    #[default]
    None,
}

fn crossed_above(now: (f64, f64), prev: (f64, f64)) -> bool {
    now.0 > now.1 && prev.0 <= prev.1
}

fn crossed_below(now: (f64, f64), prev: (f64, f64)) -> bool {
    now.0 < now.1 && prev.0 >= prev.1
}

fn cross_signal(now: (f64, f64), prev: (f64, f64)) -> RawSignal {
    if crossed_above(now, prev) {
        RawSignal::Enter
    } else if crossed_below(now, prev) {
        RawSignal::Exit
    } else {
        RawSignal::None
    }
}

fn base_signal(
    kind: &StrategyKind,
    bars: &[OhlcvBar],
    indicators: &IndicatorSet,
    index: usize,
) -> Option<RawSignal> {
    let close = bars.get(index)?.close;

    let signal = match kind {
        StrategyKind::PriceMaCross { period } => {
            let prev = index.checked_sub(1)?;
            let ma = IndicatorType::Sma(*period);
            cross_signal(
                (close, indicators.simple(&ma, index)?),
                (bars[prev].close, indicators.simple(&ma, prev)?),
            )
        }
        StrategyKind::DualMaCross { fast, slow } => {
            let prev = index.checked_sub(1)?;
            let fast = IndicatorType::Sma(*fast);
            let slow = IndicatorType::Sma(*slow);
            cross_signal(
                (
                    indicators.simple(&fast, index)?,
                    indicators.simple(&slow, index)?,
                ),
                (
                    indicators.simple(&fast, prev)?,
                    indicators.simple(&slow, prev)?,
                ),
            )
        }
        StrategyKind::BandBreakout { bands } => {
            let prev = index.checked_sub(1)?;
            let ty = bands.indicator();
            let (upper, _, lower) = indicators.bands(&ty, index)?;
            let (prev_upper, _, prev_lower) = indicators.bands(&ty, prev)?;
            let prev_close = bars[prev].close;
            if crossed_above((close, upper), (prev_close, prev_upper)) {
                RawSignal::Enter
            } else if crossed_below((close, lower), (prev_close, prev_lower)) {
                RawSignal::Exit
            } else {
                RawSignal::None
            }
        }
        StrategyKind::BoxBreakout { period } => {
            let (upper, lower) = indicators.channel(&IndicatorType::Box(*period), index)?;
            if close > upper && upper - lower > 0.0 {
                RawSignal::Enter
            } else if close < lower {
                RawSignal::Exit
            } else {
                RawSignal::None
            }
        }
        StrategyKind::MeanReversion {
            bands,
            rsi_period,
            oversold,
            overbought,
            rsi_stop,
        } => {
            let (upper, _, lower) = indicators.bands(&bands.indicator(), index)?;
            let rsi = indicators.simple(&IndicatorType::Rsi(*rsi_period), index)?;
            let enter = close < lower && rsi < *oversold;
            let exit = (close > upper && rsi > *overbought) || close < lower || rsi < *rsi_stop;
            // Oversold below the lower band satisfies both; entry wins and
            // a close below the live lower band stops an open position.
            if enter {
                RawSignal::Enter
            } else if exit {
                RawSignal::Exit
            } else {
                RawSignal::None
            }
        }
    };

    Some(signal)
}

fn filters_pass(
    strategy: &Strategy,
    filters: &EntryFilters,
    close: f64,
    indicators: &IndicatorSet,
    index: usize,
) -> bool {
    if let Some(threshold) = filters.min_volume_ratio {
        match indicators.simple(&IndicatorType::VolumeRatio(VOLUME_PERIOD), index) {
            Some(ratio) if ratio > threshold => {}
            _ => return false,
        }
    }

    if let Some(trend) = filters.trend {
        match indicators.simple(&trend.indicator(), index) {
            Some(slope) if slope > 0.0 => {}
            _ => return false,
        }
    }

    if filters.min_band_width.is_some() || filters.require_above_middle {
        let Some((upper, middle, lower)) = indicators.bands(&strategy.bands().indicator(), index)
        else {
            return false;
        };
        if let Some(min_width) = filters.min_band_width {
            if band_width(upper, middle, lower) <= min_width {
                return false;
            }
        }
        if filters.require_above_middle && close <= middle {
            return false;
        }
    }

    true
}

/// Signal for bar `index`. Missing or invalid indicator values yield `None`.
pub fn signal_at(
    strategy: &Strategy,
    bars: &[OhlcvBar],
    indicators: &IndicatorSet,
    index: usize,
) -> RawSignal {
    match base_signal(&strategy.kind, bars, indicators, index) {
        Some(RawSignal::Enter) => {
            if filters_pass(
                strategy,
                &strategy.filters,
                bars[index].close,
                indicators,
                index,
            ) {
                RawSignal::Enter
            } else {
                RawSignal::None
            }
        }
        Some(signal) => signal,
        None => RawSignal::None,
    }
}

pub fn generate_signals(
    strategy: &Strategy,
    bars: &[OhlcvBar],
    indicators: &IndicatorSet,
) -> Vec<RawSignal> {
    (0..bars.len())
        .map(|i| signal_at(strategy, bars, indicators, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator_helpers::compute_indicators;
    use crate::domain::strategy::{BandParams, Preset, TrendFilter};
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<OhlcvBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn price_cross(period: usize) -> Strategy {
        let mut s = Strategy::from_preset(Preset::MovingAverage);
        s.kind = StrategyKind::PriceMaCross { period };
        s.filters = EntryFilters::default();
        s
    }

    fn signals_for(strategy: &Strategy, bars: &[OhlcvBar]) -> Vec<RawSignal> {
        let indicators = compute_indicators(bars, &strategy.required_indicators());
        generate_signals(strategy, bars, &indicators)
    }

    #[test]
    fn price_ma_cross_up_and_down() {
        // SMA(3): 10, 10, 10, 10.667, 11.333, 11, 10
        let bars = make_bars(&[10.0, 10.0, 10.0, 12.0, 12.0, 9.0, 9.0]);
        let signals = signals_for(&price_cross(3), &bars);
        assert_eq!(
            signals,
            vec![
                RawSignal::None,
                RawSignal::None,
                RawSignal::None,
                RawSignal::Enter,
                RawSignal::None,
                RawSignal::Exit,
                RawSignal::None,
            ]
        );
    }

    #[test]
    fn dual_ma_cross() {
        let mut s = Strategy::from_preset(Preset::DualMovingAverage);
        s.kind = StrategyKind::DualMaCross { fast: 1, slow: 3 };
        let bars = make_bars(&[10.0, 10.0, 10.0, 13.0, 13.0, 7.0]);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[3], RawSignal::Enter);
        assert_eq!(signals[4], RawSignal::None);
        assert_eq!(signals[5], RawSignal::Exit);
    }

    #[test]
    fn volume_filter_suppresses_enter_only() {
        let mut s = price_cross(3);
        s.filters.min_volume_ratio = Some(1.2);
        // flat volume → ratio 1.0, never above 1.2
        let bars = make_bars(&[10.0, 10.0, 10.0, 12.0, 12.0, 9.0, 9.0]);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[3], RawSignal::None);
        assert_eq!(signals[5], RawSignal::Exit);
    }

    #[test]
    fn volume_filter_passes_on_spike() {
        let mut s = price_cross(3);
        s.filters.min_volume_ratio = Some(1.2);
        let mut bars = make_bars(&[10.0, 10.0, 10.0, 12.0, 12.0]);
        bars[3].volume = 3000.0;
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[3], RawSignal::Enter);
    }

    #[test]
    fn trend_filter_requires_positive_slope() {
        let mut s = price_cross(3);
        s.filters.trend = Some(TrendFilter {
            period: 3,
            lookback: 5,
        });
        // the cross on bar 3 has no valid 5-bar slope yet
        let bars = make_bars(&[10.0, 10.0, 10.0, 12.0, 12.0]);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[3], RawSignal::None);
    }

    #[test]
    fn box_breakout_signals() {
        let s = Strategy::from_preset(Preset::BoxBreakout);
        let mut closes = vec![10.0; 5];
        closes.push(11.0);
        closes.push(9.0);
        let mut bars = make_bars(&closes);
        for bar in bars.iter_mut().take(5) {
            bar.high = 10.5;
            bar.low = 9.5;
        }
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[0], RawSignal::None);
        assert_eq!(signals[5], RawSignal::Enter);
        assert_eq!(signals[6], RawSignal::Exit);
    }

    #[test]
    fn box_breakout_needs_positive_height() {
        let s = Strategy::from_preset(Preset::BoxBreakout);
        // prior bars flat at 10 with high == low → zero box height
        let bars = make_bars(&[10.0, 10.0, 10.0, 11.0]);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[3], RawSignal::None);
    }

    #[test]
    fn mean_reversion_enter_and_protective_exit() {
        let mut s = Strategy::from_preset(Preset::MeanReversion);
        s.kind = StrategyKind::MeanReversion {
            bands: BandParams { period: 5, k: 1.0 },
            rsi_period: 3,
            oversold: 25.0,
            overbought: 75.0,
            rsi_stop: 20.0,
        };
        // sharp drop: below lower band with RSI 0
        let bars = make_bars(&[10.0, 10.2, 10.0, 10.2, 10.0, 8.0]);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[5], RawSignal::Enter);
    }

    #[test]
    fn mean_reversion_overbought_exit() {
        let mut s = Strategy::from_preset(Preset::MeanReversion);
        s.kind = StrategyKind::MeanReversion {
            bands: BandParams { period: 5, k: 1.0 },
            rsi_period: 3,
            oversold: 25.0,
            overbought: 75.0,
            rsi_stop: 20.0,
        };
        let bars = make_bars(&[10.0, 9.9, 10.0, 9.9, 10.0, 12.0]);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[5], RawSignal::Exit);
    }

    #[test]
    fn band_breakout_filters() {
        let s = Strategy::from_preset(Preset::BandBreakout);
        let mut closes = vec![10.0, 10.4, 9.6, 10.4, 9.6, 10.4, 9.6, 10.0];
        closes.push(14.0);
        let bars = make_bars(&closes);
        let signals = signals_for(&s, &bars);
        assert_eq!(signals[8], RawSignal::Enter);

        let mut narrow = s.clone();
        narrow.filters.min_band_width = Some(10.0);
        let signals = signals_for(&narrow, &bars);
        assert_eq!(signals[8], RawSignal::None);
    }
}
