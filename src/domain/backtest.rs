//! Backtest driver.
//!
//! BacktestConfig defines the run parameters shared by every instrument.
//! `run_backtest` validates one instrument's bars, computes indicators and
//! signals, folds the position state machine and equity simulator together
//! bar by bar, and reduces the result to a `PerformanceSummary`.

use chrono::NaiveDate;
use tracing::debug;

use super::error::QuantError;
use super::indicator::{IndicatorSet, IndicatorType, IndicatorValue};
use super::indicator_helpers::compute_indicators;
use super::metrics::{PerformanceSummary, SignalCounts, TradeStats, WinRateMode, buy_and_hold_return};
use super::ohlcv::OhlcvBar;
use super::portfolio::{EquityPoint, EquitySimulator};
use super::position::{
    BarInput, ExitLevels, FixedShares, LotSizer, PositionEvent, PositionSizer, PositionState,
    TradeRecord, step,
};
use super::signal::generate_signals;
use super::strategy::{ProtectiveExit, StopRule, Strategy};

pub const DEFAULT_MIN_BARS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub risk_free_rate: f64,
    pub lot_size: u64,
    /// Buy this many shares per entry instead of sizing by lots.
    pub fixed_shares: Option<u64>,
    pub min_bars: usize,
    pub win_rate: WinRateMode,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            commission_rate: 0.0003,
            risk_free_rate: 0.03,
            lot_size: 100,
            fixed_shares: None,
            min_bars: DEFAULT_MIN_BARS,
            win_rate: WinRateMode::Trades,
        }
    }
}

impl BacktestConfig {
    pub fn sizer(&self) -> Box<dyn PositionSizer + Send + Sync> {
        match self.fixed_shares {
            Some(shares) => Box::new(FixedShares {
                shares,
                commission_rate: self.commission_rate,
            }),
            None => Box::new(LotSizer {
                lot_size: self.lot_size,
                commission_rate: self.commission_rate,
            }),
        }
    }
}

/// One row of per-bar output.
#[derive(Debug, Clone, PartialEq)]
pub struct BarRecord {
    pub date: NaiveDate,
    pub close: f64,
    /// 1 on an executed entry, -1 on an executed exit, 0 otherwise.
    pub signal: i8,
    /// Shares held at the close of the bar.
    pub position: u64,
    pub hold_days: u32,
    pub stop_price: Option<f64>,
    pub capital: f64,
    pub cumulative_return: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub instrument: String,
    pub strategy: String,
    pub records: Vec<BarRecord>,
    pub trades: Vec<TradeRecord>,
    pub equity: Vec<EquityPoint>,
    pub summary: Option<PerformanceSummary>,
    pub trade_stats: TradeStats,
    pub buy_and_hold_return: f64,
}

/// Reject short, non-finite, or out-of-order bar series.
pub fn validate_bars(
    instrument: &str,
    bars: &[OhlcvBar],
    min_bars: usize,
) -> Result<(), QuantError> {
    if bars.len() < min_bars {
        return Err(QuantError::InsufficientData {
            instrument: instrument.to_string(),
            bars: bars.len(),
            minimum: min_bars,
        });
    }

    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_finite() {
            return Err(QuantError::InvalidBar {
                instrument: instrument.to_string(),
                date: bar.date,
                reason: "non-finite OHLCV value".into(),
            });
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(QuantError::InvalidBar {
                instrument: instrument.to_string(),
                date: bar.date,
                reason: format!("date does not follow {}", bars[i - 1].date),
            });
        }
    }

    Ok(())
}

fn check_indicators(instrument: &str, indicators: &IndicatorSet) -> Result<(), QuantError> {
    for series in indicators.iter() {
        for point in series.values.iter().filter(|p| p.valid) {
            let finite = match point.value {
                IndicatorValue::Simple(v) => v.is_finite(),
                IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                } => upper.is_finite() && middle.is_finite() && lower.is_finite(),
                IndicatorValue::Channel { upper, lower } => upper.is_finite() && lower.is_finite(),
            };
            if !finite {
                return Err(QuantError::StrategyFailure {
                    instrument: instrument.to_string(),
                    reason: format!("{} is not finite on {}", series.indicator_type, point.date),
                });
            }
        }
    }
    Ok(())
}

fn exit_levels(strategy: &Strategy, indicators: &IndicatorSet, index: usize) -> ExitLevels {
    let atr = match strategy.exits.stop {
        StopRule::Atr { period, .. } => indicators.simple(&IndicatorType::Atr(period), index),
        _ => None,
    };
    let ma = match strategy.exits.protective {
        Some(ProtectiveExit::MaDeviation { .. }) => {
            indicators.simple(&IndicatorType::Sma(strategy.deviation_period()), index)
        }
        _ => None,
    };
    let bands = indicators.bands(&strategy.bands().indicator(), index);

    ExitLevels {
        atr,
        ma,
        upper_band: bands.map(|b| b.0),
        middle_band: bands.map(|b| b.1),
        lower_band: bands.map(|b| b.2),
    }
}

pub fn run_backtest(
    instrument: &str,
    bars: &[OhlcvBar],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, QuantError> {
    validate_bars(instrument, bars, config.min_bars)?;

    let indicators = compute_indicators(bars, &strategy.required_indicators());
    check_indicators(instrument, &indicators)?;
    let signals = generate_signals(strategy, bars, &indicators);

    let sizer = config.sizer();
    let mut simulator = EquitySimulator::new(config.initial_capital, config.commission_rate);
    let mut state = PositionState::Flat;
    let mut counts = SignalCounts::default();

    let mut records = Vec::with_capacity(bars.len());
    let mut equity = Vec::with_capacity(bars.len());
    let mut trades = Vec::new();

    for (i, bar) in bars.iter().enumerate() {
        let input = BarInput {
            bar,
            signal: signals[i],
            cash: simulator.cash(),
            levels: exit_levels(strategy, &indicators, i),
        };
        let prior_stop = state.open_position().and_then(|p| p.stop_price);
        let (next, event) = step(state, &input, &strategy.exits, sizer.as_ref());
        state = next;

        let point = simulator.apply(bar, event.as_ref());
        if !point.capital.is_finite() {
            return Err(QuantError::StrategyFailure {
                instrument: instrument.to_string(),
                reason: format!("capital is not finite on {}", bar.date),
            });
        }

        let signal = match &event {
            Some(PositionEvent::Entered { price, shares, .. }) => {
                counts.buy_signals += 1;
                debug!(
                    instrument,
                    date = %bar.date,
                    price = *price,
                    shares = *shares,
                    "entered"
                );
                1
            }
            Some(PositionEvent::Exited(trade)) => {
                counts.sell_signals += 1;
                debug!(
                    instrument,
                    date = %bar.date,
                    price = trade.exit_price,
                    pnl = trade.pnl,
                    reason = %trade.exit_reason,
                    "exited"
                );
                -1
            }
            None => 0,
        };
        // The exit bar keeps the closed position's hold count and stop.
        let (hold_days, stop_price) = match (&event, state.open_position()) {
            (Some(PositionEvent::Exited(trade)), _) => (trade.hold_days, prior_stop),
            (_, Some(open)) => (open.hold_days, open.stop_price),
            (_, None) => (0, None),
        };
        if let Some(PositionEvent::Exited(trade)) = event {
            trades.push(trade);
        }

        records.push(BarRecord {
            date: bar.date,
            close: bar.close,
            signal,
            position: state.open_position().map_or(0, |p| p.shares),
            hold_days,
            stop_price,
            capital: point.capital,
            cumulative_return: point.cumulative_return,
        });
        equity.push(point);
    }

    let summary = PerformanceSummary::compute(
        &equity,
        &trades,
        counts,
        config.risk_free_rate,
        config.win_rate,
    );

    Ok(BacktestResult {
        instrument: instrument.to_string(),
        strategy: strategy.name().to_string(),
        trade_stats: TradeStats::from_trades(&trades),
        buy_and_hold_return: buy_and_hold_return(bars),
        records,
        trades,
        equity,
        summary,
    })
}
