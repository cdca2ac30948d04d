//! Position state machine.
//!
//! `step` is the whole transition function: it takes the state before a bar
//! and returns the state after it, plus the event (if any) the bar produced.
//! Folding it over the bars of an instrument replays a backtest.

use chrono::NaiveDate;
use std::fmt;

use crate::domain::indicator::bollinger::band_position;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::signal::RawSignal;
use crate::domain::strategy::{ExitRules, ProtectiveExit, StopFill, StopRule};

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub shares: u64,
    /// Bars held, counting the entry bar.
    pub hold_days: u32,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    pub high_water_mark: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long(OpenPosition),
}

impl PositionState {
    pub fn open_position(&self) -> Option<&OpenPosition> {
        match self {
            PositionState::Long(pos) => Some(pos),
            PositionState::Flat => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    SignalReversal,
    StopLoss,
    TakeProfit,
    Deviation,
    MidBandReversion,
    MaxLoss,
    TimeExit,
}

impl ExitReason {
    pub const ALL: [ExitReason; 7] = [
        ExitReason::SignalReversal,
        ExitReason::StopLoss,
        ExitReason::TakeProfit,
        ExitReason::Deviation,
        ExitReason::MidBandReversion,
        ExitReason::MaxLoss,
        ExitReason::TimeExit,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ExitReason::SignalReversal => "signal reversal",
            ExitReason::StopLoss => "stop-loss",
            ExitReason::TakeProfit => "take-profit",
            ExitReason::Deviation => "deviation",
            ExitReason::MidBandReversion => "mid-band reversion",
            ExitReason::MaxLoss => "max loss",
            ExitReason::TimeExit => "time exit",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub shares: u64,
    pub hold_days: u32,
    /// Per-share profit: exit_price - entry_price.
    pub pnl: f64,
    /// pnl / entry_price, as a fraction.
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn gross_pnl(&self) -> f64 {
        self.pnl * self.shares as f64
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    Entered {
        date: NaiveDate,
        price: f64,
        shares: u64,
    },
    Exited(TradeRecord),
}

/// Indicator levels the exit rules read on the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExitLevels {
    pub atr: Option<f64>,
    pub ma: Option<f64>,
    pub upper_band: Option<f64>,
    pub middle_band: Option<f64>,
    pub lower_band: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct BarInput<'a> {
    pub bar: &'a OhlcvBar,
    pub signal: RawSignal,
    /// Cash available before this bar's fills.
    pub cash: f64,
    pub levels: ExitLevels,
}

pub trait PositionSizer {
    /// Share count to buy at `price` with `cash`; 0 means no entry.
    fn shares(&self, price: f64, cash: f64) -> u64;
}

/// Largest multiple of `lot_size` whose cost including commission fits in cash.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotSizer {
    pub lot_size: u64,
    pub commission_rate: f64,
}

impl PositionSizer for LotSizer {
    fn shares(&self, price: f64, cash: f64) -> u64 {
        let tradable = price.is_finite() && price > 0.0 && cash > 0.0;
        if self.lot_size == 0 || !tradable {
            return 0;
        }
        let lot_cost = price * self.lot_size as f64 * (1.0 + self.commission_rate);
        let lots = (cash / lot_cost).floor();
        if !lots.is_finite() {
            return 0;
        }
        lots as u64 * self.lot_size
    }
}

/// Always the same share count, provided cash covers it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedShares {
    pub shares: u64,
    pub commission_rate: f64,
}

impl PositionSizer for FixedShares {
    fn shares(&self, price: f64, cash: f64) -> u64 {
        if !price.is_finite() || price <= 0.0 {
            return 0;
        }
        let cost = self.shares as f64 * price * (1.0 + self.commission_rate);
        if cost <= cash { self.shares } else { 0 }
    }
}

fn initial_stop(rule: &StopRule, entry_price: f64, levels: &ExitLevels) -> Option<f64> {
    match rule {
        StopRule::None => None,
        StopRule::Percent(pct) => Some(entry_price * (1.0 - pct)),
        StopRule::Atr { multiplier, .. } => levels.atr.map(|atr| entry_price - multiplier * atr),
        // Checked against the live band on each close instead.
        StopRule::LowerBand => None,
    }
}

fn trailing_candidate(rule: &StopRule, high_water_mark: f64, levels: &ExitLevels) -> Option<f64> {
    match rule {
        StopRule::Percent(pct) => Some(high_water_mark * (1.0 - pct)),
        StopRule::Atr { multiplier, .. } => {
            levels.atr.map(|atr| high_water_mark - multiplier * atr)
        }
        StopRule::None | StopRule::LowerBand => None,
    }
}

fn protective_triggered(
    exit: &ProtectiveExit,
    pos: &OpenPosition,
    close: f64,
    levels: &ExitLevels,
) -> Option<ExitReason> {
    match exit {
        ProtectiveExit::MaDeviation { max_deviation } => {
            let ma = levels.ma?;
            (close > ma * (1.0 + max_deviation)).then_some(ExitReason::Deviation)
        }
        ProtectiveExit::MidBandReversion { tolerance } => {
            let middle = levels.middle_band.filter(|m| *m != 0.0)?;
            (((close - middle) / middle).abs() < *tolerance)
                .then_some(ExitReason::MidBandReversion)
        }
        ProtectiveExit::BandPosition { threshold } => {
            let position = band_position(close, levels.upper_band?, levels.lower_band?)?;
            (position > *threshold).then_some(ExitReason::MidBandReversion)
        }
        ProtectiveExit::MaxLoss(max_loss) => {
            let change = (close - pos.entry_price) / pos.entry_price;
            (change <= -max_loss).then_some(ExitReason::MaxLoss)
        }
    }
}

/// Close below the current lower band. The band sits above an oversold entry,
/// so it cannot be a fixed intrabar level.
fn band_stop_breached(rule: &StopRule, close: f64, levels: &ExitLevels) -> bool {
    matches!(rule, StopRule::LowerBand) && levels.lower_band.is_some_and(|lower| close < lower)
}

/// First exit condition that fires, in priority order.
fn exit_reason(
    pos: &OpenPosition,
    input: &BarInput<'_>,
    rules: &ExitRules,
    hold_days: u32,
) -> Option<ExitReason> {
    let bar = input.bar;

    if input.signal == RawSignal::Exit {
        return Some(ExitReason::SignalReversal);
    }
    if pos.stop_price.is_some_and(|stop| bar.low <= stop)
        || band_stop_breached(&rules.stop, bar.close, &input.levels)
    {
        return Some(ExitReason::StopLoss);
    }
    if pos.take_profit_price.is_some_and(|tp| bar.high >= tp) {
        return Some(ExitReason::TakeProfit);
    }
    if let Some(reason) = rules
        .protective
        .as_ref()
        .and_then(|p| protective_triggered(p, pos, bar.close, &input.levels))
    {
        return Some(reason);
    }
    if rules.max_hold_days.is_some_and(|max| hold_days >= max) {
        return Some(ExitReason::TimeExit);
    }
    None
}

fn fill_price(reason: ExitReason, pos: &OpenPosition, bar: &OhlcvBar, fill: StopFill) -> f64 {
    match (reason, fill, pos.stop_price) {
        (ExitReason::StopLoss, StopFill::StopPrice, Some(stop)) => stop.min(bar.open),
        _ => bar.close,
    }
}

/// Advance the state machine by one bar.
pub fn step(
    state: PositionState,
    input: &BarInput<'_>,
    rules: &ExitRules,
    sizer: &dyn PositionSizer,
) -> (PositionState, Option<PositionEvent>) {
    let bar = input.bar;

    match state {
        PositionState::Flat => {
            if input.signal != RawSignal::Enter {
                return (PositionState::Flat, None);
            }
            let shares = sizer.shares(bar.close, input.cash);
            if shares == 0 {
                return (PositionState::Flat, None);
            }
            let entry_price = bar.close;
            let pos = OpenPosition {
                entry_price,
                entry_date: bar.date,
                shares,
                hold_days: 1,
                stop_price: initial_stop(&rules.stop, entry_price, &input.levels),
                take_profit_price: rules.take_profit_pct.map(|tp| entry_price * (1.0 + tp)),
                high_water_mark: entry_price,
            };
            let event = PositionEvent::Entered {
                date: bar.date,
                price: entry_price,
                shares,
            };
            (PositionState::Long(pos), Some(event))
        }
        PositionState::Long(mut pos) => {
            let hold_days = pos.hold_days + 1;

            if let Some(reason) = exit_reason(&pos, input, rules, hold_days) {
                let exit_price = fill_price(reason, &pos, bar, rules.stop_fill);
                let pnl = exit_price - pos.entry_price;
                let trade = TradeRecord {
                    entry_date: pos.entry_date,
                    exit_date: bar.date,
                    entry_price: pos.entry_price,
                    exit_price,
                    shares: pos.shares,
                    hold_days,
                    pnl,
                    pnl_pct: pnl / pos.entry_price,
                    exit_reason: reason,
                };
                return (PositionState::Flat, Some(PositionEvent::Exited(trade)));
            }

            pos.hold_days = hold_days;
            pos.high_water_mark = pos.high_water_mark.max(bar.high);
            if rules.trailing {
                if let Some(candidate) =
                    trailing_candidate(&rules.stop, pos.high_water_mark, &input.levels)
                {
                    pos.stop_price = Some(match pos.stop_price {
                        Some(stop) => stop.max(candidate),
                        None => candidate,
                    });
                }
            }
            (PositionState::Long(pos), None)
        }
    }
}
