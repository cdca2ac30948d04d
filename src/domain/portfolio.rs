//! Cash and equity tracking for a single-instrument backtest.

use chrono::NaiveDate;

use super::ohlcv::OhlcvBar;
use super::position::PositionEvent;

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub cash: f64,
    pub position_value: f64,
    pub capital: f64,
    pub daily_return: f64,
    pub cumulative_return: f64,
}

/// Applies position events to a cash balance and marks the holding to market
/// once per bar.
#[derive(Debug, Clone, PartialEq)]
pub struct EquitySimulator {
    cash: f64,
    shares: u64,
    commission_rate: f64,
    prev_capital: f64,
    cumulative_return: f64,
}

impl EquitySimulator {
    pub fn new(initial_capital: f64, commission_rate: f64) -> Self {
        EquitySimulator {
            cash: initial_capital,
            shares: 0,
            commission_rate,
            prev_capital: initial_capital,
            cumulative_return: 1.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn shares(&self) -> u64 {
        self.shares
    }

    /// Apply this bar's event (if any) and record the bar's equity point.
    pub fn apply(&mut self, bar: &OhlcvBar, event: Option<&PositionEvent>) -> EquityPoint {
        match event {
            Some(PositionEvent::Entered { price, shares, .. }) => {
                self.cash -= *shares as f64 * price * (1.0 + self.commission_rate);
                self.shares = *shares;
            }
            Some(PositionEvent::Exited(trade)) => {
                self.cash += trade.shares as f64 * trade.exit_price * (1.0 - self.commission_rate);
                self.shares = 0;
            }
            None => {}
        }

        let position_value = self.shares as f64 * bar.close;
        let capital = self.cash + position_value;
        let daily_return = if self.prev_capital == 0.0 {
            0.0
        } else {
            capital / self.prev_capital - 1.0
        };
        self.cumulative_return *= 1.0 + daily_return;
        self.prev_capital = capital;

        EquityPoint {
            date: bar.date,
            cash: self.cash,
            position_value,
            capital,
            daily_return,
            cumulative_return: self.cumulative_return,
        }
    }
}
