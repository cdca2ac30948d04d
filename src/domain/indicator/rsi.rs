//! RSI (Relative Strength Index) indicator implementation.
//!
//! Uses simple rolling means for average gain/loss:
//! - gain[i] = max(C[i] - C[i-1], 0), loss[i] = max(C[i-1] - C[i], 0)
//! - The first bar has no prior close and contributes a zero change
//! - avg_gain / avg_loss: mean over at most n changes ending at bar i
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 50 (neutral)
//!
//! No warmup: every bar carries a value.

use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub const NEUTRAL_RSI: f64 = 50.0;

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut gains = Vec::with_capacity(bars.len());
    let mut losses = Vec::with_capacity(bars.len());

    for i in 0..bars.len() {
        let change = if i == 0 {
            0.0
        } else {
            bars[i].close - bars[i - 1].close
        };
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let avg_gains = rolling_mean(&gains, period);
    let avg_losses = rolling_mean(&losses, period);

    let values = bars
        .iter()
        .zip(avg_gains.iter().zip(avg_losses.iter()))
        .map(|(bar, (&avg_gain, &avg_loss))| {
            let rsi = if avg_loss == 0.0 {
                NEUTRAL_RSI
            } else {
                100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
            };
            IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::Simple(rsi),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bar(date: &str, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    fn rsi_at(series: &IndicatorSeries, i: usize) -> f64 {
        match series.values[i].value {
            IndicatorValue::Simple(v) => v,
            _ => panic!("Expected Simple value"),
        }
    }

    #[test]
    fn rsi_empty_bars() {
        let bars: Vec<OhlcvBar> = vec![];
        let series = calculate_rsi(&bars, 14);
        assert_eq!(series.values.len(), 0);
    }

    #[test]
    fn rsi_single_bar_is_neutral() {
        let bars = vec![make_bar("2024-01-01", 100.0)];
        let series = calculate_rsi(&bars, 14);
        assert_eq!(series.values.len(), 1);
        assert!(series.values[0].valid);
        assert!((rsi_at(&series, 0) - NEUTRAL_RSI).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_gains_no_losses_is_neutral() {
        let bars: Vec<OhlcvBar> = (0..15)
            .map(|i| {
                let date = format!("2024-01-{:02}", i + 1);
                make_bar(&date, 100.0 + i as f64)
            })
            .collect();

        let series = calculate_rsi(&bars, 14);
        assert!(
            (rsi_at(&series, 14) - NEUTRAL_RSI).abs() < f64::EPSILON,
            "zero average loss must fall back to the neutral value"
        );
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let bars: Vec<OhlcvBar> = (0..15)
            .map(|i| {
                let date = format!("2024-01-{:02}", i + 1);
                make_bar(&date, 100.0 - i as f64)
            })
            .collect();

        let series = calculate_rsi(&bars, 14);
        assert!(rsi_at(&series, 14).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_known_calculation() {
        // changes: 0, +2, -1, +3 ; period 3 at bar 3 → gains [2,0,3], losses [0,1,0]
        let bars = vec![
            make_bar("2024-01-01", 10.0),
            make_bar("2024-01-02", 12.0),
            make_bar("2024-01-03", 11.0),
            make_bar("2024-01-04", 14.0),
        ];
        let series = calculate_rsi(&bars, 3);
        let avg_gain = 5.0 / 3.0;
        let avg_loss = 1.0 / 3.0;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert!((rsi_at(&series, 3) - expected).abs() < 1e-9);
    }

    #[test]
    fn rsi_in_range() {
        let bars: Vec<OhlcvBar> = (1..=20)
            .map(|i| {
                let date = format!("2024-01-{:02}", i);
                let close = 100.0 + (i as f64 % 7.0 - 3.0) * 2.0;
                make_bar(&date, close)
            })
            .collect();

        let series = calculate_rsi(&bars, 7);

        for point in &series.values {
            if let IndicatorValue::Simple(rsi) = point.value {
                assert!((0.0..=100.0).contains(&rsi), "RSI {} out of range", rsi);
            }
        }
    }

    #[test]
    fn rsi_indicator_type() {
        let bars = vec![make_bar("2024-01-01", 100.0)];
        let series = calculate_rsi(&bars, 7);
        assert_eq!(series.indicator_type, IndicatorType::Rsi(7));
    }
}
