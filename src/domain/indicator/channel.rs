//! Box (price channel) indicator.
//!
//! BOX(n)[i].upper = max(H[j] for j in [max(0, i-n), i-1])
//! BOX(n)[i].lower = min(L[j] for j in [max(0, i-n), i-1])
//!
//! The channel is built strictly from bars before the current one, so a
//! close can be compared against it without looking at itself.
//! Warmup: bar 0 is invalid (no prior bars).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_box(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let period = period.max(1);
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let start = i.saturating_sub(period);
        let prior = &bars[start..i];

        let value = if prior.is_empty() {
            IndicatorValue::Channel {
                upper: 0.0,
                lower: 0.0,
            }
        } else {
            let upper = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let lower = prior.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            IndicatorValue::Channel { upper, lower }
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid: !prior.is_empty(),
            value,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Box(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bar(day: u32, high: f64, low: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1000.0,
        }
    }

    #[test]
    fn box_first_bar_invalid() {
        let bars = vec![make_bar(1, 11.0, 9.0), make_bar(2, 12.0, 10.0)];
        let series = calculate_box(&bars, 20);
        assert!(!series.values[0].valid);
        assert!(series.values[1].valid);
        assert_eq!(
            series.values[1].value,
            IndicatorValue::Channel {
                upper: 11.0,
                lower: 9.0
            }
        );
    }

    #[test]
    fn box_excludes_current_bar() {
        let bars = vec![
            make_bar(1, 11.0, 9.0),
            make_bar(2, 12.0, 10.0),
            make_bar(3, 50.0, 1.0),
        ];
        let series = calculate_box(&bars, 20);
        assert_eq!(
            series.values[2].value,
            IndicatorValue::Channel {
                upper: 12.0,
                lower: 9.0
            }
        );
    }

    #[test]
    fn box_window_slides() {
        let bars = vec![
            make_bar(1, 20.0, 1.0),
            make_bar(2, 12.0, 10.0),
            make_bar(3, 13.0, 11.0),
            make_bar(4, 14.0, 12.0),
        ];
        let series = calculate_box(&bars, 2);
        // bar 3 sees bars 1 and 2 only
        assert_eq!(
            series.values[3].value,
            IndicatorValue::Channel {
                upper: 13.0,
                lower: 10.0
            }
        );
    }

    #[test]
    fn box_indicator_type() {
        let series = calculate_box(&[], 20);
        assert_eq!(series.indicator_type, IndicatorType::Box(20));
        assert!(series.values.is_empty());
    }
}
