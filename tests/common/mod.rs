#![allow(dead_code)]

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use dailyquant::domain::backtest::BacktestConfig;
use dailyquant::domain::error::QuantError;
pub use dailyquant::domain::ohlcv::OhlcvBar;
use dailyquant::domain::strategy::{
    EntryFilters, ExitRules, Preset, Strategy, StrategyKind,
};
use dailyquant::ports::data_port::DataPort;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, instrument: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(instrument.to_string(), bars);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn load_bars(&self, instrument: &str) -> Result<Vec<OhlcvBar>, QuantError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(QuantError::Data {
                reason: reason.clone(),
            });
        }
        self.data
            .get(instrument)
            .cloned()
            .ok_or_else(|| QuantError::Data {
                reason: format!("no data for {}", instrument),
            })
    }

    fn list_instruments(&self) -> Result<Vec<String>, QuantError> {
        let mut ids: Vec<String> = self.data.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` consecutive weekdays starting at 2020-01-02.
pub fn trading_days(n: usize) -> Vec<NaiveDate> {
    let mut days = Vec::with_capacity(n);
    let mut d = date(2020, 1, 2);
    while days.len() < n {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(d);
        }
        d += Duration::days(1);
    }
    days
}

/// Flat bars (open = high = low = close) with constant volume.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    trading_days(closes.len())
        .into_iter()
        .zip(closes)
        .map(|(date, &close)| OhlcvBar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 10_000.0,
        })
        .collect()
}

/// Oscillating series with a slow drift; produces regular crossovers.
pub fn wave_bars(n: usize, base: f64) -> Vec<OhlcvBar> {
    trading_days(n)
        .into_iter()
        .enumerate()
        .map(|(i, date)| {
            let t = i as f64;
            let close = base * (1.0 + 0.12 * (t / 9.0).sin() + 0.0005 * t);
            let open = base * (1.0 + 0.12 * ((t - 0.5) / 9.0).sin() + 0.0005 * t);
            OhlcvBar {
                date,
                open,
                high: open.max(close) * 1.01,
                low: open.min(close) * 0.99,
                close,
                volume: 10_000.0 * (1.0 + 0.6 * (t / 4.0).cos().abs()),
            }
        })
        .collect()
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig::default()
}

/// Close crossing SMA(period) with no filters or exits beyond the reversal.
pub fn plain_ma_strategy(period: usize) -> Strategy {
    Strategy {
        preset: Preset::MovingAverage,
        kind: StrategyKind::PriceMaCross { period },
        filters: EntryFilters::default(),
        exits: ExitRules::default(),
    }
}

/// Write bars as `<dir>/<instrument>_day_data.csv`.
pub fn write_csv(dir: &Path, instrument: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        let _ = writeln!(
            content,
            "{},{},{},{},{},{}",
            b.date, b.open, b.high, b.low, b.close, b.volume
        );
    }
    std::fs::write(dir.join(format!("{}_day_data.csv", instrument)), content).unwrap();
}
