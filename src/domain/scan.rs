//! Multi-strategy scan.
//!
//! Runs every preset with its default parameters over each instrument and
//! keeps the state of the last bar, so open positions can be read off at a
//! glance.

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::backtest::{BacktestConfig, BarRecord, run_backtest, validate_bars};
use crate::domain::error::QuantError;
use crate::domain::strategy::{Preset, Strategy};
use crate::domain::universe::SkippedInstrument;
use crate::ports::data_port::DataPort;

/// Last-bar state of one preset on one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub instrument: String,
    pub strategy: String,
    pub date: Option<NaiveDate>,
    pub close: Option<f64>,
    /// 1 entered on the last bar, -1 exited, 0 otherwise.
    pub signal: Option<i8>,
    pub position: Option<u64>,
    pub hold_days: Option<u32>,
    /// Days held while a position is open, 0 when flat.
    pub held_days: Option<u32>,
    pub stop_price: Option<f64>,
    /// Set when the preset failed on this instrument; the state columns are empty.
    pub error: Option<String>,
}

impl ScanRow {
    fn from_record(instrument: &str, preset: Preset, last: &BarRecord) -> Self {
        ScanRow {
            instrument: instrument.to_string(),
            strategy: preset.name().to_string(),
            date: Some(last.date),
            close: Some(last.close),
            signal: Some(last.signal),
            position: Some(last.position),
            hold_days: Some(last.hold_days),
            held_days: Some(if last.position > 0 { last.hold_days } else { 0 }),
            stop_price: last.stop_price,
            error: None,
        }
    }

    fn failed(instrument: &str, preset: Preset, reason: String) -> Self {
        ScanRow {
            instrument: instrument.to_string(),
            strategy: preset.name().to_string(),
            date: None,
            close: None,
            signal: None,
            position: None,
            hold_days: None,
            held_days: None,
            stop_price: None,
            error: Some(reason),
        }
    }

    pub fn is_holding(&self) -> bool {
        self.position.is_some_and(|shares| shares > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Ordered by instrument, then preset order.
    pub rows: Vec<ScanRow>,
    /// Instruments whose bars could not be loaded or validated.
    pub skipped: Vec<SkippedInstrument>,
}

impl ScanOutcome {
    pub fn holding(&self) -> impl Iterator<Item = &ScanRow> {
        self.rows.iter().filter(|r| r.is_holding())
    }
}

enum InstrumentScan {
    Rows(Vec<ScanRow>),
    Skipped(SkippedInstrument),
}

fn scan_instrument(
    data_port: &dyn DataPort,
    instrument: &str,
    strategies: &[Strategy],
    config: &BacktestConfig,
) -> Result<InstrumentScan, QuantError> {
    let skip = |reason: String| {
        warn!(instrument, %reason, "skipping instrument");
        Ok(InstrumentScan::Skipped(SkippedInstrument {
            instrument: instrument.to_string(),
            reason,
        }))
    };

    let bars = match data_port.load_bars(instrument) {
        Ok(bars) => bars,
        Err(e) if e.is_instrument_local() => return skip(e.to_string()),
        Err(e) => return Err(e),
    };
    if let Err(e) = validate_bars(instrument, &bars, config.min_bars) {
        return skip(e.to_string());
    }

    let mut rows = Vec::with_capacity(strategies.len());
    for strategy in strategies {
        let row = match run_backtest(instrument, &bars, strategy, config) {
            Ok(result) => match result.records.last() {
                Some(last) => ScanRow::from_record(instrument, strategy.preset, last),
                None => ScanRow::failed(instrument, strategy.preset, "no bars".to_string()),
            },
            Err(e) if e.is_instrument_local() => {
                warn!(instrument, strategy = %strategy.preset, error = %e, "preset failed");
                ScanRow::failed(instrument, strategy.preset, e.to_string())
            }
            Err(e) => return Err(e),
        };
        rows.push(row);
    }
    Ok(InstrumentScan::Rows(rows))
}

/// Run each preset, with default parameters, over every instrument.
pub fn run_scan(
    data_port: &dyn DataPort,
    instruments: &[String],
    presets: &[Preset],
    config: &BacktestConfig,
    parallel: bool,
) -> Result<ScanOutcome, QuantError> {
    info!(
        instruments = instruments.len(),
        presets = presets.len(),
        parallel,
        "starting scan"
    );
    let strategies: Vec<Strategy> = presets.iter().map(|p| Strategy::from_preset(*p)).collect();

    let scans: Vec<Result<InstrumentScan, QuantError>> = if parallel {
        instruments
            .par_iter()
            .map(|id| scan_instrument(data_port, id, &strategies, config))
            .collect()
    } else {
        instruments
            .iter()
            .map(|id| scan_instrument(data_port, id, &strategies, config))
            .collect()
    };

    let mut per_instrument = Vec::new();
    let mut skipped = Vec::new();
    for scan in scans {
        match scan? {
            InstrumentScan::Rows(rows) => per_instrument.push(rows),
            InstrumentScan::Skipped(skip) => skipped.push(skip),
        }
    }
    if per_instrument.is_empty() {
        return Err(QuantError::NoSuccessfulResults {
            attempted: instruments.len(),
        });
    }
    per_instrument.sort_by_key(|rows| rows.first().map(|r| r.instrument.clone()));
    skipped.sort_by(|a, b| a.instrument.cmp(&b.instrument));
    let rows: Vec<ScanRow> = per_instrument.into_iter().flatten().collect();

    info!(
        rows = rows.len(),
        holding = rows.iter().filter(|r| r.is_holding()).count(),
        skipped = skipped.len(),
        "scan finished"
    );
    Ok(ScanOutcome { rows, skipped })
}
