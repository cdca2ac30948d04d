//! Multi-instrument batch runs.
//!
//! Parses instrument lists from configuration and runs one independent
//! backtest per instrument, optionally on the rayon pool. Failures stay local
//! to their instrument and are reported as skips.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::domain::backtest::{BacktestConfig, BacktestResult, run_backtest};
use crate::domain::error::QuantError;
use crate::domain::metrics::{BatchSummary, MIN_EQUITY_POINTS, PerformanceSummary};
use crate::domain::strategy::Strategy;
use crate::ports::data_port::DataPort;

pub const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in instrument list")]
    EmptyToken,

    #[error("duplicate instrument: {0}")]
    DuplicateInstrument(String),
}

/// Split a comma-separated instrument list. Ids are kept verbatim apart from
/// surrounding whitespace.
pub fn parse_instruments(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(UniverseError::DuplicateInstrument(trimmed.to_string()));
        }
        ids.push(trimmed.to_string());
    }

    Ok(ids)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedInstrument {
    pub instrument: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Successful runs, ordered by instrument id.
    pub results: Vec<BacktestResult>,
    /// Rejected instruments, ordered by instrument id.
    pub skipped: Vec<SkippedInstrument>,
    pub summary: BatchSummary,
}

impl BatchOutcome {
    /// `(instrument, summary)` for every successful run.
    pub fn summaries(&self) -> Vec<(&str, &PerformanceSummary)> {
        summaries_of(&self.results)
    }
}

fn summaries_of(results: &[BacktestResult]) -> Vec<(&str, &PerformanceSummary)> {
    results
        .iter()
        .filter_map(|r| r.summary.as_ref().map(|s| (r.instrument.as_str(), s)))
        .collect()
}

enum InstrumentOutcome {
    Completed(BacktestResult),
    Skipped(SkippedInstrument),
}

fn run_instrument(
    data_port: &dyn DataPort,
    instrument: &str,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<InstrumentOutcome, QuantError> {
    let skip = |reason: String| {
        warn!(instrument, %reason, "skipping instrument");
        Ok(InstrumentOutcome::Skipped(SkippedInstrument {
            instrument: instrument.to_string(),
            reason,
        }))
    };

    let bars = match data_port.load_bars(instrument) {
        Ok(bars) => bars,
        Err(e) if e.is_instrument_local() => return skip(e.to_string()),
        Err(e) => return Err(e),
    };
    info!(instrument, bars = bars.len(), "loaded bars");

    let result = match run_backtest(instrument, &bars, strategy, config) {
        Ok(result) => result,
        Err(e) if e.is_instrument_local() => return skip(e.to_string()),
        Err(e) => return Err(e),
    };

    match &result.summary {
        Some(summary) => {
            info!(
                instrument,
                trades = summary.trade_count,
                total_return = summary.total_return,
                "backtest completed"
            );
            Ok(InstrumentOutcome::Completed(result))
        }
        None => skip(format!("fewer than {} equity points", MIN_EQUITY_POINTS)),
    }
}

/// Backtest every instrument with the same strategy and configuration.
///
/// Returns `NoSuccessfulResults` only when no instrument produced a summary;
/// any partial success is returned with the skips listed.
pub fn run_batch(
    data_port: &dyn DataPort,
    instruments: &[String],
    strategy: &Strategy,
    config: &BacktestConfig,
    parallel: bool,
) -> Result<BatchOutcome, QuantError> {
    info!(
        strategy = %strategy.name(),
        instruments = instruments.len(),
        parallel,
        "starting batch"
    );

    let outcomes: Vec<Result<InstrumentOutcome, QuantError>> = if parallel {
        instruments
            .par_iter()
            .map(|id| run_instrument(data_port, id, strategy, config))
            .collect()
    } else {
        instruments
            .iter()
            .map(|id| run_instrument(data_port, id, strategy, config))
            .collect()
    };

    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome? {
            InstrumentOutcome::Completed(result) => results.push(result),
            InstrumentOutcome::Skipped(skip) => skipped.push(skip),
        }
    }
    results.sort_by(|a, b| a.instrument.cmp(&b.instrument));
    skipped.sort_by(|a, b| a.instrument.cmp(&b.instrument));

    if results.is_empty() {
        return Err(QuantError::NoSuccessfulResults {
            attempted: instruments.len(),
        });
    }

    let summary =
        BatchSummary::from_results(&summaries_of(&results), instruments.len(), DEFAULT_TOP_N);

    info!(
        succeeded = summary.succeeded,
        skipped = skipped.len(),
        "batch finished"
    );

    Ok(BatchOutcome {
        results,
        skipped,
        summary,
    })
}
