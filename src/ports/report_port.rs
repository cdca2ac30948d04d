//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuantError;
use crate::domain::optimize::OptimizationOutcome;
use crate::domain::scan::ScanOutcome;
use crate::domain::universe::BatchOutcome;

/// Port for writing backtest reports.
pub trait ReportPort {
    /// Per-instrument detail. Default: nothing to write.
    fn write_instrument(&self, _result: &BacktestResult) -> Result<(), QuantError> {
        Ok(())
    }

    /// Batch results table and aggregate summary.
    fn write_batch(&self, strategy_name: &str, outcome: &BatchOutcome) -> Result<(), QuantError>;

    /// Ranked parameter combinations for one instrument.
    fn write_optimization(&self, outcome: &OptimizationOutcome) -> Result<(), QuantError>;

    /// One row per instrument and preset.
    fn write_scan(&self, outcome: &ScanOutcome) -> Result<(), QuantError>;
}
