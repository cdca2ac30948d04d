//! CSV and plain-text report adapter.
//!
//! Writes `<strategy>_results.csv` and `<strategy>_summary.txt` for a batch
//! (plus `<strategy>_sectors.csv` when a sector map is loaded),
//! `<instrument>_bars.csv`, `<instrument>_trades.csv` and
//! `<instrument>_trade_stats.csv` for per-instrument detail,
//! `<strategy>_<instrument>_optimize.csv` for a grid search and
//! `batch_summary.csv` for a scan.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuantError;
use crate::domain::metrics::{Bucket, RankedInstrument, SectorSummary, TradeStats};
use crate::domain::optimize::OptimizationOutcome;
use crate::domain::scan::ScanOutcome;
use crate::domain::universe::BatchOutcome;
use crate::ports::report_port::ReportPort;

const RESULT_HEADER: [&str; 22] = [
    "instrument",
    "bars",
    "last_date",
    "final_capital",
    "total_return",
    "annualized_return",
    "annualized_volatility",
    "sharpe_ratio",
    "max_drawdown",
    "trades",
    "win_rate",
    "monthly_win_rate",
    "max_consecutive_loss_days",
    "buy_signals",
    "sell_signals",
    "avg_win_pct",
    "avg_loss_pct",
    "profit_loss_ratio",
    "avg_hold_days",
    "max_consecutive_wins",
    "max_consecutive_losses",
    "buy_and_hold_return",
];

const SCAN_HEADER: [&str; 10] = [
    "instrument",
    "strategy",
    "date",
    "close",
    "signal",
    "position",
    "hold_days",
    "held_days",
    "stop_price",
    "error",
];

pub struct CsvReportAdapter {
    output_dir: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    fn ensure_dir(&self) -> Result<(), QuantError> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }

    fn writer(&self, file_name: &str) -> Result<csv::Writer<fs::File>, QuantError> {
        self.ensure_dir()?;
        let path = self.output_dir.join(file_name);
        csv::Writer::from_path(&path).map_err(|e| QuantError::Io(e.into()))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

fn pct(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}

fn csv_err(e: csv::Error) -> QuantError {
    QuantError::Io(e.into())
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_sectors(out: &mut String, sectors: &[SectorSummary]) {
    let _ = writeln!(out, "\nSectors:");
    for sector in sectors {
        let _ = writeln!(
            out,
            "  {:<16} {:>4} instruments  annualized {:>9}  drawdown {:>9}  sharpe {:>6.2}",
            sector.sector,
            sector.instruments,
            pct(sector.mean_annualized_return),
            pct(sector.mean_max_drawdown),
            sector.mean_sharpe
        );
    }
}

fn write_trade_stats(wtr: &mut csv::Writer<fs::File>, stats: &TradeStats) -> Result<(), QuantError> {
    wtr.write_record(["exit_reason", "trades", "mean_pnl_pct", "mean_hold_days"])
        .map_err(csv_err)?;
    wtr.write_record([
        "all".to_string(),
        stats.total_trades.to_string(),
        format!("{:.6}", stats.total_pnl_pct / stats.total_trades.max(1) as f64),
        format!("{:.2}", stats.avg_hold_days),
    ])
    .map_err(csv_err)?;
    for group in &stats.by_exit_reason {
        wtr.write_record([
            group.reason.label().to_string(),
            group.count.to_string(),
            format!("{:.6}", group.mean_pnl_pct),
            format!("{:.2}", group.mean_hold_days),
        ])
        .map_err(csv_err)?;
    }
    Ok(())
}

fn write_buckets(out: &mut String, title: &str, buckets: &[Bucket], total: usize) {
    let _ = writeln!(out, "\n{}", title);
    for bucket in buckets {
        let share = if total == 0 {
            0.0
        } else {
            bucket.count as f64 / total as f64
        };
        let _ = writeln!(
            out,
            "  {:<22} {:>6} ({})",
            bucket.label,
            bucket.count,
            pct(share)
        );
    }
}

fn write_ranking(out: &mut String, title: &str, ranked: &[RankedInstrument]) {
    let _ = writeln!(out, "\n{}", title);
    for (rank, entry) in ranked.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>2}. {:<12} annualized {:>9}  drawdown {:>9}  sharpe {:>6.2}",
            rank + 1,
            entry.instrument,
            pct(entry.annualized_return),
            pct(entry.max_drawdown),
            entry.sharpe_ratio
        );
    }
}

/// Human-readable batch summary.
pub fn render_summary(strategy_name: &str, outcome: &BatchOutcome) -> String {
    let s = &outcome.summary;
    let mut out = String::new();

    let _ = writeln!(out, "Strategy: {}", strategy_name);
    let _ = writeln!(out, "Instruments attempted: {}", s.attempted);
    let _ = writeln!(out, "Instruments succeeded: {}", s.succeeded);
    let _ = writeln!(out, "Instruments skipped:   {}", s.skipped);
    let _ = writeln!(
        out,
        "Positive return:       {} ({})",
        s.positive_return_count,
        pct(s.positive_rate())
    );
    let _ = writeln!(out, "Mean annualized return: {}", pct(s.mean_annualized_return));
    let _ = writeln!(out, "Mean max drawdown:      {}", pct(s.mean_max_drawdown));
    let _ = writeln!(out, "Mean Sharpe ratio:      {:.2}", s.mean_sharpe);

    write_buckets(&mut out, "Annualized return distribution:", &s.return_buckets, s.succeeded);
    write_buckets(&mut out, "Sharpe ratio distribution:", &s.sharpe_buckets, s.succeeded);
    write_buckets(&mut out, "Max drawdown distribution:", &s.drawdown_buckets, s.succeeded);

    write_ranking(&mut out, "Top by annualized return:", &s.top_by_return);
    write_ranking(&mut out, "Bottom by annualized return:", &s.bottom_by_return);
    write_ranking(&mut out, "Top by Sharpe ratio:", &s.top_by_sharpe);

    if !s.sectors.is_empty() {
        write_sectors(&mut out, &s.sectors);
    }

    if !outcome.skipped.is_empty() {
        let _ = writeln!(out, "\nSkipped:");
        for skip in &outcome.skipped {
            let _ = writeln!(out, "  {}: {}", skip.instrument, skip.reason);
        }
    }
    out
}

impl ReportPort for CsvReportAdapter {
    fn write_instrument(&self, result: &BacktestResult) -> Result<(), QuantError> {
        let mut bars = self.writer(&format!("{}_bars.csv", result.instrument))?;
        bars.write_record([
            "date",
            "close",
            "signal",
            "position",
            "hold_days",
            "stop_price",
            "capital",
            "cumulative_return",
        ])
        .map_err(csv_err)?;
        for r in &result.records {
            bars.write_record([
                r.date.to_string(),
                r.close.to_string(),
                r.signal.to_string(),
                r.position.to_string(),
                r.hold_days.to_string(),
                r.stop_price.map(|p| p.to_string()).unwrap_or_default(),
                r.capital.to_string(),
                r.cumulative_return.to_string(),
            ])
            .map_err(csv_err)?;
        }
        bars.flush()?;

        let mut trades = self.writer(&format!("{}_trades.csv", result.instrument))?;
        trades
            .write_record([
                "entry_date",
                "exit_date",
                "entry_price",
                "exit_price",
                "shares",
                "hold_days",
                "pnl",
                "gross_pnl",
                "pnl_pct",
                "exit_reason",
            ])
            .map_err(csv_err)?;
        for t in &result.trades {
            trades
                .write_record([
                    t.entry_date.to_string(),
                    t.exit_date.to_string(),
                    t.entry_price.to_string(),
                    t.exit_price.to_string(),
                    t.shares.to_string(),
                    t.hold_days.to_string(),
                    t.pnl.to_string(),
                    t.gross_pnl().to_string(),
                    t.pnl_pct.to_string(),
                    t.exit_reason.label().to_string(),
                ])
                .map_err(csv_err)?;
        }
        trades.flush()?;

        let mut stats = self.writer(&format!("{}_trade_stats.csv", result.instrument))?;
        write_trade_stats(&mut stats, &result.trade_stats)?;
        stats.flush()?;
        Ok(())
    }

    fn write_batch(&self, strategy_name: &str, outcome: &BatchOutcome) -> Result<(), QuantError> {
        let mut wtr = self.writer(&format!("{}_results.csv", strategy_name))?;
        wtr.write_record(RESULT_HEADER).map_err(csv_err)?;
        for result in &outcome.results {
            let Some(s) = &result.summary else { continue };
            let t = &result.trade_stats;
            wtr.write_record([
                result.instrument.clone(),
                s.bar_count.to_string(),
                s.last_date.to_string(),
                format!("{:.2}", s.final_capital),
                format!("{:.6}", s.total_return),
                format!("{:.6}", s.annualized_return),
                format!("{:.6}", s.annualized_volatility),
                format!("{:.4}", s.sharpe_ratio),
                format!("{:.6}", s.max_drawdown),
                s.trade_count.to_string(),
                format!("{:.4}", s.win_rate),
                format!("{:.4}", s.monthly_win_rate),
                s.max_consecutive_loss_days.to_string(),
                s.buy_signals.to_string(),
                s.sell_signals.to_string(),
                format!("{:.6}", t.avg_win_pct),
                format!("{:.6}", t.avg_loss_pct),
                opt(t.profit_loss_ratio.map(|r| format!("{:.4}", r))),
                format!("{:.2}", t.avg_hold_days),
                t.max_consecutive_wins.to_string(),
                t.max_consecutive_losses.to_string(),
                format!("{:.6}", result.buy_and_hold_return),
            ])
            .map_err(csv_err)?;
        }
        wtr.flush()?;

        let sectors = &outcome.summary.sectors;
        if !sectors.is_empty() {
            let mut wtr = self.writer(&format!("{}_sectors.csv", strategy_name))?;
            wtr.write_record([
                "sector",
                "instruments",
                "mean_annualized_return",
                "mean_max_drawdown",
                "mean_sharpe",
            ])
            .map_err(csv_err)?;
            for sector in sectors {
                wtr.write_record([
                    sector.sector.clone(),
                    sector.instruments.to_string(),
                    format!("{:.6}", sector.mean_annualized_return),
                    format!("{:.6}", sector.mean_max_drawdown),
                    format!("{:.4}", sector.mean_sharpe),
                ])
                .map_err(csv_err)?;
            }
            wtr.flush()?;
        }

        let summary_path = self.output_dir.join(format!("{}_summary.txt", strategy_name));
        fs::write(summary_path, render_summary(strategy_name, outcome))?;
        Ok(())
    }

    fn write_optimization(&self, outcome: &OptimizationOutcome) -> Result<(), QuantError> {
        let mut wtr = self.writer(&format!(
            "{}_{}_optimize.csv",
            outcome.strategy, outcome.instrument
        ))?;
        let keys = outcome.param_keys();
        let mut header = vec!["rank"];
        header.extend(keys.iter().copied());
        header.extend(["total_return", "win_rate", "trades", "max_consecutive_losses", "score"]);
        wtr.write_record(&header).map_err(csv_err)?;

        for (rank, entry) in outcome.ranked.iter().enumerate() {
            let mut row = vec![(rank + 1).to_string()];
            row.extend(entry.params.iter().map(|(_, value)| value.clone()));
            row.extend([
                format!("{:.6}", entry.total_return),
                format!("{:.4}", entry.win_rate),
                entry.trade_count.to_string(),
                entry.max_consecutive_losses.to_string(),
                format!("{:.4}", entry.score),
            ]);
            wtr.write_record(&row).map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_scan(&self, outcome: &ScanOutcome) -> Result<(), QuantError> {
        let mut wtr = self.writer("batch_summary.csv")?;
        wtr.write_record(SCAN_HEADER).map_err(csv_err)?;
        for row in &outcome.rows {
            wtr.write_record([
                row.instrument.clone(),
                row.strategy.clone(),
                opt(row.date),
                opt(row.close),
                opt(row.signal),
                opt(row.position),
                opt(row.hold_days),
                opt(row.held_days),
                opt(row.stop_price),
                row.error.clone().unwrap_or_default(),
            ])
            .map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Console listing of the best parameter combinations.
pub fn render_optimization(outcome: &OptimizationOutcome, top: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Strategy: {}", outcome.strategy);
    let _ = writeln!(out, "Instrument: {}", outcome.instrument);
    let _ = writeln!(
        out,
        "Combinations scored: {} (rejected {})",
        outcome.ranked.len(),
        outcome.rejected
    );
    for (rank, entry) in outcome.ranked.iter().take(top).enumerate() {
        let params: Vec<String> = entry
            .params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        let _ = writeln!(
            out,
            "  {:>2}. score {:>8.4}  return {:>9}  win rate {:>7}  trades {:>4}  {}",
            rank + 1,
            entry.score,
            pct(entry.total_return),
            pct(entry.win_rate),
            entry.trade_count,
            params.join(" ")
        );
    }
    out
}

/// Console listing of open positions found by a scan.
pub fn render_scan(outcome: &ScanOutcome) -> String {
    let mut out = String::new();
    let holding: Vec<_> = outcome.holding().collect();
    let _ = writeln!(
        out,
        "Rows: {}  holding: {}  skipped instruments: {}",
        outcome.rows.len(),
        holding.len(),
        outcome.skipped.len()
    );
    for row in holding {
        let _ = writeln!(
            out,
            "  {:<12} {:<20} held {:>3} days  stop {}",
            row.instrument,
            row.strategy,
            row.held_days.unwrap_or(0),
            row.stop_price.map_or("-".to_string(), |p| format!("{:.2}", p))
        );
    }
    out
}
