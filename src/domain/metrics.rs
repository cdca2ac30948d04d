//! Performance metrics and batch statistics.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};

use super::indicator::stddev::sample_std;
use super::ohlcv::OhlcvBar;
use super::portfolio::EquityPoint;
use super::position::{ExitReason, TradeRecord};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Fewer equity points than this produce no summary.
pub const MIN_EQUITY_POINTS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WinRateMode {
    /// Winning trades / completed trades.
    #[default]
    Trades,
    /// Aggregate-sign estimate from the total return, clamped to [0.3, 0.7].
    Legacy,
}

impl WinRateMode {
    pub fn from_name(name: &str) -> Option<WinRateMode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "trades" => Some(WinRateMode::Trades),
            "legacy" => Some(WinRateMode::Legacy),
            _ => None,
        }
    }
}

/// Executed entries and exits over the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalCounts {
    pub buy_signals: usize,
    pub sell_signals: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    pub monthly_win_rate: f64,
    pub max_consecutive_loss_days: usize,
    pub final_capital: f64,
    pub bar_count: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub last_date: NaiveDate,
}

impl PerformanceSummary {
    /// Reduce an equity curve and its trades to summary statistics.
    /// Returns `None` when the curve is too short to be meaningful.
    pub fn compute(
        equity: &[EquityPoint],
        trades: &[TradeRecord],
        counts: SignalCounts,
        risk_free_rate: f64,
        win_rate_mode: WinRateMode,
    ) -> Option<Self> {
        if equity.len() < MIN_EQUITY_POINTS {
            return None;
        }
        let last = equity.last()?;
        let n = equity.len() as f64;

        let total_return = last.cumulative_return - 1.0;
        let annualized_return = if n >= TRADING_DAYS_PER_YEAR {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / n) - 1.0
        } else {
            total_return * TRADING_DAYS_PER_YEAR / n
        };

        let returns: Vec<f64> = equity.iter().map(|p| p.daily_return).collect();
        let annualized_volatility = sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
        let mean_return = returns.iter().sum::<f64>() / n;
        let sharpe_ratio = if annualized_volatility > 0.0 {
            (mean_return * TRADING_DAYS_PER_YEAR - risk_free_rate) / annualized_volatility
        } else {
            0.0
        };

        let trade_count = trades.len();
        let win_rate = match win_rate_mode {
            WinRateMode::Trades => trade_win_rate(trades),
            WinRateMode::Legacy => legacy_win_rate(total_return, trade_count),
        };

        Some(PerformanceSummary {
            total_return,
            annualized_return,
            annualized_volatility,
            sharpe_ratio,
            max_drawdown: max_drawdown(equity),
            trade_count,
            win_rate,
            monthly_win_rate: monthly_win_rate(equity),
            max_consecutive_loss_days: max_consecutive_loss_days(equity),
            final_capital: last.capital,
            bar_count: equity.len(),
            buy_signals: counts.buy_signals,
            sell_signals: counts.sell_signals,
            last_date: last.date,
        })
    }
}

fn trade_win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades.iter().filter(|t| t.is_win()).count();
    wins as f64 / trades.len() as f64
}

fn legacy_win_rate(total_return: f64, trade_count: usize) -> f64 {
    if trade_count == 0 {
        0.0
    } else if total_return > 0.0 {
        (0.5 + total_return * 2.0).min(0.7)
    } else {
        (0.5 - total_return.abs() * 2.0).max(0.3)
    }
}

/// Most negative drawdown of cumulative return from its running maximum.
pub fn max_drawdown(equity: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;

    for point in equity {
        peak = peak.max(point.cumulative_return);
        if peak > 0.0 {
            let dd = point.cumulative_return / peak - 1.0;
            max_dd = max_dd.min(dd);
        }
    }

    max_dd
}

/// Longest run of consecutive bars whose capital fell.
pub fn max_consecutive_loss_days(equity: &[EquityPoint]) -> usize {
    let mut streak = 0usize;
    let mut longest = 0usize;

    for w in equity.windows(2) {
        if w[1].capital - w[0].capital < 0.0 {
            streak += 1;
            longest = longest.max(streak);
        } else {
            streak = 0;
        }
    }

    longest
}

/// Share of months whose month-end cumulative return beat the prior month-end.
pub fn monthly_win_rate(equity: &[EquityPoint]) -> f64 {
    let mut month_ends: Vec<f64> = Vec::new();
    let mut current: Option<(i32, u32)> = None;

    for point in equity {
        let key = (point.date.year(), point.date.month());
        if current == Some(key) {
            if let Some(last) = month_ends.last_mut() {
                *last = point.cumulative_return;
            }
        } else {
            month_ends.push(point.cumulative_return);
            current = Some(key);
        }
    }

    if month_ends.len() < 2 {
        return 0.0;
    }

    let changes = month_ends.len() - 1;
    let positive = month_ends
        .windows(2)
        .filter(|w| w[0] != 0.0 && w[1] / w[0] - 1.0 > 0.0)
        .count();
    positive as f64 / changes as f64
}

/// Trades closed for one exit reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitReasonStats {
    pub reason: ExitReason,
    pub count: usize,
    pub mean_pnl_pct: f64,
    pub mean_hold_days: f64,
}

/// Per-trade breakdown of a run. Trades with zero pnl count as losses.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win_pct: f64,
    pub avg_loss_pct: f64,
    /// |avg_win_pct / avg_loss_pct|, absent when there is no average loss.
    pub profit_loss_ratio: Option<f64>,
    pub avg_hold_days: f64,
    /// Sum of per-trade pnl_pct.
    pub total_pnl_pct: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Only reasons that closed at least one trade, in `ExitReason::ALL` order.
    pub by_exit_reason: Vec<ExitReasonStats>,
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

impl TradeStats {
    pub fn from_trades(trades: &[TradeRecord]) -> Self {
        let wins = || trades.iter().filter(|t| t.is_win());
        let losses = || trades.iter().filter(|t| !t.is_win());

        let avg_win_pct = mean_of(wins().map(|t| t.pnl_pct));
        let avg_loss_pct = mean_of(losses().map(|t| t.pnl_pct));
        let profit_loss_ratio = (avg_loss_pct != 0.0).then(|| (avg_win_pct / avg_loss_pct).abs());

        let mut win_streak = 0usize;
        let mut loss_streak = 0usize;
        let mut max_consecutive_wins = 0usize;
        let mut max_consecutive_losses = 0usize;
        for trade in trades {
            if trade.is_win() {
                win_streak += 1;
                loss_streak = 0;
                max_consecutive_wins = max_consecutive_wins.max(win_streak);
            } else {
                loss_streak += 1;
                win_streak = 0;
                max_consecutive_losses = max_consecutive_losses.max(loss_streak);
            }
        }

        let by_exit_reason = ExitReason::ALL
            .iter()
            .filter_map(|reason| {
                let group: Vec<&TradeRecord> =
                    trades.iter().filter(|t| t.exit_reason == *reason).collect();
                (!group.is_empty()).then(|| ExitReasonStats {
                    reason: *reason,
                    count: group.len(),
                    mean_pnl_pct: mean_of(group.iter().map(|t| t.pnl_pct)),
                    mean_hold_days: mean_of(group.iter().map(|t| t.hold_days as f64)),
                })
            })
            .collect();

        TradeStats {
            total_trades: trades.len(),
            winning_trades: wins().count(),
            losing_trades: losses().count(),
            avg_win_pct,
            avg_loss_pct,
            profit_loss_ratio,
            avg_hold_days: mean_of(trades.iter().map(|t| t.hold_days as f64)),
            total_pnl_pct: trades.iter().map(|t| t.pnl_pct).sum(),
            max_consecutive_wins,
            max_consecutive_losses,
            by_exit_reason,
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.winning_trades as f64 / self.total_trades as f64
        }
    }
}

/// Return from buying the first close and holding to the last.
pub fn buy_and_hold_return(bars: &[OhlcvBar]) -> f64 {
    match (bars.first(), bars.last()) {
        (Some(first), Some(last)) if first.close > 0.0 => last.close / first.close - 1.0,
        _ => 0.0,
    }
}

pub const UNKNOWN_SECTOR: &str = "unknown";

/// Mean results of the instruments mapped to one sector.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorSummary {
    pub sector: String,
    pub instruments: usize,
    pub mean_annualized_return: f64,
    pub mean_max_drawdown: f64,
    pub mean_sharpe: f64,
}

/// Group results by sector, best mean Sharpe first. Unmapped instruments fall
/// under `UNKNOWN_SECTOR`.
pub fn sector_breakdown(
    results: &[(&str, &PerformanceSummary)],
    sectors: &HashMap<String, String>,
) -> Vec<SectorSummary> {
    let mut groups: BTreeMap<&str, Vec<(&str, &PerformanceSummary)>> = BTreeMap::new();
    for &(id, summary) in results {
        let sector = sectors.get(id).map_or(UNKNOWN_SECTOR, |s| s.as_str());
        groups.entry(sector).or_default().push((id, summary));
    }

    let mut breakdown: Vec<SectorSummary> = groups
        .into_iter()
        .map(|(sector, members)| SectorSummary {
            sector: sector.to_string(),
            instruments: members.len(),
            mean_annualized_return: mean(&members, |s| s.annualized_return),
            mean_max_drawdown: mean(&members, |s| s.max_drawdown),
            mean_sharpe: mean(&members, |s| s.sharpe_ratio),
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.mean_sharpe
            .total_cmp(&a.mean_sharpe)
            .then_with(|| a.sector.cmp(&b.sector))
    });
    breakdown
}

/// Count of instruments falling into one distribution bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedInstrument {
    pub instrument: String,
    pub annualized_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub positive_return_count: usize,
    pub mean_annualized_return: f64,
    pub mean_max_drawdown: f64,
    pub mean_sharpe: f64,
    pub return_buckets: Vec<Bucket>,
    pub sharpe_buckets: Vec<Bucket>,
    pub drawdown_buckets: Vec<Bucket>,
    pub top_by_return: Vec<RankedInstrument>,
    pub bottom_by_return: Vec<RankedInstrument>,
    pub top_by_sharpe: Vec<RankedInstrument>,
    /// Filled only when a sector mapping is configured.
    pub sectors: Vec<SectorSummary>,
}

fn count(
    results: &[(&str, &PerformanceSummary)],
    pred: impl Fn(&PerformanceSummary) -> bool,
) -> usize {
    results.iter().filter(|(_, s)| pred(*s)).count()
}

fn mean(
    results: &[(&str, &PerformanceSummary)],
    field: impl Fn(&PerformanceSummary) -> f64,
) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|(_, s)| field(*s)).sum::<f64>() / results.len() as f64
}

fn ranked(
    results: &[(&str, &PerformanceSummary)],
    key: impl Fn(&PerformanceSummary) -> f64,
    descending: bool,
    top_n: usize,
) -> Vec<RankedInstrument> {
    let mut sorted: Vec<&(&str, &PerformanceSummary)> = results.iter().collect();
    sorted.sort_by(|a, b| {
        let ord = key(a.1).total_cmp(&key(b.1));
        let ord = if descending { ord.reverse() } else { ord };
        ord.then_with(|| a.0.cmp(b.0))
    });
    sorted
        .into_iter()
        .take(top_n)
        .map(|(id, s)| RankedInstrument {
            instrument: id.to_string(),
            annualized_return: s.annualized_return,
            max_drawdown: s.max_drawdown,
            sharpe_ratio: s.sharpe_ratio,
        })
        .collect()
}

impl BatchSummary {
    pub fn from_results(
        results: &[(&str, &PerformanceSummary)],
        attempted: usize,
        top_n: usize,
    ) -> Self {
        let succeeded = results.len();
        let low_dd = count(results, |s| s.max_drawdown > -0.1);
        let high_dd = count(results, |s| s.max_drawdown <= -0.2);

        BatchSummary {
            attempted,
            succeeded,
            skipped: attempted.saturating_sub(succeeded),
            positive_return_count: count(results, |s| s.total_return > 0.0),
            mean_annualized_return: mean(results, |s| s.annualized_return),
            mean_max_drawdown: mean(results, |s| s.max_drawdown),
            mean_sharpe: mean(results, |s| s.sharpe_ratio),
            return_buckets: vec![
                Bucket {
                    label: "annualized > 20%",
                    count: count(results, |s| s.annualized_return > 0.2),
                },
                Bucket {
                    label: "annualized 10%-20%",
                    count: count(results, |s| {
                        s.annualized_return > 0.1 && s.annualized_return <= 0.2
                    }),
                },
                Bucket {
                    label: "annualized 0%-10%",
                    count: count(results, |s| {
                        s.annualized_return > 0.0 && s.annualized_return <= 0.1
                    }),
                },
                Bucket {
                    label: "annualized <= 0%",
                    count: count(results, |s| s.annualized_return <= 0.0),
                },
            ],
            sharpe_buckets: vec![
                Bucket {
                    label: "sharpe > 1",
                    count: count(results, |s| s.sharpe_ratio > 1.0),
                },
                Bucket {
                    label: "sharpe 0-1",
                    count: count(results, |s| s.sharpe_ratio > 0.0 && s.sharpe_ratio <= 1.0),
                },
                Bucket {
                    label: "sharpe <= 0",
                    count: count(results, |s| s.sharpe_ratio <= 0.0),
                },
            ],
            drawdown_buckets: vec![
                Bucket {
                    label: "drawdown < 10%",
                    count: low_dd,
                },
                Bucket {
                    label: "drawdown 10%-20%",
                    count: succeeded - low_dd - high_dd,
                },
                Bucket {
                    label: "drawdown >= 20%",
                    count: high_dd,
                },
            ],
            top_by_return: ranked(results, |s| s.annualized_return, true, top_n),
            bottom_by_return: ranked(results, |s| s.annualized_return, false, top_n),
            top_by_sharpe: ranked(results, |s| s.sharpe_ratio, true, top_n),
            sectors: Vec::new(),
        }
    }

    pub fn positive_rate(&self) -> f64 {
        if self.succeeded == 0 {
            0.0
        } else {
            self.positive_return_count as f64 / self.succeeded as f64
        }
    }
}
