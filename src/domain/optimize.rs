//! Parameter grid search.
//!
//! Every combination of an `[optimize]` grid is applied over the configured
//! `[strategy]` section, backtested on one instrument and scored. Results are
//! ranked best first.

use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::backtest::{BacktestConfig, run_backtest, validate_bars};
use crate::domain::config_validation::{STRATEGY_KEYS, load_strategy};
use crate::domain::error::QuantError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::strategy::{Preset, Strategy};
use crate::ports::config_port::ConfigPort;

/// Combinations with this many trades or fewer are not scored.
pub const MIN_SCORED_TRADES: usize = 5;
pub const UNSCORED: f64 = -100.0;

const RETURN_TARGET: f64 = 0.5;
const LOSS_STREAK_LIMIT: f64 = 10.0;
const TRADE_TARGET: f64 = 30.0;

/// Weighted blend of return, win rate, losing streak and trade frequency.
pub fn score(total_return: f64, win_rate: f64, trades: usize, max_consecutive_losses: usize) -> f64 {
    if trades <= MIN_SCORED_TRADES {
        return UNSCORED;
    }
    let return_score = (total_return / RETURN_TARGET).min(1.0);
    let loss_score = (1.0 - max_consecutive_losses as f64 / LOSS_STREAK_LIMIT).max(0.0);
    let trade_score = (trades as f64 / TRADE_TARGET).min(1.0);
    0.4 * return_score + 0.3 * win_rate + 0.1 * loss_score + 0.2 * trade_score
}

/// Named axes of candidate `[strategy]` values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    pub axes: Vec<(String, Vec<String>)>,
}

fn axis(key: &str, values: &[&str]) -> (String, Vec<String>) {
    (key.to_string(), values.iter().map(|v| v.to_string()).collect())
}

impl ParameterGrid {
    /// Built-in grid for a preset.
    pub fn default_for(preset: Preset) -> Self {
        let axes = match preset {
            Preset::MovingAverage => vec![
                axis("ma_period", &["10", "20", "30", "60"]),
                axis("stop_loss", &["0.05", "0.08", "0.10"]),
            ],
            Preset::DualMovingAverage => vec![
                axis("fast_period", &["5", "10", "15"]),
                axis("slow_period", &["20", "30", "50"]),
            ],
            Preset::BandBreakout => vec![
                axis("band_period", &["10", "20", "30"]),
                axis("band_k", &["1.5", "2", "2.5"]),
            ],
            Preset::BoxBreakout => vec![
                axis("box_period", &["10", "20", "30"]),
                axis("stop_loss", &["0.03", "0.05", "0.08"]),
            ],
            Preset::AtrTrend => vec![
                axis("fast_period", &["5", "10", "15"]),
                axis("slow_period", &["20", "30", "50"]),
                axis("atr_multiplier", &["1.5", "2", "2.5", "3"]),
                axis("trailing", &["true", "false"]),
            ],
            Preset::MeanReversion => vec![
                axis("band_period", &["10", "20", "30"]),
                axis("band_k", &["1.5", "2", "2.5"]),
                axis("rsi_period", &["7", "14", "21"]),
                axis("rsi_oversold", &["20", "25", "30"]),
                axis("rsi_overbought", &["70", "75", "80"]),
            ],
        };
        ParameterGrid { axes }
    }

    /// Grid from the `[optimize]` section, one comma-separated list per
    /// strategy key. Falls back to the preset's built-in grid when the
    /// section names no keys.
    pub fn from_config(config: &dyn ConfigPort, preset: Preset) -> Self {
        let axes: Vec<(String, Vec<String>)> = STRATEGY_KEYS
            .iter()
            .map(|key| (key.to_string(), config.get_list("optimize", key)))
            .filter(|(_, values)| !values.is_empty())
            .collect();
        if axes.is_empty() {
            Self::default_for(preset)
        } else {
            ParameterGrid { axes }
        }
    }

    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            0
        } else {
            self.axes.iter().map(|(_, values)| values.len()).product()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product; the first axis varies slowest.
    pub fn combinations(&self) -> Vec<Vec<(String, String)>> {
        if self.axes.is_empty() {
            return Vec::new();
        }
        let mut combos: Vec<Vec<(String, String)>> = vec![Vec::new()];
        for (key, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |value| {
                        let mut combo = prefix.clone();
                        combo.push((key.clone(), value.clone()));
                        combo
                    })
                })
                .collect();
        }
        combos
    }
}

/// `[strategy]` lookups see the combination's values first.
struct GridPoint<'a> {
    base: &'a dyn ConfigPort,
    params: &'a [(String, String)],
}

impl ConfigPort for GridPoint<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        if section == "strategy" {
            if let Some((_, value)) = self.params.iter().find(|(k, _)| k == key) {
                return Some(value.clone());
            }
        }
        self.base.get_string(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.get_string(section, key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.get_string(section, key)
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "yes" | "1" | "on"))
            .unwrap_or(default)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterScore {
    pub params: Vec<(String, String)>,
    pub total_return: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    pub max_consecutive_losses: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationOutcome {
    pub instrument: String,
    pub strategy: String,
    /// Best score first; ties keep grid order.
    pub ranked: Vec<ParameterScore>,
    /// Combinations that failed validation or could not be backtested.
    pub rejected: usize,
}

impl OptimizationOutcome {
    pub fn best(&self) -> Option<&ParameterScore> {
        self.ranked.first()
    }

    /// Axis names, in grid order.
    pub fn param_keys(&self) -> Vec<&str> {
        self.ranked
            .first()
            .map(|s| s.params.iter().map(|(k, _)| k.as_str()).collect())
            .unwrap_or_default()
    }
}

fn evaluate(
    instrument: &str,
    bars: &[OhlcvBar],
    params: Vec<(String, String)>,
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<Option<ParameterScore>, QuantError> {
    let result = match run_backtest(instrument, bars, strategy, config) {
        Ok(result) => result,
        Err(e) if e.is_instrument_local() => {
            debug!(instrument, error = %e, "combination failed");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let total_return = result
        .equity
        .last()
        .map_or(0.0, |p| p.cumulative_return - 1.0);
    let stats = &result.trade_stats;
    Ok(Some(ParameterScore {
        params,
        total_return,
        win_rate: stats.win_rate(),
        trade_count: stats.total_trades,
        max_consecutive_losses: stats.max_consecutive_losses,
        score: score(
            total_return,
            stats.win_rate(),
            stats.total_trades,
            stats.max_consecutive_losses,
        ),
    }))
}

/// Score every grid combination of `preset` on one instrument's bars.
///
/// Combinations rejected by strategy validation are counted and skipped; if
/// all of them are rejected the first validation error is returned.
pub fn optimize(
    instrument: &str,
    bars: &[OhlcvBar],
    preset: Preset,
    grid: &ParameterGrid,
    config: &dyn ConfigPort,
    backtest: &BacktestConfig,
    parallel: bool,
) -> Result<OptimizationOutcome, QuantError> {
    validate_bars(instrument, bars, backtest.min_bars)?;
    info!(
        instrument,
        strategy = %preset,
        combinations = grid.len(),
        parallel,
        "starting optimization"
    );

    let mut rejected = 0;
    let mut first_error = None;
    let mut candidates = Vec::new();
    for params in grid.combinations() {
        let point = GridPoint {
            base: config,
            params: &params,
        };
        match load_strategy(&point, Some(preset.name())) {
            Ok(strategy) => candidates.push((params, strategy)),
            Err(e @ QuantError::ConfigInvalid { .. }) => {
                debug!(?params, error = %e, "combination rejected");
                rejected += 1;
                first_error.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    if candidates.is_empty() {
        return Err(first_error.unwrap_or_else(|| QuantError::ConfigInvalid {
            section: "optimize".to_string(),
            key: "grid".to_string(),
            reason: "parameter grid is empty".to_string(),
        }));
    }

    let scored: Vec<Result<Option<ParameterScore>, QuantError>> = if parallel {
        candidates
            .into_par_iter()
            .map(|(params, strategy)| evaluate(instrument, bars, params, &strategy, backtest))
            .collect()
    } else {
        candidates
            .into_iter()
            .map(|(params, strategy)| evaluate(instrument, bars, params, &strategy, backtest))
            .collect()
    };

    let mut ranked = Vec::new();
    for result in scored {
        match result? {
            Some(score) => ranked.push(score),
            None => rejected += 1,
        }
    }
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    if let Some(best) = ranked.first() {
        info!(
            instrument,
            score = best.score,
            total_return = best.total_return,
            trades = best.trade_count,
            "best combination"
        );
    }

    Ok(OptimizationOutcome {
        instrument: instrument.to_string(),
        strategy: preset.name().to_string(),
        ranked,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(String, String), String>);

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            MapConfig(
                entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }
        fn get_int(&self, _section: &str, _key: &str, default: i64) -> i64 {
            default
        }
        fn get_double(&self, _section: &str, _key: &str, default: f64) -> f64 {
            default
        }
        fn get_bool(&self, _section: &str, _key: &str, default: bool) -> bool {
            default
        }
    }

    fn wave_bars(n: usize) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let close = 20.0 + 3.0 * (i as f64 / 6.0).sin() + i as f64 * 0.01;
                OhlcvBar {
                    date: start + chrono::Days::new(i as u64),
                    open: close,
                    high: close + 0.2,
                    low: close - 0.2,
                    close,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    #[test]
    fn score_weights_components() {
        // 25% return, 60% wins, 2 losses in a row, 15 trades.
        let s = score(0.25, 0.6, 15, 2);
        assert_relative_eq!(s, 0.4 * 0.5 + 0.3 * 0.6 + 0.1 * 0.8 + 0.2 * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn score_caps_and_floors() {
        assert_relative_eq!(score(2.0, 1.0, 100, 20), 0.4 + 0.3 + 0.0 + 0.2, epsilon = 1e-12);
        assert!(score(-0.5, 0.0, 10, 0) < 0.0);
    }

    #[test]
    fn few_trades_are_unscored() {
        assert_eq!(score(0.9, 1.0, 5, 0), UNSCORED);
        assert!(score(0.9, 1.0, 6, 0) > 0.0);
    }

    #[test]
    fn combinations_first_axis_slowest() {
        let grid = ParameterGrid {
            axes: vec![axis("fast_period", &["5", "10"]), axis("slow_period", &["20", "30", "50"])],
        };
        let combos = grid.combinations();
        assert_eq!(grid.len(), 6);
        assert_eq!(combos.len(), 6);
        assert_eq!(
            combos[0],
            vec![("fast_period".into(), "5".into()), ("slow_period".into(), "20".into())]
        );
        assert_eq!(
            combos[3],
            vec![("fast_period".into(), "10".into()), ("slow_period".into(), "20".into())]
        );
    }

    #[test]
    fn default_grid_sizes() {
        assert_eq!(ParameterGrid::default_for(Preset::AtrTrend).len(), 72);
        assert_eq!(ParameterGrid::default_for(Preset::MovingAverage).len(), 12);
        assert_eq!(ParameterGrid::default_for(Preset::MeanReversion).len(), 243);
    }

    #[test]
    fn grid_from_optimize_section() {
        let config = MapConfig::new(&[
            ("optimize", "ma_period", "10, 20"),
            ("optimize", "stop_loss", "0.05,0.1"),
        ]);
        let grid = ParameterGrid::from_config(&config, Preset::MovingAverage);
        assert_eq!(
            grid.axes,
            vec![axis("ma_period", &["10", "20"]), axis("stop_loss", &["0.05", "0.1"])]
        );

        let empty = MapConfig::new(&[]);
        assert_eq!(
            ParameterGrid::from_config(&empty, Preset::BoxBreakout),
            ParameterGrid::default_for(Preset::BoxBreakout)
        );
    }

    #[test]
    fn grid_point_overrides_strategy_section_only() {
        let base = MapConfig::new(&[("strategy", "ma_period", "20"), ("backtest", "lot_size", "100")]);
        let params = vec![("ma_period".to_string(), "30".to_string())];
        let point = GridPoint {
            base: &base,
            params: &params,
        };
        assert_eq!(point.get_string("strategy", "ma_period").as_deref(), Some("30"));
        assert_eq!(point.get_string("backtest", "lot_size").as_deref(), Some("100"));
        assert_eq!(point.get_string("optimize", "ma_period"), None);
    }

    #[test]
    fn ranks_best_first_and_counts_rejects() {
        let bars = wave_bars(300);
        // fast >= slow combinations fail validation.
        let grid = ParameterGrid {
            axes: vec![axis("fast_period", &["5", "20"]), axis("slow_period", &["10", "15"])],
        };
        let config = MapConfig::new(&[]);
        let backtest = BacktestConfig::default();

        let outcome = optimize(
            "TEST",
            &bars,
            Preset::DualMovingAverage,
            &grid,
            &config,
            &backtest,
            false,
        )
        .unwrap();

        assert_eq!(outcome.strategy, "dual_moving_average");
        assert_eq!(outcome.rejected, 2);
        assert_eq!(outcome.ranked.len(), 2);
        assert!(outcome.ranked[0].score >= outcome.ranked[1].score);
        assert_eq!(outcome.param_keys(), vec!["fast_period", "slow_period"]);
        for entry in &outcome.ranked {
            let expected = score(
                entry.total_return,
                entry.win_rate,
                entry.trade_count,
                entry.max_consecutive_losses,
            );
            assert_relative_eq!(entry.score, expected, epsilon = 1e-12);
        }

        let parallel = optimize(
            "TEST",
            &bars,
            Preset::DualMovingAverage,
            &grid,
            &config,
            &backtest,
            true,
        )
        .unwrap();
        assert_eq!(parallel, outcome);
    }

    #[test]
    fn all_rejected_returns_validation_error() {
        let bars = wave_bars(150);
        let grid = ParameterGrid {
            axes: vec![axis("band_k", &["2.005"])],
        };
        let err = optimize(
            "TEST",
            &bars,
            Preset::BandBreakout,
            &grid,
            &MapConfig::new(&[]),
            &BacktestConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, QuantError::ConfigInvalid { ref key, .. } if key == "band_k"));
    }

    #[test]
    fn short_series_rejected_before_search() {
        let bars = wave_bars(20);
        let err = optimize(
            "TEST",
            &bars,
            Preset::MovingAverage,
            &ParameterGrid::default_for(Preset::MovingAverage),
            &MapConfig::new(&[]),
            &BacktestConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, QuantError::InsufficientData { .. }));
    }
}
