//! Configuration validation.
//!
//! Validates every config field before a run and turns the INI sections into
//! the typed `BacktestConfig`, `Strategy` and `RunSettings`.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::domain::backtest::{BacktestConfig, DEFAULT_MIN_BARS};
use crate::domain::error::QuantError;
use crate::domain::metrics::WinRateMode;
use crate::domain::strategy::{
    BandParams, Preset, ProtectiveExit, StopFill, StopRule, Strategy, StrategyKind,
};
use crate::domain::universe::parse_instruments;
use crate::ports::config_port::ConfigPort;

/// Where data comes from and where reports go.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub data_dir: PathBuf,
    /// Explicit instrument list; `None` means every file in `data_dir`.
    pub instruments: Option<Vec<String>>,
    pub start_date: Option<NaiveDate>,
    pub parallel: bool,
    pub report_dir: PathBuf,
    pub bar_records: bool,
    /// Instrument-to-sector mapping file for the batch summary.
    pub sector_file: Option<PathBuf>,
}

/// Tunable `[strategy]` keys, in the order the optimizer lays out its axes.
pub const STRATEGY_KEYS: [&str; 22] = [
    "ma_period",
    "fast_period",
    "slow_period",
    "band_period",
    "band_k",
    "box_period",
    "rsi_period",
    "rsi_oversold",
    "rsi_overbought",
    "rsi_stop",
    "volume_ratio",
    "min_band_width",
    "stop_loss",
    "atr_period",
    "atr_multiplier",
    "take_profit",
    "trailing",
    "max_hold_days",
    "stop_fill",
    "max_deviation",
    "mid_tolerance",
    "max_loss",
];

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> QuantError {
    QuantError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Parse an optional value; present but unparseable is an error.
fn parse_opt<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, QuantError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("cannot parse '{}'", raw.trim()))),
    }
}

fn parse_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<bool>, QuantError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            other => Err(invalid(section, key, format!("expected a boolean, got '{}'", other))),
        },
    }
}

fn positive_period(section: &str, key: &str, value: usize) -> Result<usize, QuantError> {
    if value == 0 {
        return Err(invalid(section, key, format!("{} must be at least 1", key)));
    }
    Ok(value)
}

fn fraction(section: &str, key: &str, value: f64) -> Result<f64, QuantError> {
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(section, key, format!("{} must be in [0, 1)", key)));
    }
    Ok(value)
}

fn parse_date(section: &str, key: &str, raw: &str) -> Result<NaiveDate, QuantError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| invalid(section, key, format!("invalid {} format, expected YYYY-MM-DD", key)))
}

/// Build the per-instrument run parameters from `[backtest]`.
pub fn load_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, QuantError> {
    let defaults = BacktestConfig::default();
    let section = "backtest";

    let initial_capital =
        parse_opt::<f64>(config, section, "initial_capital")?.unwrap_or(defaults.initial_capital);
    if !initial_capital.is_finite() || initial_capital <= 0.0 {
        return Err(invalid(section, "initial_capital", "initial_capital must be positive"));
    }

    let commission_rate = fraction(
        section,
        "commission_rate",
        parse_opt::<f64>(config, section, "commission_rate")?.unwrap_or(defaults.commission_rate),
    )?;
    let risk_free_rate = fraction(
        section,
        "risk_free_rate",
        parse_opt::<f64>(config, section, "risk_free_rate")?.unwrap_or(defaults.risk_free_rate),
    )?;

    let lot_size = parse_opt::<u64>(config, section, "lot_size")?.unwrap_or(defaults.lot_size);
    if lot_size == 0 {
        return Err(invalid(section, "lot_size", "lot_size must be at least 1"));
    }

    let fixed_shares = match parse_opt::<u64>(config, section, "fixed_shares")? {
        None | Some(0) => None,
        Some(n) => Some(n),
    };

    let min_bars = positive_period(
        section,
        "min_bars",
        parse_opt::<usize>(config, section, "min_bars")?.unwrap_or(DEFAULT_MIN_BARS),
    )?;

    let win_rate = match config.get_string(section, "win_rate") {
        None => defaults.win_rate,
        Some(raw) => WinRateMode::from_name(&raw).ok_or_else(|| {
            invalid(section, "win_rate", format!("unknown win_rate mode '{}'", raw.trim()))
        })?,
    };

    Ok(BacktestConfig {
        initial_capital,
        commission_rate,
        risk_free_rate,
        lot_size,
        fixed_shares,
        min_bars,
        win_rate,
    })
}

/// Build `RunSettings` from `[backtest]`, `[data]` and `[report]`.
pub fn load_run_settings(config: &dyn ConfigPort) -> Result<RunSettings, QuantError> {
    let data_dir = config.require_string("data", "directory")?;
    if data_dir.trim().is_empty() {
        return Err(invalid("data", "directory", "directory must not be empty"));
    }

    let instruments = match config.get_string("data", "instruments") {
        Some(raw) if !raw.trim().is_empty() => Some(
            parse_instruments(&raw).map_err(|e| invalid("data", "instruments", e.to_string()))?,
        ),
        _ => None,
    };

    let start_date = match config.get_string("backtest", "start_date") {
        Some(raw) if !raw.trim().is_empty() => Some(parse_date("backtest", "start_date", &raw)?),
        _ => None,
    };

    Ok(RunSettings {
        data_dir: PathBuf::from(data_dir.trim()),
        instruments,
        start_date,
        parallel: parse_bool(config, "backtest", "parallel")?.unwrap_or(true),
        report_dir: PathBuf::from(
            config
                .get_string("report", "directory")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "output".to_string()),
        ),
        bar_records: parse_bool(config, "report", "bar_records")?.unwrap_or(false),
        sector_file: config
            .get_string("report", "sectors")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from),
    })
}

/// Start from the named preset and apply every `[strategy]` override.
pub fn load_strategy(
    config: &dyn ConfigPort,
    preset_override: Option<&str>,
) -> Result<Strategy, QuantError> {
    let section = "strategy";
    let name = match preset_override {
        Some(name) => name.to_string(),
        None => config.require_string(section, "preset")?,
    };
    let preset = Preset::from_name(&name).ok_or_else(|| {
        invalid(section, "preset", format!("unknown preset '{}'", name.trim()))
    })?;
    let mut strategy = Strategy::from_preset(preset);

    apply_kind_overrides(config, &mut strategy)?;
    apply_filter_overrides(config, &mut strategy)?;
    apply_exit_overrides(config, &mut strategy)?;
    Ok(strategy)
}

fn not_used(key: &str, preset: Preset) -> QuantError {
    invalid("strategy", key, format!("{} is not used by preset {}", key, preset))
}

fn apply_kind_overrides(config: &dyn ConfigPort, strategy: &mut Strategy) -> Result<(), QuantError> {
    let section = "strategy";
    let preset = strategy.preset;

    let period = |key: &str| -> Result<Option<usize>, QuantError> {
        parse_opt::<usize>(config, section, key)?
            .map(|v| positive_period(section, key, v))
            .transpose()
    };

    let ma_period = period("ma_period")?;
    let fast_period = period("fast_period")?;
    let slow_period = period("slow_period")?;
    let band_period = period("band_period")?;
    let box_period = period("box_period")?;
    let rsi_period = period("rsi_period")?;
    let band_k = parse_opt::<f64>(config, section, "band_k")?;
    let rsi_oversold = parse_opt::<f64>(config, section, "rsi_oversold")?;
    let rsi_overbought = parse_opt::<f64>(config, section, "rsi_overbought")?;
    let rsi_stop = parse_opt::<f64>(config, section, "rsi_stop")?;

    match &mut strategy.kind {
        StrategyKind::PriceMaCross { period } => {
            if let Some(p) = ma_period {
                *period = p;
            }
        }
        StrategyKind::DualMaCross { fast, slow } => {
            if let Some(p) = fast_period {
                *fast = p;
            }
            if let Some(p) = slow_period {
                *slow = p;
            }
            if *fast >= *slow {
                return Err(invalid(
                    section,
                    "fast_period",
                    "fast_period must be below slow_period",
                ));
            }
        }
        StrategyKind::BoxBreakout { period } => {
            if let Some(p) = box_period {
                *period = p;
            }
        }
        StrategyKind::BandBreakout { bands } => apply_bands(bands, band_period, band_k)?,
        StrategyKind::MeanReversion {
            bands,
            rsi_period: rsi,
            oversold,
            overbought,
            rsi_stop: stop,
        } => {
            apply_bands(bands, band_period, band_k)?;
            if let Some(p) = rsi_period {
                *rsi = p;
            }
            if let Some(v) = rsi_oversold {
                *oversold = v;
            }
            if let Some(v) = rsi_overbought {
                *overbought = v;
            }
            if let Some(v) = rsi_stop {
                *stop = v;
            }
            for (key, value) in [
                ("rsi_oversold", *oversold),
                ("rsi_overbought", *overbought),
                ("rsi_stop", *stop),
            ] {
                if !(0.0..=100.0).contains(&value) {
                    return Err(invalid(section, key, format!("{} must be in [0, 100]", key)));
                }
            }
            if *oversold >= *overbought {
                return Err(invalid(
                    section,
                    "rsi_oversold",
                    "rsi_oversold must be below rsi_overbought",
                ));
            }
        }
    }

    let kind = strategy.kind;
    let unused = [
        ("ma_period", ma_period.is_some(), matches!(kind, StrategyKind::PriceMaCross { .. })),
        ("fast_period", fast_period.is_some(), matches!(kind, StrategyKind::DualMaCross { .. })),
        ("slow_period", slow_period.is_some(), matches!(kind, StrategyKind::DualMaCross { .. })),
        ("box_period", box_period.is_some(), matches!(kind, StrategyKind::BoxBreakout { .. })),
        ("band_period", band_period.is_some(), kind.bands().is_some()),
        ("band_k", band_k.is_some(), kind.bands().is_some()),
        ("rsi_period", rsi_period.is_some(), matches!(kind, StrategyKind::MeanReversion { .. })),
    ];
    if let Some((key, _, _)) = unused.iter().find(|(_, given, applies)| *given && !*applies) {
        return Err(not_used(key, preset));
    }
    Ok(())
}

fn apply_bands(
    bands: &mut BandParams,
    period: Option<usize>,
    k: Option<f64>,
) -> Result<(), QuantError> {
    if let Some(p) = period {
        bands.period = p;
    }
    if let Some(k) = k {
        if !k.is_finite() || k <= 0.0 {
            return Err(invalid("strategy", "band_k", "band_k must be positive"));
        }
        // Bands are keyed by k in hundredths.
        let hundredths = k * 100.0;
        if (hundredths - hundredths.round()).abs() > 1e-9 {
            return Err(invalid(
                "strategy",
                "band_k",
                "band_k must have at most two decimal places",
            ));
        }
        bands.k = k;
    }
    Ok(())
}

fn apply_filter_overrides(
    config: &dyn ConfigPort,
    strategy: &mut Strategy,
) -> Result<(), QuantError> {
    let section = "strategy";
    if let Some(ratio) = parse_opt::<f64>(config, section, "volume_ratio")? {
        if ratio < 0.0 {
            return Err(invalid(section, "volume_ratio", "volume_ratio must be non-negative"));
        }
        strategy.filters.min_volume_ratio = (ratio > 0.0).then_some(ratio);
    }
    if let Some(width) = parse_opt::<f64>(config, section, "min_band_width")? {
        if width < 0.0 {
            return Err(invalid(
                section,
                "min_band_width",
                "min_band_width must be non-negative",
            ));
        }
        strategy.filters.min_band_width = (width > 0.0).then_some(width);
    }
    Ok(())
}

fn apply_exit_overrides(config: &dyn ConfigPort, strategy: &mut Strategy) -> Result<(), QuantError> {
    let section = "strategy";
    let exits = &mut strategy.exits;

    if let Some(pct) = parse_opt::<f64>(config, section, "stop_loss")? {
        let pct = fraction(section, "stop_loss", pct)?;
        exits.stop = if pct > 0.0 {
            StopRule::Percent(pct)
        } else {
            StopRule::None
        };
    }

    let atr_period = parse_opt::<usize>(config, section, "atr_period")?
        .map(|v| positive_period(section, "atr_period", v))
        .transpose()?;
    let atr_multiplier = parse_opt::<f64>(config, section, "atr_multiplier")?;
    if let Some(m) = atr_multiplier {
        if !m.is_finite() || m <= 0.0 {
            return Err(invalid(section, "atr_multiplier", "atr_multiplier must be positive"));
        }
    }
    if let StopRule::Atr { period, multiplier } = &mut exits.stop {
        if let Some(p) = atr_period {
            *period = p;
        }
        if let Some(m) = atr_multiplier {
            *multiplier = m;
        }
    } else if let Some(m) = atr_multiplier {
        exits.stop = StopRule::Atr {
            period: atr_period.unwrap_or(20),
            multiplier: m,
        };
    } else if atr_period.is_some() {
        return Err(not_used("atr_period", strategy.preset));
    }

    if let Some(pct) = parse_opt::<f64>(config, section, "take_profit")? {
        if !pct.is_finite() || pct < 0.0 {
            return Err(invalid(section, "take_profit", "take_profit must be non-negative"));
        }
        exits.take_profit_pct = (pct > 0.0).then_some(pct);
    }

    if let Some(trailing) = parse_bool(config, section, "trailing")? {
        exits.trailing = trailing;
    }

    if let Some(days) = parse_opt::<u32>(config, section, "max_hold_days")? {
        exits.max_hold_days = (days > 0).then_some(days);
    }

    if let Some(raw) = config.get_string(section, "stop_fill") {
        exits.stop_fill = StopFill::from_name(&raw).ok_or_else(|| {
            invalid(section, "stop_fill", format!("unknown stop_fill '{}'", raw.trim()))
        })?;
    }

    let protective_overrides = [
        ("max_deviation", parse_opt::<f64>(config, section, "max_deviation")?),
        ("mid_tolerance", parse_opt::<f64>(config, section, "mid_tolerance")?),
        ("max_loss", parse_opt::<f64>(config, section, "max_loss")?),
    ];
    for (key, value) in protective_overrides {
        let Some(value) = value else { continue };
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(section, key, format!("{} must be non-negative", key)));
        }
        exits.protective = match key {
            _ if value == 0.0 => None,
            "max_deviation" => Some(ProtectiveExit::MaDeviation {
                max_deviation: value,
            }),
            "mid_tolerance" => Some(ProtectiveExit::MidBandReversion { tolerance: value }),
            _ => Some(ProtectiveExit::MaxLoss(fraction(section, key, value)?)),
        };
    }

    Ok(())
}
