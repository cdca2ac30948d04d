//! Strategy configuration and composition.
//!
//! A `Strategy` is a closed description of one rule family (`StrategyKind`),
//! the confirmation filters that may suppress its entries, and the exit
//! rules the position state machine enforces while long.

use std::fmt;

use crate::domain::indicator::IndicatorType;

/// Period of the trailing mean used by the volume-ratio filter.
pub const VOLUME_PERIOD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    MovingAverage,
    DualMovingAverage,
    BandBreakout,
    BoxBreakout,
    AtrTrend,
    MeanReversion,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Preset::MovingAverage,
        Preset::DualMovingAverage,
        Preset::BandBreakout,
        Preset::BoxBreakout,
        Preset::AtrTrend,
        Preset::MeanReversion,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Preset::MovingAverage => "moving_average",
            Preset::DualMovingAverage => "dual_moving_average",
            Preset::BandBreakout => "band_breakout",
            Preset::BoxBreakout => "box_breakout",
            Preset::AtrTrend => "atr_trend",
            Preset::MeanReversion => "mean_reversion",
        }
    }

    pub fn from_name(name: &str) -> Option<Preset> {
        let wanted = name.trim().to_ascii_lowercase();
        Preset::ALL.into_iter().find(|p| p.name() == wanted)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bollinger band parameters shared by the band-based rule families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandParams {
    pub period: usize,
    pub k: f64,
}

impl BandParams {
    pub fn indicator(&self) -> IndicatorType {
        IndicatorType::Bollinger {
            period: self.period,
            stddev_mult_x100: (self.k * 100.0).round() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrategyKind {
    /// Close crossing SMA(period).
    PriceMaCross { period: usize },
    /// SMA(fast) crossing SMA(slow).
    DualMaCross { fast: usize, slow: usize },
    /// Close crossing the upper band (enter) or the lower band (exit).
    BandBreakout { bands: BandParams },
    /// Close leaving the channel of the prior `period` bars.
    BoxBreakout { period: usize },
    MeanReversion {
        bands: BandParams,
        rsi_period: usize,
        oversold: f64,
        overbought: f64,
        rsi_stop: f64,
    },
}

impl StrategyKind {
    pub fn bands(&self) -> Option<BandParams> {
        match self {
            StrategyKind::BandBreakout { bands } | StrategyKind::MeanReversion { bands, .. } => {
                Some(*bands)
            }
            _ => None,
        }
    }

    /// The moving average the rule family is built around, if any.
    pub fn moving_average(&self) -> Option<IndicatorType> {
        match self {
            StrategyKind::PriceMaCross { period } => Some(IndicatorType::Sma(*period)),
            StrategyKind::DualMaCross { slow, .. } => Some(IndicatorType::Sma(*slow)),
            _ => None,
        }
    }

    fn indicators(&self) -> Vec<IndicatorType> {
        match self {
            StrategyKind::PriceMaCross { period } => vec![IndicatorType::Sma(*period)],
            StrategyKind::DualMaCross { fast, slow } => {
                vec![IndicatorType::Sma(*fast), IndicatorType::Sma(*slow)]
            }
            StrategyKind::BandBreakout { bands } => vec![bands.indicator()],
            StrategyKind::BoxBreakout { period } => vec![IndicatorType::Box(*period)],
            StrategyKind::MeanReversion {
                bands, rsi_period, ..
            } => vec![bands.indicator(), IndicatorType::Rsi(*rsi_period)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendFilter {
    pub period: usize,
    pub lookback: usize,
}

impl TrendFilter {
    pub fn indicator(&self) -> IndicatorType {
        IndicatorType::Slope {
            period: self.period,
            lookback: self.lookback,
        }
    }
}

/// Confirmation filters. Each one can only suppress an Enter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EntryFilters {
    /// Volume ratio must exceed this.
    pub min_volume_ratio: Option<f64>,
    /// Moving-average slope must be positive.
    pub trend: Option<TrendFilter>,
    /// (upper - lower) / middle must exceed this.
    pub min_band_width: Option<f64>,
    pub require_above_middle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopRule {
    None,
    /// Fraction below entry; trails the high-water mark.
    Percent(f64),
    /// `multiplier` × ATR(`period`) below entry; trails the high-water mark.
    Atr { period: usize, multiplier: f64 },
    /// The strategy's lower Bollinger band.
    LowerBand,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtectiveExit {
    /// Close above MA × (1 + max_deviation).
    MaDeviation { max_deviation: f64 },
    /// |close - middle| / middle below tolerance.
    MidBandReversion { tolerance: f64 },
    /// Band position above threshold.
    BandPosition { threshold: f64 },
    /// Loss from entry at or beyond this fraction.
    MaxLoss(f64),
}

/// How a stop-loss exit is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopFill {
    #[default]
    Close,
    /// The stop price, or the open when the bar gapped below it.
    StopPrice,
}

impl StopFill {
    pub fn from_name(name: &str) -> Option<StopFill> {
        match name.trim().to_ascii_lowercase().as_str() {
            "close" => Some(StopFill::Close),
            "stop" | "stop_price" => Some(StopFill::StopPrice),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitRules {
    pub stop: StopRule,
    pub trailing: bool,
    pub take_profit_pct: Option<f64>,
    pub protective: Option<ProtectiveExit>,
    pub max_hold_days: Option<u32>,
    pub stop_fill: StopFill,
}

impl Default for ExitRules {
    fn default() -> Self {
        ExitRules {
            stop: StopRule::None,
            trailing: false,
            take_profit_pct: None,
            protective: None,
            max_hold_days: None,
            stop_fill: StopFill::Close,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub preset: Preset,
    pub kind: StrategyKind,
    pub filters: EntryFilters,
    pub exits: ExitRules,
}

impl Strategy {
    pub fn from_preset(preset: Preset) -> Self {
        let default_bands = BandParams { period: 20, k: 2.0 };
        match preset {
            Preset::MovingAverage => Strategy {
                preset,
                kind: StrategyKind::PriceMaCross { period: 20 },
                filters: EntryFilters {
                    min_volume_ratio: Some(1.2),
                    ..EntryFilters::default()
                },
                exits: ExitRules {
                    stop: StopRule::Percent(0.08),
                    trailing: true,
                    take_profit_pct: Some(0.20),
                    protective: Some(ProtectiveExit::MaDeviation {
                        max_deviation: 0.15,
                    }),
                    ..ExitRules::default()
                },
            },
            Preset::DualMovingAverage => Strategy {
                preset,
                kind: StrategyKind::DualMaCross { fast: 10, slow: 20 },
                filters: EntryFilters::default(),
                exits: ExitRules {
                    stop: StopRule::Percent(0.08),
                    trailing: true,
                    take_profit_pct: Some(0.20),
                    ..ExitRules::default()
                },
            },
            Preset::BandBreakout => Strategy {
                preset,
                kind: StrategyKind::BandBreakout {
                    bands: default_bands,
                },
                filters: EntryFilters {
                    min_band_width: Some(0.05),
                    require_above_middle: true,
                    ..EntryFilters::default()
                },
                exits: ExitRules {
                    stop: StopRule::Percent(0.08),
                    trailing: true,
                    take_profit_pct: Some(0.20),
                    protective: Some(ProtectiveExit::MidBandReversion { tolerance: 0.02 }),
                    ..ExitRules::default()
                },
            },
            Preset::BoxBreakout => Strategy {
                preset,
                kind: StrategyKind::BoxBreakout { period: 20 },
                filters: EntryFilters::default(),
                exits: ExitRules {
                    stop: StopRule::Percent(0.05),
                    trailing: true,
                    max_hold_days: Some(10),
                    ..ExitRules::default()
                },
            },
            Preset::AtrTrend => Strategy {
                preset,
                kind: StrategyKind::DualMaCross { fast: 5, slow: 20 },
                filters: EntryFilters {
                    min_volume_ratio: Some(1.2),
                    trend: Some(TrendFilter {
                        period: 20,
                        lookback: 5,
                    }),
                    ..EntryFilters::default()
                },
                exits: ExitRules {
                    stop: StopRule::Atr {
                        period: 20,
                        multiplier: 2.0,
                    },
                    trailing: true,
                    protective: Some(ProtectiveExit::MaxLoss(0.15)),
                    max_hold_days: Some(60),
                    ..ExitRules::default()
                },
            },
            Preset::MeanReversion => Strategy {
                preset,
                kind: StrategyKind::MeanReversion {
                    bands: default_bands,
                    rsi_period: 7,
                    oversold: 25.0,
                    overbought: 75.0,
                    rsi_stop: 20.0,
                },
                filters: EntryFilters::default(),
                exits: ExitRules {
                    stop: StopRule::LowerBand,
                    trailing: true,
                    protective: Some(ProtectiveExit::BandPosition { threshold: 0.5 }),
                    max_hold_days: Some(10),
                    ..ExitRules::default()
                },
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.preset.name()
    }

    /// Bands used by filters, band stops and band-based protective exits.
    /// Band-less rule families fall back to Bollinger(20, 2).
    pub fn bands(&self) -> BandParams {
        self.kind
            .bands()
            .unwrap_or(BandParams { period: 20, k: 2.0 })
    }

    fn uses_bands(&self) -> bool {
        self.kind.bands().is_some()
            || self.filters.min_band_width.is_some()
            || self.filters.require_above_middle
            || matches!(self.exits.stop, StopRule::LowerBand)
            || matches!(
                self.exits.protective,
                Some(ProtectiveExit::MidBandReversion { .. })
                    | Some(ProtectiveExit::BandPosition { .. })
            )
    }

    /// Every indicator the signal generator and state machine will read.
    pub fn required_indicators(&self) -> Vec<IndicatorType> {
        let mut types = self.kind.indicators();
        if self.uses_bands() {
            types.push(self.bands().indicator());
        }
        if self.filters.min_volume_ratio.is_some() {
            types.push(IndicatorType::VolumeRatio(VOLUME_PERIOD));
        }
        if let Some(trend) = self.filters.trend {
            types.push(trend.indicator());
        }
        if let StopRule::Atr { period, .. } = self.exits.stop {
            types.push(IndicatorType::Atr(period));
        }
        if let Some(ProtectiveExit::MaDeviation { .. }) = self.exits.protective {
            types.push(IndicatorType::Sma(self.deviation_period()));
        }
        let mut unique = Vec::with_capacity(types.len());
        for ty in types {
            if !unique.contains(&ty) {
                unique.push(ty);
            }
        }
        unique
    }

    /// Moving-average period the deviation exit measures against.
    pub fn deviation_period(&self) -> usize {
        match self.kind.moving_average() {
            Some(IndicatorType::Sma(period)) => period,
            _ => 20,
        }
    }
}
