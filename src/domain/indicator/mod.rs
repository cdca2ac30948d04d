//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//! - `IndicatorSet`: Every series a strategy needs, keyed by `IndicatorType`
//!
//! All rolling windows use "at least one period" semantics: early bars are
//! computed over whatever history exists. A point is only marked invalid when
//! its definition needs history that does not exist yet (a slope over N bars,
//! a channel built from prior bars).

pub mod bollinger;
pub mod channel;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod volume;

use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Bollinger { upper: f64, middle: f64, lower: f64 },
    Channel { upper: f64, lower: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Atr(usize),
    Rsi(usize),
    VolumeRatio(usize),
    /// Percent change of SMA(`period`) over `lookback` bars.
    Slope {
        period: usize,
        lookback: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    /// Highest high / lowest low of the `period` bars before the current one.
    Box(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn point(&self, index: usize) -> Option<&IndicatorPoint> {
        self.values.get(index).filter(|p| p.valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::VolumeRatio(period) => write!(f, "VOLUME_RATIO({})", period),
            IndicatorType::Slope { period, lookback } => {
                write!(f, "SLOPE(SMA({}),{})", period, lookback)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Box(period) => write!(f, "BOX({})", period),
        }
    }
}

/// Per-bar indicator values for one instrument, keyed by indicator identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorSet {
    series: HashMap<IndicatorType, IndicatorSeries>,
}

impl IndicatorSet {
    pub fn insert(&mut self, series: IndicatorSeries) {
        self.series.insert(series.indicator_type, series);
    }

    pub fn get(&self, indicator_type: &IndicatorType) -> Option<&IndicatorSeries> {
        self.series.get(indicator_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndicatorSeries> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Valid scalar value of `indicator_type` at bar `index`.
    pub fn simple(&self, indicator_type: &IndicatorType, index: usize) -> Option<f64> {
        match self.get(indicator_type)?.point(index)?.value {
            IndicatorValue::Simple(v) => Some(v),
            _ => None,
        }
    }

    /// Valid (upper, middle, lower) band values at bar `index`.
    pub fn bands(&self, indicator_type: &IndicatorType, index: usize) -> Option<(f64, f64, f64)> {
        match self.get(indicator_type)?.point(index)?.value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => Some((upper, middle, lower)),
            _ => None,
        }
    }

    /// Valid (upper, lower) channel values at bar `index`.
    pub fn channel(&self, indicator_type: &IndicatorType, index: usize) -> Option<(f64, f64)> {
        match self.get(indicator_type)?.point(index)?.value {
            IndicatorValue::Channel { upper, lower } => Some((upper, lower)),
            _ => None,
        }
    }
}
