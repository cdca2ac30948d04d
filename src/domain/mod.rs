//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod indicator_helpers;
pub mod strategy;
pub mod signal;
pub mod position;
pub mod portfolio;
pub mod metrics;
pub mod backtest;
pub mod universe;
pub mod optimize;
pub mod scan;
pub mod config_validation;
pub mod error;
