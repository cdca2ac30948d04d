//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for dailyquant.
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("{instrument}: missing required column '{column}'")]
    MissingColumn { instrument: String, column: String },

    #[error("{instrument}: invalid bar on {date}: {reason}")]
    InvalidBar {
        instrument: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("insufficient data for {instrument}: have {bars} bars, need {minimum}")]
    InsufficientData {
        instrument: String,
        bars: usize,
        minimum: usize,
    },

    #[error("strategy failed for {instrument}: {reason}")]
    StrategyFailure { instrument: String, reason: String },

    #[error("no instrument produced a result ({attempted} attempted)")]
    NoSuccessfulResults { attempted: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl QuantError {
    /// True for errors that reject a single instrument without failing a batch.
    pub fn is_instrument_local(&self) -> bool {
        matches!(
            self,
            QuantError::Data { .. }
                | QuantError::MissingColumn { .. }
                | QuantError::InvalidBar { .. }
                | QuantError::InsufficientData { .. }
                | QuantError::StrategyFailure { .. }
        )
    }
}

impl From<&QuantError> for std::process::ExitCode {
    fn from(err: &QuantError) -> Self {
        let code: u8 = match err {
            QuantError::Io(_) => 1,
            QuantError::ConfigParse { .. }
            | QuantError::ConfigMissing { .. }
            | QuantError::ConfigInvalid { .. } => 2,
            QuantError::Data { .. }
            | QuantError::MissingColumn { .. }
            | QuantError::InvalidBar { .. } => 3,
            QuantError::StrategyFailure { .. } => 4,
            QuantError::InsufficientData { .. } | QuantError::NoSuccessfulResults { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
