//! Price data access port trait.

use crate::domain::error::QuantError;
use crate::domain::ohlcv::OhlcvBar;

/// Source of daily bars. Shared across batch worker threads.
pub trait DataPort: Send + Sync {
    /// Bars for one instrument, ordered by date.
    fn load_bars(&self, instrument: &str) -> Result<Vec<OhlcvBar>, QuantError>;

    fn list_instruments(&self) -> Result<Vec<String>, QuantError>;
}
