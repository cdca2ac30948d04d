//! CSV file data adapter.
//!
//! One file per instrument, named `<id>.csv` or `<id>_day_data.csv`. Columns
//! are located by header name (case-insensitive) so column order and extra
//! columns do not matter.

use crate::domain::error::QuantError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const REQUIRED_COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];
const FILE_SUFFIXES: [&str; 2] = ["_day_data.csv", ".csv"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const SECTOR_ID_COLUMNS: [&str; 3] = ["instrument", "code", "symbol"];
const SECTOR_NAME_COLUMNS: [&str; 2] = ["sector", "industry"];

pub struct CsvAdapter {
    base_path: PathBuf,
    start_date: Option<NaiveDate>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            start_date: None,
        }
    }

    /// Drop bars dated before `start_date`.
    pub fn with_start_date(mut self, start_date: Option<NaiveDate>) -> Self {
        self.start_date = start_date;
        self
    }

    fn csv_path(&self, instrument: &str) -> Option<PathBuf> {
        FILE_SUFFIXES
            .iter()
            .map(|suffix| self.base_path.join(format!("{}{}", instrument, suffix)))
            .find(|path| path.is_file())
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    // Tolerate a trailing time component.
    let day = trimmed.split_whitespace().next().unwrap_or(trimmed);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

impl DataPort for CsvAdapter {
    fn load_bars(&self, instrument: &str) -> Result<Vec<OhlcvBar>, QuantError> {
        let path = self.csv_path(instrument).ok_or_else(|| QuantError::Data {
            reason: format!(
                "no data file for {} in {}",
                instrument,
                self.base_path.display()
            ),
        })?;
        let content = fs::read_to_string(&path).map_err(|e| QuantError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

        let headers = rdr.headers().map_err(|e| QuantError::Data {
            reason: format!("{}: CSV header error: {}", instrument, e),
        })?;
        let mut index = [0usize; 6];
        for (slot, column) in index.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(column))
                .ok_or_else(|| QuantError::MissingColumn {
                    instrument: instrument.to_string(),
                    column: column.to_string(),
                })?;
        }
        let [date_col, open_col, high_col, low_col, close_col, volume_col] = index;

        let mut bars = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| QuantError::Data {
                reason: format!("{}: CSV parse error: {}", instrument, e),
            })?;
            let line = row + 2;

            let field = |col: usize, name: &str| -> Result<f64, QuantError> {
                let raw = record.get(col).unwrap_or("");
                raw.parse::<f64>().map_err(|_| QuantError::Data {
                    reason: format!(
                        "{}: invalid {} value '{}' on line {}",
                        instrument, name, raw, line
                    ),
                })
            };

            let raw_date = record.get(date_col).unwrap_or("");
            let date = parse_date(raw_date).ok_or_else(|| QuantError::Data {
                reason: format!(
                    "{}: invalid date '{}' on line {}",
                    instrument, raw_date, line
                ),
            })?;

            if self.start_date.is_some_and(|start| date < start) {
                continue;
            }

            bars.push(OhlcvBar {
                date,
                open: field(open_col, "open")?,
                high: field(high_col, "high")?,
                low: field(low_col, "low")?,
                close: field(close_col, "close")?,
                volume: field(volume_col, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_instruments(&self) -> Result<Vec<String>, QuantError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| QuantError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut instruments = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| QuantError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(id) = FILE_SUFFIXES
                .iter()
                .find_map(|suffix| name_str.strip_suffix(suffix))
                .filter(|id| !id.is_empty())
            {
                instruments.push(id.to_string());
            }
        }

        instruments.sort();
        instruments.dedup();
        Ok(instruments)
    }
}

/// Read an instrument-to-sector mapping. The id column may be headed
/// `instrument`, `code` or `symbol`; the sector column `sector` or `industry`.
/// Rows with an empty id or sector are ignored.
pub fn load_sector_map(path: &Path) -> Result<HashMap<String, String>, QuantError> {
    let data_err = |reason: String| QuantError::Data {
        reason: format!("{}: {}", path.display(), reason),
    };
    let content =
        fs::read_to_string(path).map_err(|e| data_err(format!("failed to read: {}", e)))?;

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());
    let headers = rdr
        .headers()
        .map_err(|e| data_err(format!("CSV header error: {}", e)))?;
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };
    let id_col = find(&SECTOR_ID_COLUMNS)
        .ok_or_else(|| data_err("missing instrument column".to_string()))?;
    let sector_col =
        find(&SECTOR_NAME_COLUMNS).ok_or_else(|| data_err("missing sector column".to_string()))?;

    let mut sectors = HashMap::new();
    for result in rdr.records() {
        let record = result.map_err(|e| data_err(format!("CSV parse error: {}", e)))?;
        let id = record.get(id_col).unwrap_or("");
        let sector = record.get(sector_col).unwrap_or("");
        if !id.is_empty() && !sector.is_empty() {
            sectors.insert(id.to_string(), sector.to_string());
        }
    }
    Ok(sectors)
}
