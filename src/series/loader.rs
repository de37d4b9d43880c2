use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::common::dates::parse_trade_date;
use super::errors::SeriesError;
use super::structs::{Bar, VolumeRecord};

/// One row of a daily OHLCV export.
///
/// Raw exchange exports name the columns `trade_date` / `vol`; normalized files use
/// `date` (or `time`) / `volume`. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "trade_date", alias = "time")]
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(alias = "vol")]
    volume: f64,
}

/// Load a daily series from a CSV file, sorted ascending by date
pub fn load_series_csv<P: AsRef<Path>>(path: P) -> Result<(Vec<Bar>, Vec<VolumeRecord>), SeriesError> {
    let path = path.as_ref();
    info!("Loading series from {}", path.display());
    let reader = csv::Reader::from_path(path)?;
    read_series(reader)
}

/// Parse a series from any CSV reader (header row required)
pub fn read_series<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<(Vec<Bar>, Vec<VolumeRecord>), SeriesError> {
    let mut rows = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let date = parse_trade_date(&row.date).ok_or_else(|| SeriesError::InvalidDate(row.date.clone()))?;
        rows.push((Bar::new(date, row.open, row.high, row.low, row.close), VolumeRecord::new(date, row.volume)));
    }

    if rows.is_empty() {
        return Err(SeriesError::EmptySeries("csv rows"));
    }

    // Exports are frequently newest-first
    rows.sort_by_key(|(bar, _)| bar.date);

    let mut bars: Vec<Bar> = Vec::with_capacity(rows.len());
    let mut volumes: Vec<VolumeRecord> = Vec::with_capacity(rows.len());
    for (bar, volume) in rows {
        if bars.last().map(|last| last.date == bar.date).unwrap_or(false) {
            warn!("Duplicate row for {}, keeping the later one", bar.date);
            bars.pop();
            volumes.pop();
        }
        bars.push(bar);
        volumes.push(volume);
    }

    debug!(
        "Parsed {} bars from CSV ({} to {})",
        bars.len(),
        bars.first().map(|b| b.date.to_string()).unwrap_or_default(),
        bars.last().map(|b| b.date.to_string()).unwrap_or_default()
    );

    Ok((bars, volumes))
}
