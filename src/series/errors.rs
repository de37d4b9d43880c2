use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeriesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid trade date: {0}")]
    InvalidDate(String),
    #[error("Empty series: {0}")]
    EmptySeries(&'static str),
    #[error("Bars out of order at {current} (previous bar dated {previous})")]
    UnorderedSeries { previous: NaiveDate, current: NaiveDate },
    #[error("Invalid bar on {date}: {reason}")]
    InvalidBar { date: NaiveDate, reason: String },
    #[error("Invalid volume on {date}: {volume}")]
    InvalidVolume { date: NaiveDate, volume: f64 },
    #[error("Series price range collapses to {0}")]
    FlatSeries(f64),
}
