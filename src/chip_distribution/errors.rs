use chrono::NaiveDate;
use thiserror::Error;

use crate::series::SeriesError;

#[derive(Error, Debug)]
pub enum ChipDistributionError {
    #[error("Controller not initialized: load a series first")]
    NotInitialized,
    #[error("Date not found in series: {0}")]
    DateNotFound(NaiveDate),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Series error: {0}")]
    Series(#[from] SeriesError),
    #[error("Precompute cancelled after {completed} of {total} bars")]
    Cancelled { completed: usize, total: usize },
    #[error("Precompute task failed: {0}")]
    SweepTask(String),
}
