use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::errors::SeriesError;

/// One trading period of open/high/low/close prices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { date, open, high, low, close }
    }

    /// Midpoint of the bar's traded range
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Check prices are finite and `low <= high`
    pub fn validate(&self) -> Result<(), SeriesError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(SeriesError::InvalidBar {
                date: self.date,
                reason: format!("non-finite price in {:?}", prices),
            });
        }
        if self.low > self.high {
            return Err(SeriesError::InvalidBar {
                date: self.date,
                reason: format!("low {} above high {}", self.low, self.high),
            });
        }
        Ok(())
    }
}

/// Traded volume for one date, paired with the bar of the same date
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub date: NaiveDate,
    pub volume: f64,
}

impl VolumeRecord {
    pub fn new(date: NaiveDate, volume: f64) -> Self {
        Self { date, volume }
    }
}

/// Closed price interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    /// Lowest low and highest high across `bars`, `None` when empty
    pub fn of_bars(bars: &[Bar]) -> Option<Self> {
        let mut iter = bars.iter();
        let first = iter.next()?;
        let mut range = Self { min: first.low, max: first.high };
        for bar in iter {
            range.min = range.min.min(bar.low);
            range.max = range.max.max(bar.high);
        }
        Some(range)
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_flat(&self) -> bool {
        self.span() <= 0.0
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

/// Date to volume lookup built once per series.
///
/// Dates with no record read as zero volume.
#[derive(Debug, Clone, Default)]
pub struct VolumeLookup {
    volumes: FxHashMap<NaiveDate, f64>,
}

impl VolumeLookup {
    /// Build the lookup, rejecting negative or non-finite volumes.
    /// A repeated date keeps the last record.
    pub fn from_records(records: &[VolumeRecord]) -> Result<Self, SeriesError> {
        let mut volumes = FxHashMap::default();
        volumes.reserve(records.len());

        for record in records {
            if !record.volume.is_finite() || record.volume < 0.0 {
                return Err(SeriesError::InvalidVolume {
                    date: record.date,
                    volume: record.volume,
                });
            }
            if volumes.insert(record.date, record.volume).is_some() {
                warn!("Duplicate volume record for {}, keeping the latest value {}", record.date, record.volume);
            }
        }

        Ok(Self { volumes })
    }

    pub fn volume_on(&self, date: NaiveDate) -> f64 {
        self.volumes.get(&date).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Validate an entire bar series: non-empty, strictly ascending unique dates,
/// every bar well formed. Returns the series-wide price range.
pub fn validate_series(bars: &[Bar]) -> Result<PriceRange, SeriesError> {
    let range = PriceRange::of_bars(bars).ok_or(SeriesError::EmptySeries("bars"))?;

    for bar in bars {
        bar.validate()?;
    }
    for pair in bars.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(SeriesError::UnorderedSeries {
                previous: pair[0].date,
                current: pair[1].date,
            });
        }
    }

    if range.is_flat() {
        return Err(SeriesError::FlatSeries(range.min));
    }
    Ok(range)
}
