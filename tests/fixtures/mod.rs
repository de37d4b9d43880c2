#![allow(dead_code)]

use chip_distribution::chip_distribution::{ChipConfig, DistributionAlgorithm, Lookback};
use chip_distribution::series::{Bar, VolumeRecord};
use chrono::NaiveDate;

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, 1).unwrap() + chrono::Days::new(day as u64 - 1)
}

/// Bar spanning `[low, high]`, opening at the low and closing at the midpoint
pub fn create_test_bar(day: u32, low: f64, high: f64) -> Bar {
    Bar::new(date(day), low, high, low, (low + high) / 2.0)
}

/// One bar per calendar day starting 2024-07-01, each `width` wide and
/// stepping up by `step`
pub fn create_rising_series(len: u32, start_low: f64, width: f64, step: f64) -> Vec<Bar> {
    (1..=len)
        .map(|day| {
            let low = start_low + (day - 1) as f64 * step;
            create_test_bar(day, low, low + width)
        })
        .collect()
}

pub fn create_volumes(bars: &[Bar], volumes: &[f64]) -> Vec<VolumeRecord> {
    bars.iter()
        .zip(volumes)
        .map(|(bar, &volume)| VolumeRecord::new(bar.date, volume))
        .collect()
}

pub fn create_uniform_volumes(bars: &[Bar], volume: f64) -> Vec<VolumeRecord> {
    bars.iter().map(|bar| VolumeRecord::new(bar.date, volume)).collect()
}

pub fn create_test_config(algorithm: DistributionAlgorithm, lookback: Lookback, bin_count: usize) -> ChipConfig {
    ChipConfig {
        lookback,
        decay_rate: 0.05,
        bin_count,
        algorithm,
    }
}

/// Raw exchange export layout, newest row first
pub fn create_sample_csv(bars: &[Bar], volumes: &[f64]) -> String {
    let mut csv = String::from("ts_code,trade_date,open,high,low,close,vol\n");
    for (bar, volume) in bars.iter().zip(volumes).rev() {
        csv.push_str(&format!(
            "000155.SZ,{},{},{},{},{},{}\n",
            bar.date.format("%Y%m%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            volume
        ));
    }
    csv
}
