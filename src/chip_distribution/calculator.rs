use chrono::NaiveDate;
use tracing::debug;

use crate::common::constants::{KERNEL_CENTER, KERNEL_SHARPNESS, SECONDARY_PEAK_MIN_SEPARATION};
use crate::common::dates::calendar_day_distance;
use crate::series::{Bar, PriceRange, VolumeLookup};
use super::structs::{
    ChipConfig, ChipPeak, DistributionAlgorithm, DistributionBin, DistributionSnapshot, Lookback,
    PeakIntensity,
};

/// Computes one chip distribution snapshot for the terminal date of a window.
///
/// Stateless between calls: every call derives its own price range from the
/// window it is handed.
#[derive(Debug, Clone)]
pub struct ChipDistributionCalculator {
    config: ChipConfig,
}

impl ChipDistributionCalculator {
    pub fn new(config: ChipConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    /// Compute the distribution for `target` from `window`, the bars dated in
    /// `[window start, target]` in ascending order
    pub fn compute(&self, window: &[Bar], volumes: &VolumeLookup, target: NaiveDate) -> DistributionSnapshot {
        let range = match PriceRange::of_bars(window) {
            Some(range) if !range.is_flat() => range,
            Some(range) => {
                debug!("Flat window for {} at {:.4}, returning empty snapshot", target, range.min);
                return DistributionSnapshot::empty(target);
            }
            None => return DistributionSnapshot::empty(target),
        };

        let mut price_bins = PriceBins::new(range, self.config.bin_count);
        let horizon = self.linear_horizon(window, target);

        for bar in window {
            let volume = volumes.volume_on(bar.date);
            if volume <= 0.0 {
                continue;
            }
            let weight = self.bar_weight(bar.date, target, horizon);
            if weight <= 0.0 {
                continue;
            }
            price_bins.distribute_bar(bar, volume * weight);
        }

        let bins = price_bins.to_bins();
        let peaks = detect_peaks(&bins);

        debug!(
            "Computed chip distribution for {}: {} bars, {} non-empty bins, {} peaks",
            target,
            window.len(),
            bins.len(),
            peaks.len()
        );

        DistributionSnapshot { date: target, bins, peaks }
    }

    /// Recency weight of a bar dated `bar_date` relative to `target`
    pub fn bar_weight(&self, bar_date: NaiveDate, target: NaiveDate, horizon_days: f64) -> f64 {
        let days = calendar_day_distance(bar_date, target) as f64;
        match self.config.algorithm {
            DistributionAlgorithm::Cumulative => 1.0,
            DistributionAlgorithm::ExponentialDecay => (-self.config.decay_rate * days).exp(),
            DistributionAlgorithm::LinearDecay => (1.0 - days / horizon_days).max(0.0),
        }
    }

    /// Horizon in days for linear decay: the lookback when bounded, otherwise
    /// the calendar span of the window
    pub fn linear_horizon(&self, window: &[Bar], target: NaiveDate) -> f64 {
        match self.config.lookback {
            Lookback::Days(days) => days.max(1) as f64,
            Lookback::Unbounded => window
                .first()
                .map(|first| calendar_day_distance(first.date, target).max(1) as f64)
                .unwrap_or(1.0),
        }
    }
}

/// Bell-shaped intrabar weight for a relative position `p` in `[0, 1]` of the bar's range
pub fn kernel_weight(position: f64) -> f64 {
    let x = KERNEL_SHARPNESS * (position - KERNEL_CENTER);
    (-(x * x)).exp()
}

/// Equal-width price buckets over a window's range
#[derive(Debug, Clone)]
pub struct PriceBins {
    range: PriceRange,
    width: f64,
    volumes: Vec<f64>,
    /// Reused per bar: (bucket index, kernel weight)
    scratch: Vec<(usize, f64)>,
}

impl PriceBins {
    pub fn new(range: PriceRange, bin_count: usize) -> Self {
        let bin_count = bin_count.max(1);
        Self {
            range,
            width: range.span() / bin_count as f64,
            volumes: vec![0.0; bin_count],
            scratch: Vec::new(),
        }
    }

    pub fn bin_count(&self) -> usize {
        self.volumes.len()
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn midpoint(&self, index: usize) -> f64 {
        self.range.min + (index as f64 + 0.5) * self.width
    }

    /// Bucket containing `price`; the top edge belongs to the last bucket
    pub fn index_of(&self, price: f64) -> Option<usize> {
        if !self.range.contains(price) || self.width <= 0.0 {
            return None;
        }
        let raw = ((price - self.range.min) / self.width).floor() as usize;
        Some(raw.min(self.volumes.len() - 1))
    }

    pub fn volume_at(&self, index: usize) -> f64 {
        self.volumes.get(index).copied().unwrap_or(0.0)
    }

    /// Spread `weighted_volume` over the buckets whose midpoints lie in the
    /// bar's `[low, high]`, shaped by the intrabar kernel.
    ///
    /// This departs from adding `weighted_volume * exp(-(4(p - 0.5))^2)` to
    /// each bucket as-is. Each raw kernel value is divided by the sum over
    /// the bar's buckets, so the buckets receive exactly `weighted_volume`
    /// and wide bars do not outweigh narrow ones. A bar narrower than one
    /// bucket has no midpoint in range and puts its whole volume in the
    /// close bucket instead of being dropped.
    pub fn distribute_bar(&mut self, bar: &Bar, weighted_volume: f64) {
        if weighted_volume <= 0.0 {
            return;
        }

        if bar.high <= bar.low {
            // No range: everything at the close, dropped when outside the window
            if let Some(index) = self.index_of(bar.close) {
                self.volumes[index] += weighted_volume;
            }
            return;
        }

        let (first, last) = match (self.index_of(bar.low), self.index_of(bar.high)) {
            (Some(first), Some(last)) => (first, last),
            _ => return,
        };

        let span = bar.high - bar.low;
        self.scratch.clear();
        for index in first..=last {
            let midpoint = self.midpoint(index);
            if midpoint < bar.low || midpoint > bar.high {
                continue;
            }
            let position = (midpoint - bar.low) / span;
            self.scratch.push((index, kernel_weight(position)));
        }

        let kernel_total: f64 = self.scratch.iter().map(|(_, k)| k).sum();
        if kernel_total <= 0.0 {
            // Bar narrower than one bucket: no midpoint inside it
            let anchor = bar.close.clamp(bar.low, bar.high);
            if let Some(index) = self.index_of(anchor) {
                self.volumes[index] += weighted_volume;
            }
            return;
        }

        for &(index, kernel) in &self.scratch {
            self.volumes[index] += weighted_volume * kernel / kernel_total;
        }
    }

    /// Non-empty buckets as (midpoint, volume), ascending by price
    pub fn to_bins(&self) -> Vec<DistributionBin> {
        self.volumes
            .iter()
            .enumerate()
            .filter(|&(_, &volume)| volume > 0.0)
            .map(|(index, &volume)| DistributionBin {
                price: self.midpoint(index),
                volume,
            })
            .collect()
    }
}

/// Primary peak = heaviest bin; secondary = next heaviest bin whose price is
/// more than 5% away from the primary. Equal volumes keep ascending price order.
pub fn detect_peaks(bins: &[DistributionBin]) -> Vec<ChipPeak> {
    let mut ranked: Vec<&DistributionBin> = bins.iter().collect();
    ranked.sort_by(|a, b| b.volume.partial_cmp(&a.volume).unwrap_or(std::cmp::Ordering::Equal));

    let Some(primary) = ranked.first() else {
        return Vec::new();
    };

    let mut peaks = vec![ChipPeak {
        price: primary.price,
        intensity: PeakIntensity::High,
    }];

    let min_separation = primary.price.abs() * SECONDARY_PEAK_MIN_SEPARATION;
    if let Some(secondary) = ranked
        .iter()
        .skip(1)
        .find(|bin| (bin.price - primary.price).abs() > min_separation)
    {
        peaks.push(ChipPeak {
            price: secondary.price,
            intensity: PeakIntensity::Medium,
        });
    }

    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::VolumeRecord;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn config(algorithm: DistributionAlgorithm, lookback: Lookback, bin_count: usize) -> ChipConfig {
        ChipConfig {
            lookback,
            decay_rate: 0.1,
            bin_count,
            algorithm,
        }
    }

    fn lookup(records: &[(u32, f64)]) -> VolumeLookup {
        let records: Vec<VolumeRecord> = records.iter().map(|&(d, v)| VolumeRecord::new(date(d), v)).collect();
        VolumeLookup::from_records(&records).unwrap()
    }

    #[test]
    fn test_kernel_weight_shape() {
        assert!((kernel_weight(0.5) - 1.0).abs() < 1e-12);
        assert!((kernel_weight(0.0) - (-4.0f64).exp()).abs() < 1e-12);
        assert!((kernel_weight(0.25) - kernel_weight(0.75)).abs() < 1e-12);
        assert!(kernel_weight(0.4) > kernel_weight(0.2));
    }

    #[test]
    fn test_price_bins_geometry() {
        let bins = PriceBins::new(PriceRange { min: 10.0, max: 20.0 }, 5);
        assert_eq!(bins.bin_count(), 5);
        assert!((bins.width() - 2.0).abs() < 1e-12);
        assert!((bins.midpoint(0) - 11.0).abs() < 1e-12);
        assert!((bins.midpoint(4) - 19.0).abs() < 1e-12);
        assert_eq!(bins.index_of(10.0), Some(0));
        assert_eq!(bins.index_of(11.99), Some(0));
        assert_eq!(bins.index_of(12.0), Some(1));
        assert_eq!(bins.index_of(20.0), Some(4));
        assert_eq!(bins.index_of(9.99), None);
        assert_eq!(bins.index_of(20.01), None);
    }

    #[test]
    fn test_distribute_bar_conserves_volume_and_peaks_in_middle() {
        let mut bins = PriceBins::new(PriceRange { min: 10.0, max: 20.0 }, 10);
        bins.distribute_bar(&Bar::new(date(2), 12.0, 20.0, 10.0, 15.0), 1000.0);

        let total: f64 = (0..10).map(|i| bins.volume_at(i)).sum();
        assert!((total - 1000.0).abs() < 1e-9);
        // Symmetric kernel: middle buckets heaviest, edges lightest
        assert!(bins.volume_at(4) > bins.volume_at(0));
        assert!((bins.volume_at(4) - bins.volume_at(5)).abs() < 1e-9);
        assert!((bins.volume_at(0) - bins.volume_at(9)).abs() < 1e-9);
    }

    #[test]
    fn test_flat_bar_goes_to_close_bucket() {
        let mut bins = PriceBins::new(PriceRange { min: 10.0, max: 20.0 }, 5);
        bins.distribute_bar(&Bar::new(date(2), 13.0, 13.0, 13.0, 13.0), 300.0);
        assert_eq!(bins.volume_at(1), 300.0);

        // Close outside the window range is dropped
        bins.distribute_bar(&Bar::new(date(3), 25.0, 25.0, 25.0, 25.0), 300.0);
        let total: f64 = (0..5).map(|i| bins.volume_at(i)).sum();
        assert_eq!(total, 300.0);
    }

    #[test]
    fn test_narrow_bar_without_midpoint_uses_close_bucket() {
        let mut bins = PriceBins::new(PriceRange { min: 10.0, max: 20.0 }, 5);
        // [12.1, 12.4] contains no midpoint (midpoints at 11, 13, ...)
        bins.distribute_bar(&Bar::new(date(2), 12.2, 12.4, 12.1, 12.3), 50.0);
        assert_eq!(bins.volume_at(1), 50.0);
    }

    #[test]
    fn test_cumulative_weight_ignores_age() {
        let calc = ChipDistributionCalculator::new(config(DistributionAlgorithm::Cumulative, Lookback::Unbounded, 10));
        assert_eq!(calc.bar_weight(date(1), date(31), 30.0), 1.0);
        assert_eq!(calc.bar_weight(date(31), date(31), 30.0), 1.0);
    }

    #[test]
    fn test_exponential_weight() {
        let calc = ChipDistributionCalculator::new(config(DistributionAlgorithm::ExponentialDecay, Lookback::Days(30), 10));
        assert_eq!(calc.bar_weight(date(10), date(10), 30.0), 1.0);
        assert!((calc.bar_weight(date(5), date(10), 30.0) - (-0.5f64).exp()).abs() < 1e-12);
        assert!(calc.bar_weight(date(1), date(10), 30.0) < calc.bar_weight(date(5), date(10), 30.0));
    }

    #[test]
    fn test_linear_weight_floors_at_zero() {
        let calc = ChipDistributionCalculator::new(config(DistributionAlgorithm::LinearDecay, Lookback::Days(4), 10));
        let horizon = calc.linear_horizon(&[], date(10));
        assert_eq!(horizon, 4.0);
        assert_eq!(calc.bar_weight(date(10), date(10), horizon), 1.0);
        assert!((calc.bar_weight(date(8), date(10), horizon) - 0.5).abs() < 1e-12);
        assert_eq!(calc.bar_weight(date(6), date(10), horizon), 0.0);
        assert_eq!(calc.bar_weight(date(1), date(10), horizon), 0.0);
    }

    #[test]
    fn test_linear_horizon_unbounded_uses_window_span() {
        let calc = ChipDistributionCalculator::new(config(DistributionAlgorithm::LinearDecay, Lookback::Unbounded, 10));
        let window = vec![
            Bar::new(date(2), 10.0, 11.0, 9.0, 10.0),
            Bar::new(date(12), 10.0, 11.0, 9.0, 10.0),
        ];
        assert_eq!(calc.linear_horizon(&window, date(12)), 10.0);
        assert_eq!(calc.linear_horizon(&window[1..], date(12)), 1.0);
    }

    #[test]
    fn test_empty_and_flat_windows_yield_empty_snapshot() {
        let calc = ChipDistributionCalculator::new(ChipConfig::default());
        let volumes = lookup(&[(2, 100.0), (3, 100.0)]);

        let empty = calc.compute(&[], &volumes, date(3));
        assert!(empty.bins.is_empty() && empty.peaks.is_empty());
        assert_eq!(empty.date, date(3));

        let flat = vec![
            Bar::new(date(2), 8.0, 8.0, 8.0, 8.0),
            Bar::new(date(3), 8.0, 8.0, 8.0, 8.0),
        ];
        let snapshot = calc.compute(&flat, &volumes, date(3));
        assert!(snapshot.bins.is_empty() && snapshot.peaks.is_empty());
    }

    #[test]
    fn test_zero_volume_window_yields_empty_snapshot() {
        let calc = ChipDistributionCalculator::new(ChipConfig::default());
        let window = vec![
            Bar::new(date(2), 10.0, 11.0, 9.0, 10.0),
            Bar::new(date(3), 10.0, 12.0, 9.5, 11.0),
        ];
        let snapshot = calc.compute(&window, &lookup(&[(2, 0.0)]), date(3));
        assert!(snapshot.bins.is_empty());
        assert!(snapshot.peaks.is_empty());
    }

    #[test]
    fn test_compute_bins_sorted_and_conserved() {
        let calc = ChipDistributionCalculator::new(config(DistributionAlgorithm::Cumulative, Lookback::Unbounded, 20));
        let window = vec![
            Bar::new(date(2), 10.0, 11.0, 9.0, 10.5),
            Bar::new(date(3), 10.5, 12.0, 10.0, 11.5),
            Bar::new(date(4), 11.5, 13.0, 11.0, 12.0),
        ];
        let snapshot = calc.compute(&window, &lookup(&[(2, 100.0), (3, 200.0), (4, 300.0)]), date(4));

        assert!(snapshot.bins.windows(2).all(|w| w[0].price < w[1].price));
        assert!(snapshot.bins.iter().all(|b| b.volume > 0.0));
        assert!((snapshot.total_volume() - 600.0).abs() < 1e-9);
        assert!(snapshot.bins.iter().all(|b| b.price >= 9.0 && b.price <= 13.0));
    }

    #[test]
    fn test_detect_peaks_primary_and_separated_secondary() {
        let bins = vec![
            DistributionBin { price: 10.0, volume: 50.0 },
            DistributionBin { price: 10.2, volume: 90.0 },
            DistributionBin { price: 10.4, volume: 80.0 },
            DistributionBin { price: 12.0, volume: 60.0 },
        ];
        let peaks = detect_peaks(&bins);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0], ChipPeak { price: 10.2, intensity: PeakIntensity::High });
        // 10.4 is within 5% of 10.2, so the secondary is the 12.0 cluster
        assert_eq!(peaks[1], ChipPeak { price: 12.0, intensity: PeakIntensity::Medium });
    }

    #[test]
    fn test_detect_peaks_without_distinct_secondary() {
        let bins = vec![
            DistributionBin { price: 10.0, volume: 50.0 },
            DistributionBin { price: 10.1, volume: 90.0 },
        ];
        let peaks = detect_peaks(&bins);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].intensity, PeakIntensity::High);
        assert!(detect_peaks(&[]).is_empty());
    }

    #[test]
    fn test_detect_peaks_ties_keep_lowest_price() {
        let bins = vec![
            DistributionBin { price: 10.0, volume: 70.0 },
            DistributionBin { price: 20.0, volume: 70.0 },
        ];
        let peaks = detect_peaks(&bins);
        assert_eq!(peaks[0].price, 10.0);
        assert_eq!(peaks[1].price, 20.0);
    }
}
