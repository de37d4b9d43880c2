use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::common::constants::DEFAULT_COST_RANGE_COVERAGES;
use super::structs::DistributionSnapshot;

/// Tolerance when comparing accumulated volume against a quantile threshold
const QUANTILE_EPSILON: f64 = 1e-9;

/// Price band holding the central `coverage` share of the chips
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRange {
    pub coverage: f64,
    pub low: f64,
    pub high: f64,
    /// (high - low) / (high + low); smaller means tighter clustering
    pub concentration: f64,
}

/// Summary figures derived from one snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipStatistics {
    pub date: NaiveDate,
    /// Price the profit ratio was measured against
    pub reference_price: f64,
    pub profit_ratio: f64,
    pub average_cost: Option<f64>,
    pub cost_ranges: Vec<CostRange>,
}

impl ChipStatistics {
    /// Derive the standard figures, measuring profit against `reference_price`
    /// (normally the close of the target date).
    pub fn from_snapshot(snapshot: &DistributionSnapshot, reference_price: f64) -> Self {
        Self {
            date: snapshot.date,
            reference_price,
            profit_ratio: profit_ratio(snapshot, reference_price),
            average_cost: average_cost(snapshot),
            cost_ranges: DEFAULT_COST_RANGE_COVERAGES
                .iter()
                .filter_map(|&coverage| cost_range(snapshot, coverage))
                .collect(),
        }
    }
}

/// Share of chips held at or below `price`, in [0, 1]. Empty snapshots give 0.
pub fn profit_ratio(snapshot: &DistributionSnapshot, price: f64) -> f64 {
    let total = snapshot.total_volume();
    if total <= 0.0 {
        return 0.0;
    }
    let below: f64 = snapshot
        .bins
        .iter()
        .filter(|bin| bin.price <= price)
        .map(|bin| bin.volume)
        .sum();
    (below / total).clamp(0.0, 1.0)
}

/// Volume-weighted mean price of the chips
pub fn average_cost(snapshot: &DistributionSnapshot) -> Option<f64> {
    let total = snapshot.total_volume();
    if total <= 0.0 {
        return None;
    }
    let weighted: f64 = snapshot.bins.iter().map(|bin| bin.price * bin.volume).sum();
    Some(weighted / total)
}

/// Band between the (1 - coverage) / 2 and (1 + coverage) / 2 volume quantiles.
/// `None` for an empty snapshot or a coverage outside (0, 1].
pub fn cost_range(snapshot: &DistributionSnapshot, coverage: f64) -> Option<CostRange> {
    if !(coverage > 0.0 && coverage <= 1.0) {
        return None;
    }
    let total = snapshot.total_volume();
    if total <= 0.0 {
        return None;
    }

    let low_target = total * (1.0 - coverage) / 2.0;
    let high_target = total * (1.0 + coverage) / 2.0;

    let mut accumulated = 0.0;
    let mut low = None;
    let mut high = None;
    for bin in &snapshot.bins {
        accumulated += bin.volume;
        if low.is_none() && accumulated + QUANTILE_EPSILON >= low_target {
            low = Some(bin.price);
        }
        if accumulated + QUANTILE_EPSILON >= high_target {
            high = Some(bin.price);
            break;
        }
    }

    let low = low?;
    let high = high.or_else(|| snapshot.bins.last().map(|bin| bin.price))?;
    let denominator = high + low;
    let concentration = if denominator.abs() > f64::EPSILON {
        (high - low) / denominator
    } else {
        0.0
    };

    Some(CostRange {
        coverage,
        low,
        high,
        concentration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chip_distribution::structs::DistributionBin;

    fn snapshot(bins: &[(f64, f64)]) -> DistributionSnapshot {
        DistributionSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            bins: bins
                .iter()
                .map(|&(price, volume)| DistributionBin { price, volume })
                .collect(),
            peaks: Vec::new(),
        }
    }

    #[test]
    fn test_profit_ratio() {
        let s = snapshot(&[(10.0, 20.0), (11.0, 30.0), (12.0, 50.0)]);
        assert_eq!(profit_ratio(&s, 9.0), 0.0);
        assert!((profit_ratio(&s, 11.0) - 0.5).abs() < 1e-12);
        assert!((profit_ratio(&s, 11.5) - 0.5).abs() < 1e-12);
        assert_eq!(profit_ratio(&s, 20.0), 1.0);
        assert_eq!(profit_ratio(&snapshot(&[]), 10.0), 0.0);
    }

    #[test]
    fn test_average_cost() {
        let s = snapshot(&[(10.0, 1.0), (20.0, 3.0)]);
        assert!((average_cost(&s).unwrap() - 17.5).abs() < 1e-12);
        assert!(average_cost(&snapshot(&[])).is_none());
    }

    #[test]
    fn test_cost_range_quantiles() {
        // Ten equal buckets, 10 units each
        let bins: Vec<(f64, f64)> = (1..=10).map(|i| (i as f64, 10.0)).collect();
        let s = snapshot(&bins);

        let range = cost_range(&s, 0.8).unwrap();
        // 10% and 90% of 100 units
        assert_eq!(range.low, 1.0);
        assert_eq!(range.high, 9.0);
        assert!((range.concentration - 0.8).abs() < 1e-12);

        let full = cost_range(&s, 1.0).unwrap();
        assert_eq!(full.low, 1.0);
        assert_eq!(full.high, 10.0);
    }

    #[test]
    fn test_cost_range_single_bucket() {
        let s = snapshot(&[(15.0, 42.0)]);
        let range = cost_range(&s, 0.7).unwrap();
        assert_eq!(range.low, 15.0);
        assert_eq!(range.high, 15.0);
        assert_eq!(range.concentration, 0.0);
    }

    #[test]
    fn test_cost_range_rejects_bad_input() {
        let s = snapshot(&[(10.0, 1.0)]);
        assert!(cost_range(&s, 0.0).is_none());
        assert!(cost_range(&s, 1.5).is_none());
        assert!(cost_range(&s, f64::NAN).is_none());
        assert!(cost_range(&snapshot(&[]), 0.9).is_none());
    }

    #[test]
    fn test_statistics_from_snapshot() {
        let s = snapshot(&[(10.0, 25.0), (11.0, 50.0), (12.0, 25.0)]);
        let stats = ChipStatistics::from_snapshot(&s, 11.0);

        assert_eq!(stats.date, s.date);
        assert!((stats.profit_ratio - 0.75).abs() < 1e-12);
        assert!((stats.average_cost.unwrap() - 11.0).abs() < 1e-12);
        assert_eq!(stats.cost_ranges.len(), DEFAULT_COST_RANGE_COVERAGES.len());
        assert!(stats.cost_ranges.iter().all(|r| r.low <= r.high));

        let empty = ChipStatistics::from_snapshot(&snapshot(&[]), 11.0);
        assert_eq!(empty.profit_ratio, 0.0);
        assert!(empty.average_cost.is_none());
        assert!(empty.cost_ranges.is_empty());
    }
}
