use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::common::constants::{
    DEFAULT_BIN_COUNT, DEFAULT_DECAY_RATE, DEFAULT_LOOKBACK_DAYS, MIN_BIN_COUNT,
};

/// Historical window considered for each target date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookback {
    /// Bars dated within this many calendar days before the target (inclusive)
    Days(u32),
    /// Every bar from the start of the series
    Unbounded,
}

impl Default for Lookback {
    fn default() -> Self {
        Self::Days(DEFAULT_LOOKBACK_DAYS)
    }
}

impl std::fmt::Display for Lookback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Days(days) => write!(f, "{}d", days),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Weighting policy applied to each bar of the window.
///
/// - Cumulative: every bar counts fully regardless of age
/// - ExponentialDecay: weight = exp(-decay_rate * days_from_target)
/// - LinearDecay: weight = max(0, 1 - days_from_target / horizon)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionAlgorithm {
    Cumulative,
    ExponentialDecay,
    LinearDecay,
}

impl Default for DistributionAlgorithm {
    fn default() -> Self {
        Self::ExponentialDecay
    }
}

impl DistributionAlgorithm {
    /// Whether `decay_rate` has any effect under this algorithm
    pub fn uses_decay_rate(&self) -> bool {
        matches!(self, Self::ExponentialDecay)
    }
}

impl std::fmt::Display for DistributionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cumulative => write!(f, "Cumulative"),
            Self::ExponentialDecay => write!(f, "ExponentialDecay"),
            Self::LinearDecay => write!(f, "LinearDecay"),
        }
    }
}

impl std::str::FromStr for DistributionAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "cumulative" => Ok(Self::Cumulative),
            "exponential" | "exponential_decay" | "exponentialdecay" => Ok(Self::ExponentialDecay),
            "linear" | "linear_decay" | "lineardecay" => Ok(Self::LinearDecay),
            _ => Err(format!(
                "Invalid distribution algorithm: {}. Valid options: cumulative, exponential_decay, linear_decay",
                s
            )),
        }
    }
}

fn default_decay_rate() -> f64 {
    DEFAULT_DECAY_RATE
}

fn default_bin_count() -> usize {
    DEFAULT_BIN_COUNT
}

/// Chip distribution configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChipConfig {
    #[serde(default)]
    pub lookback: Lookback,
    /// Per-day decay for ExponentialDecay, ignored otherwise
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,
    #[serde(default = "default_bin_count")]
    pub bin_count: usize,
    #[serde(default)]
    pub algorithm: DistributionAlgorithm,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            lookback: Lookback::default(),
            decay_rate: DEFAULT_DECAY_RATE,
            bin_count: DEFAULT_BIN_COUNT,
            algorithm: DistributionAlgorithm::default(),
        }
    }
}

impl ChipConfig {
    /// Validate configuration for consistency and reasonable values
    pub fn validate(&self) -> Result<(), String> {
        if self.bin_count < MIN_BIN_COUNT {
            return Err(format!("bin_count must be at least {}, got {}", MIN_BIN_COUNT, self.bin_count));
        }

        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(format!("decay_rate must be a non-negative finite number, got {}", self.decay_rate));
        }

        if let Lookback::Days(0) = self.lookback {
            return Err("lookback must be at least 1 day or unbounded".to_string());
        }

        Ok(())
    }

    /// Apply the fields present in `update`, leaving the rest unchanged
    pub fn merged(&self, update: &ChipConfigUpdate) -> Self {
        Self {
            lookback: update.lookback.unwrap_or(self.lookback),
            decay_rate: update.decay_rate.unwrap_or(self.decay_rate),
            bin_count: update.bin_count.unwrap_or(self.bin_count),
            algorithm: update.algorithm.unwrap_or(self.algorithm),
        }
    }
}

/// Partial configuration accepted by `update_options`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChipConfigUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookback: Option<Lookback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<DistributionAlgorithm>,
}

impl ChipConfigUpdate {
    pub fn lookback(mut self, lookback: Lookback) -> Self {
        self.lookback = Some(lookback);
        self
    }

    pub fn decay_rate(mut self, decay_rate: f64) -> Self {
        self.decay_rate = Some(decay_rate);
        self
    }

    pub fn bin_count(mut self, bin_count: usize) -> Self {
        self.bin_count = Some(bin_count);
        self
    }

    pub fn algorithm(mut self, algorithm: DistributionAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }
}

impl From<ChipConfig> for ChipConfigUpdate {
    fn from(config: ChipConfig) -> Self {
        Self {
            lookback: Some(config.lookback),
            decay_rate: Some(config.decay_rate),
            bin_count: Some(config.bin_count),
            algorithm: Some(config.algorithm),
        }
    }
}

/// One non-empty histogram bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionBin {
    /// Bucket midpoint
    pub price: f64,
    /// Weighted volume attributed to the bucket
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakIntensity {
    High,
    Medium,
}

/// Likely cost-basis cluster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChipPeak {
    pub price: f64,
    pub intensity: PeakIntensity,
}

/// Chip distribution for one target date under one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSnapshot {
    pub date: NaiveDate,
    /// Non-empty buckets, ascending by price
    pub bins: Vec<DistributionBin>,
    /// Primary peak first, then at most one secondary peak
    pub peaks: Vec<ChipPeak>,
}

impl DistributionSnapshot {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            bins: Vec::new(),
            peaks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn total_volume(&self) -> f64 {
        self.bins.iter().map(|b| b.volume).sum()
    }

    pub fn primary_peak(&self) -> Option<&ChipPeak> {
        self.peaks.iter().find(|p| p.intensity == PeakIntensity::High)
    }
}
