/// Chip Distribution Module
///
/// Estimates, for each trading day of a daily series, how traded volume is
/// spread across price levels: which prices holders most likely acquired
/// their position at. Bars inside a lookback window are weighted by age and
/// spread over equal-width price buckets with a bell-shaped intrabar kernel.
///
/// `controller` owns the series, the active configuration and a per-date
/// snapshot cache; `actor` exposes the controller over a kameo mailbox.
pub mod actor;
pub mod calculator;
pub mod controller;
pub mod errors;
pub mod stats;
pub mod structs;

pub use actor::{ChipDistributionActor, ChipDistributionAsk, ChipDistributionReply, ChipDistributionTell};
pub use calculator::{ChipDistributionCalculator, detect_peaks, kernel_weight};
pub use controller::{
    ChipDistributionController, ControllerState, ControllerStatus, PrecomputeCancellation,
    PrecomputeSummary, SnapshotCache,
};
pub use errors::ChipDistributionError;
pub use stats::{ChipStatistics, CostRange, average_cost, cost_range, profit_ratio};
pub use structs::{
    ChipConfig, ChipConfigUpdate, ChipPeak, DistributionAlgorithm, DistributionBin,
    DistributionSnapshot, Lookback, PeakIntensity,
};
