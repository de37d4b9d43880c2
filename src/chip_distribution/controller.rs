use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::common::constants::PROGRESS_REPORT_INTERVAL;
use crate::common::dates::lookback_start;
use crate::series::structs::validate_series;
use crate::series::{Bar, PriceRange, SeriesError, VolumeLookup, VolumeRecord};
use super::calculator::ChipDistributionCalculator;
use super::errors::ChipDistributionError;
use super::structs::{ChipConfig, ChipConfigUpdate, DistributionSnapshot, Lookback};

/// Lifecycle of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// No series loaded; only `initialize` and `update_options` are meaningful
    Uninitialized,
    /// Series loaded, cache empty or partially populated
    EmptyCache,
    /// Every date of the series has a cached snapshot
    Populated,
}

/// Cooperative cancellation flag for a running sweep.
///
/// Clones share the flag, so a handle taken before a sweep starts can stop it
/// from another thread. The flag stays set until `reset`: a sweep started
/// while it is set stops before its first bar.
#[derive(Debug, Clone, Default)]
pub struct PrecomputeCancellation {
    cancelled: Arc<AtomicBool>,
}

impl PrecomputeCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the handle can stop a later sweep
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Outcome of a completed sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputeSummary {
    /// Snapshots computed by this sweep
    pub computed: usize,
    /// Dates that were already cached and skipped
    pub cache_hits: usize,
    pub total: usize,
    pub elapsed: Duration,
}

/// Point-in-time view of a controller for status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: ControllerState,
    pub config: ChipConfig,
    pub bar_count: usize,
    pub cached_count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub price_range: Option<PriceRange>,
}

/// Snapshots keyed by bar position, paired with the configuration that produced them.
///
/// The configuration can only change through `reconfigure`, which drops every
/// snapshot in the same call.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    config: ChipConfig,
    slots: Vec<Option<Arc<DistributionSnapshot>>>,
    filled: usize,
}

impl SnapshotCache {
    pub fn new(config: ChipConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            filled: 0,
        }
    }

    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    /// Swap the configuration and drop all snapshots; returns how many were dropped
    pub fn reconfigure(&mut self, config: ChipConfig) -> usize {
        self.config = config;
        self.clear()
    }

    /// Drop all snapshots, keeping the slot count; returns how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.filled;
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.filled = 0;
        dropped
    }

    /// Resize for a new series; all previous snapshots are dropped
    pub fn reset_slots(&mut self, len: usize) {
        self.slots = vec![None; len];
        self.filled = 0;
    }

    pub fn get(&self, index: usize) -> Option<Arc<DistributionSnapshot>> {
        self.slots.get(index).and_then(|slot| slot.clone())
    }

    pub fn insert(&mut self, index: usize, snapshot: Arc<DistributionSnapshot>) {
        if let Some(slot) = self.slots.get_mut(index) {
            if slot.is_none() {
                self.filled += 1;
            }
            *slot = Some(snapshot);
        }
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_complete(&self) -> bool {
        !self.slots.is_empty() && self.filled == self.slots.len()
    }
}

/// Series state held once `initialize` succeeds
#[derive(Debug, Clone)]
struct LoadedSeries {
    bars: Vec<Bar>,
    volumes: VolumeLookup,
    date_index: FxHashMap<NaiveDate, usize>,
    price_range: PriceRange,
}

impl LoadedSeries {
    /// First bar index of the window ending at `index`
    fn window_start(&self, index: usize, lookback: Lookback) -> usize {
        match lookback {
            Lookback::Unbounded => 0,
            Lookback::Days(days) => {
                let earliest = lookback_start(self.bars[index].date, days);
                self.bars[..=index].partition_point(|bar| bar.date < earliest)
            }
        }
    }

    fn window(&self, index: usize, lookback: Lookback) -> &[Bar] {
        &self.bars[self.window_start(index, lookback)..=index]
    }

    fn snapshot_at(&self, index: usize, calculator: &ChipDistributionCalculator) -> DistributionSnapshot {
        let window = self.window(index, calculator.config().lookback);
        calculator.compute(window, &self.volumes, self.bars[index].date)
    }
}

/// Owns one instrument's series, the active configuration and the per-date
/// snapshot cache; drives full-series sweeps and point lookups.
#[derive(Debug)]
pub struct ChipDistributionController {
    series: Option<LoadedSeries>,
    cache: SnapshotCache,
    cancellation: PrecomputeCancellation,
}

impl Default for ChipDistributionController {
    fn default() -> Self {
        Self {
            series: None,
            cache: SnapshotCache::new(ChipConfig::default()),
            cancellation: PrecomputeCancellation::new(),
        }
    }
}

impl ChipDistributionController {
    pub fn new(config: ChipConfig) -> Result<Self, ChipDistributionError> {
        config.validate().map_err(ChipDistributionError::InvalidConfig)?;
        Ok(Self {
            series: None,
            cache: SnapshotCache::new(config),
            cancellation: PrecomputeCancellation::new(),
        })
    }

    /// Load a series, replacing any previous one and dropping the cache.
    ///
    /// Fails without touching current state when either input is empty, bars
    /// are not strictly ascending, a bar or volume is malformed, or the whole
    /// series trades at a single price.
    pub fn initialize(&mut self, bars: Vec<Bar>, volumes: &[VolumeRecord]) -> Result<(), ChipDistributionError> {
        if volumes.is_empty() {
            warn!("Rejected series initialization: no volume records");
            return Err(SeriesError::EmptySeries("volumes").into());
        }
        let price_range = validate_series(&bars).map_err(|e| {
            warn!("Rejected series initialization: {}", e);
            e
        })?;
        let volumes = VolumeLookup::from_records(volumes)?;

        let date_index: FxHashMap<NaiveDate, usize> =
            bars.iter().enumerate().map(|(index, bar)| (bar.date, index)).collect();

        info!(
            "Chip distribution series loaded: {} bars from {} to {}, price range [{:.4}, {:.4}], {} volume records",
            bars.len(),
            bars[0].date,
            bars[bars.len() - 1].date,
            price_range.min,
            price_range.max,
            volumes.len()
        );

        self.cache.reset_slots(bars.len());
        self.series = Some(LoadedSeries {
            bars,
            volumes,
            date_index,
            price_range,
        });
        Ok(())
    }

    /// Merge `update` into the active configuration and clear the cache.
    /// An invalid merged configuration is rejected and nothing changes.
    pub fn update_options(&mut self, update: ChipConfigUpdate) -> Result<ChipConfig, ChipDistributionError> {
        let previous = *self.cache.config();
        let merged = previous.merged(&update);
        merged.validate().map_err(|e| {
            warn!("Rejected chip distribution options {:?}: {}", update, e);
            ChipDistributionError::InvalidConfig(e)
        })?;

        let dropped = self.cache.reconfigure(merged);
        info!(
            "Chip distribution options updated: lookback {} -> {}, algorithm {} -> {}, bins {} -> {}, decay {} -> {} ({} cached snapshots dropped)",
            previous.lookback,
            merged.lookback,
            previous.algorithm,
            merged.algorithm,
            previous.bin_count,
            merged.bin_count,
            previous.decay_rate,
            merged.decay_rate,
            dropped
        );
        Ok(merged)
    }

    pub fn config(&self) -> &ChipConfig {
        self.cache.config()
    }

    pub fn state(&self) -> ControllerState {
        match &self.series {
            None => ControllerState::Uninitialized,
            Some(_) if self.cache.is_complete() => ControllerState::Populated,
            Some(_) => ControllerState::EmptyCache,
        }
    }

    /// Handle for cancelling a sweep from elsewhere
    pub fn cancellation_handle(&self) -> PrecomputeCancellation {
        self.cancellation.clone()
    }

    /// Uninitialized controller sharing this one's configuration and
    /// cancellation handle
    pub fn detached(&self) -> Self {
        Self {
            series: None,
            cache: SnapshotCache::new(*self.cache.config()),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Compute and cache a snapshot for every date of the series
    pub fn precompute_all(&mut self) -> Result<PrecomputeSummary, ChipDistributionError> {
        self.precompute_all_with_progress(|_, _| {})
    }

    /// Sweep the series in ascending date order, calling `progress(done, total)`
    /// every `PROGRESS_REPORT_INTERVAL` bars and once at the end.
    ///
    /// Dates already cached are skipped. The cancellation handle is checked
    /// before each bar and is never cleared here; a cancelled sweep keeps the
    /// snapshots it finished.
    pub fn precompute_all_with_progress<F>(&mut self, mut progress: F) -> Result<PrecomputeSummary, ChipDistributionError>
    where
        F: FnMut(usize, usize),
    {
        let series = self.series.as_ref().ok_or(ChipDistributionError::NotInitialized)?;
        let calculator = ChipDistributionCalculator::new(*self.cache.config());
        let total = series.bars.len();
        let started = Instant::now();

        info!(
            "Starting chip distribution sweep over {} bars ({} already cached, algorithm {}, lookback {})",
            total,
            self.cache.filled(),
            calculator.config().algorithm,
            calculator.config().lookback
        );

        let mut computed = 0;
        let mut cache_hits = 0;
        for index in 0..total {
            if self.cancellation.is_cancelled() {
                warn!("Chip distribution sweep cancelled after {} of {} bars", index, total);
                return Err(ChipDistributionError::Cancelled { completed: index, total });
            }

            if self.cache.get(index).is_some() {
                cache_hits += 1;
            } else {
                let snapshot = series.snapshot_at(index, &calculator);
                self.cache.insert(index, Arc::new(snapshot));
                computed += 1;
            }

            let done = index + 1;
            if done % PROGRESS_REPORT_INTERVAL == 0 && done < total {
                debug!("Chip distribution sweep progress: {}/{}", done, total);
                progress(done, total);
            }
        }
        progress(total, total);

        let summary = PrecomputeSummary {
            computed,
            cache_hits,
            total,
            elapsed: started.elapsed(),
        };
        info!(
            "Chip distribution sweep finished: {} computed, {} cache hits in {:?}",
            summary.computed, summary.cache_hits, summary.elapsed
        );
        Ok(summary)
    }

    /// Cached snapshot for `date`, computing and caching it on a miss
    pub fn compute(&mut self, date: NaiveDate) -> Result<Arc<DistributionSnapshot>, ChipDistributionError> {
        let series = self.series.as_ref().ok_or(ChipDistributionError::NotInitialized)?;
        let index = *series
            .date_index
            .get(&date)
            .ok_or(ChipDistributionError::DateNotFound(date))?;

        if let Some(snapshot) = self.cache.get(index) {
            return Ok(snapshot);
        }

        let calculator = ChipDistributionCalculator::new(*self.cache.config());
        let snapshot = Arc::new(series.snapshot_at(index, &calculator));
        self.cache.insert(index, Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Cache lookup only; never computes
    pub fn get(&self, date: NaiveDate) -> Option<Arc<DistributionSnapshot>> {
        let series = self.series.as_ref()?;
        let index = *series.date_index.get(&date)?;
        self.cache.get(index)
    }

    /// Drop every cached snapshot, keeping configuration and series
    pub fn clear_cache(&mut self) {
        let dropped = self.cache.clear();
        debug!("Chip distribution cache cleared ({} snapshots dropped)", dropped);
    }

    /// Window of bars that feeds the snapshot for `date`
    pub fn window_for(&self, date: NaiveDate) -> Result<&[Bar], ChipDistributionError> {
        let series = self.series.as_ref().ok_or(ChipDistributionError::NotInitialized)?;
        let index = *series
            .date_index
            .get(&date)
            .ok_or(ChipDistributionError::DateNotFound(date))?;
        Ok(series.window(index, self.cache.config().lookback))
    }

    pub fn status(&self) -> ControllerStatus {
        let bars = self.bars();
        ControllerStatus {
            state: self.state(),
            config: *self.cache.config(),
            bar_count: bars.len(),
            cached_count: self.cache.filled(),
            first_date: bars.first().map(|bar| bar.date),
            last_date: bars.last().map(|bar| bar.date),
            price_range: self.price_range(),
        }
    }

    /// Bar traded on `date`, if the series has one
    pub fn bar_on(&self, date: NaiveDate) -> Option<&Bar> {
        let series = self.series.as_ref()?;
        series.date_index.get(&date).map(|&index| &series.bars[index])
    }

    pub fn bars(&self) -> &[Bar] {
        self.series.as_ref().map(|s| s.bars.as_slice()).unwrap_or(&[])
    }

    /// Series-wide price extremes recorded at initialization
    pub fn price_range(&self) -> Option<PriceRange> {
        self.series.as_ref().map(|s| s.price_range)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.filled()
    }
}
