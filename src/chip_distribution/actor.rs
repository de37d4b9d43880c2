use std::sync::Arc;

use chrono::NaiveDate;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::{ActorStopReason, BoxError};
use kameo::message::{Context, Message};
use kameo::{Actor, mailbox::unbounded::UnboundedMailbox};
use tracing::{debug, error, info, warn};

use crate::series::{Bar, VolumeRecord};
use super::controller::{
    ChipDistributionController, ControllerStatus, PrecomputeCancellation, PrecomputeSummary,
};
use super::errors::ChipDistributionError;
use super::stats::ChipStatistics;
use super::structs::{ChipConfig, ChipConfigUpdate, DistributionSnapshot};

/// Chip distribution messages for telling (fire-and-forget)
#[derive(Debug, Clone)]
pub enum ChipDistributionTell {
    /// Drop every cached snapshot
    ClearCache,
}

/// Chip distribution messages for asking (request-response)
#[derive(Debug, Clone)]
pub enum ChipDistributionAsk {
    /// Load a series, replacing the current one
    Initialize {
        bars: Vec<Bar>,
        volumes: Vec<VolumeRecord>,
    },
    /// Merge options into the active configuration and clear the cache
    UpdateOptions(ChipConfigUpdate),
    /// Sweep the whole series
    PrecomputeAll,
    /// Snapshot for a date, computing on a cache miss
    Compute { date: NaiveDate },
    /// Snapshot for a date, cache only
    Get { date: NaiveDate },
    /// Derived statistics for a date, measured against that date's close
    GetStatistics { date: NaiveDate },
    GetStatus,
}

/// Chip distribution actor responses
#[derive(Debug, Clone)]
pub enum ChipDistributionReply {
    Initialized { bar_count: usize },
    Config(ChipConfig),
    Precomputed(PrecomputeSummary),
    Snapshot(Arc<DistributionSnapshot>),
    CachedSnapshot(Option<Arc<DistributionSnapshot>>),
    Statistics(ChipStatistics),
    Status(ControllerStatus),
}

/// Serves one instrument's chip distributions to the rest of the process.
///
/// A running sweep occupies the mailbox, so take `cancellation_handle()`
/// before spawning if the sweep may need to be stopped.
pub struct ChipDistributionActor {
    controller: ChipDistributionController,
    symbol: String,
    last_error: Option<Arc<String>>,
}

impl ChipDistributionActor {
    pub fn new(symbol: impl Into<String>, config: ChipConfig) -> Result<Self, ChipDistributionError> {
        Ok(Self {
            controller: ChipDistributionController::new(config)?,
            symbol: symbol.into(),
            last_error: None,
        })
    }

    pub fn cancellation_handle(&self) -> PrecomputeCancellation {
        self.controller.cancellation_handle()
    }

    /// Run the sweep on the blocking pool. The controller is moved out for the
    /// duration and a detached stand-in keeps the config and cancellation handle.
    async fn precompute_all(&mut self) -> Result<PrecomputeSummary, ChipDistributionError> {
        let stand_in = self.controller.detached();
        let mut controller = std::mem::replace(&mut self.controller, stand_in);
        let symbol = self.symbol.clone();

        let (controller, result) = tokio::task::spawn_blocking(move || {
            let result = controller.precompute_all_with_progress(|done, total| {
                info!("📊 {} chip distribution sweep: {}/{} bars", symbol, done, total);
            });
            (controller, result)
        })
        .await
        .map_err(|e| {
            error!("❌ Chip distribution sweep task failed, series dropped: {}", e);
            ChipDistributionError::SweepTask(e.to_string())
        })?;

        self.controller = controller;
        result
    }

    fn statistics(&mut self, date: NaiveDate) -> Result<ChipStatistics, ChipDistributionError> {
        let snapshot = self.controller.compute(date)?;
        let close = self
            .controller
            .bar_on(date)
            .map(|bar| bar.close)
            .ok_or(ChipDistributionError::DateNotFound(date))?;
        Ok(ChipStatistics::from_snapshot(&snapshot, close))
    }

    async fn handle_ask(&mut self, msg: ChipDistributionAsk) -> Result<ChipDistributionReply, ChipDistributionError> {
        match msg {
            ChipDistributionAsk::Initialize { bars, volumes } => {
                self.controller.initialize(bars, &volumes)?;
                Ok(ChipDistributionReply::Initialized {
                    bar_count: self.controller.bars().len(),
                })
            }
            ChipDistributionAsk::UpdateOptions(update) => {
                self.controller.update_options(update).map(ChipDistributionReply::Config)
            }
            ChipDistributionAsk::PrecomputeAll => self.precompute_all().await.map(ChipDistributionReply::Precomputed),
            ChipDistributionAsk::Compute { date } => self.controller.compute(date).map(ChipDistributionReply::Snapshot),
            ChipDistributionAsk::Get { date } => Ok(ChipDistributionReply::CachedSnapshot(self.controller.get(date))),
            ChipDistributionAsk::GetStatistics { date } => self.statistics(date).map(ChipDistributionReply::Statistics),
            ChipDistributionAsk::GetStatus => Ok(ChipDistributionReply::Status(self.controller.status())),
        }
    }
}

impl Actor for ChipDistributionActor {
    type Mailbox = UnboundedMailbox<Self>;

    fn name() -> &'static str {
        "ChipDistributionActor"
    }

    async fn on_start(&mut self, _actor_ref: ActorRef<Self>) -> Result<(), BoxError> {
        let config = self.controller.config();
        info!("🚀 Starting Chip Distribution Actor for {}", self.symbol);
        info!("  Algorithm: {}", config.algorithm);
        info!("  Lookback: {}", config.lookback);
        info!("  Bins: {}", config.bin_count);
        if config.algorithm.uses_decay_rate() {
            info!("  Decay rate: {}", config.decay_rate);
        }
        Ok(())
    }

    async fn on_stop(&mut self, _actor_ref: WeakActorRef<Self>, reason: ActorStopReason) -> Result<(), BoxError> {
        let status = self.controller.status();
        info!("🛑 Stopping Chip Distribution Actor for {}: {:?}", self.symbol, reason);
        info!("  Bars loaded: {}", status.bar_count);
        info!("  Snapshots cached: {}", status.cached_count);
        if let Some(e) = &self.last_error {
            warn!("  Last error: {}", e);
        }
        Ok(())
    }
}

impl Message<ChipDistributionTell> for ChipDistributionActor {
    type Reply = ();

    async fn handle(&mut self, msg: ChipDistributionTell, _ctx: Context<'_, Self, Self::Reply>) -> Self::Reply {
        match msg {
            ChipDistributionTell::ClearCache => {
                debug!("ChipDistributionActor received ClearCache for {}", self.symbol);
                self.controller.clear_cache();
            }
        }
    }
}

impl Message<ChipDistributionAsk> for ChipDistributionActor {
    type Reply = Result<ChipDistributionReply, String>;

    async fn handle(&mut self, msg: ChipDistributionAsk, _ctx: Context<'_, Self, Self::Reply>) -> Self::Reply {
        self.handle_ask(msg).await.map_err(|e| {
            error!("❌ Chip distribution request failed for {}: {}", self.symbol, e);
            let message = e.to_string();
            self.last_error = Some(Arc::new(message.clone()));
            message
        })
    }
}
