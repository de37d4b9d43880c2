use chip_distribution::chip_distribution::{
    ChipConfig, ChipDistributionActor, ChipDistributionAsk, ChipDistributionReply,
};
use chip_distribution::common::constants::{DEFAULT_CONFIG_PATH, DEFAULT_SYMBOL};
use chip_distribution::common::dates::{format_trade_date, parse_trade_date};
use chip_distribution::logging::{cleanup_old_logs, init_dual_logging, init_simple_logging, log_run_info, LoggingConfig};
use chip_distribution::series::load_series_csv;
use kameo::request::MessageSend;
use serde::Deserialize;
use tracing::{error, info, warn};

/// Where the daily series comes from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SeriesConfig {
    pub csv_path: String,
    pub symbol: String,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            csv_path: format!("data/{}.csv", DEFAULT_SYMBOL),
            symbol: DEFAULT_SYMBOL.to_string(),
        }
    }
}

/// Full TOML configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct AppConfig {
    pub series: SeriesConfig,
    pub chip_distribution: ChipConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let config_content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&config_content)?;
        config.chip_distribution.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let target_arg = args.next();

    let config = match AppConfig::from_toml(&config_path) {
        Ok(config) => {
            // Simple print until logging is initialized
            println!("✅ Loaded configuration from {}", config_path);
            config
        }
        Err(e) => {
            println!("⚠️ Failed to load {}: {}. Using default configuration", config_path, e);
            AppConfig::default()
        }
    };

    let logging_guard = match init_dual_logging(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("❌ Failed to initialize logging system: {}", e);
            if let Err(e) = init_simple_logging() {
                eprintln!("❌ Fallback console logging failed too: {}", e);
            }
            None
        }
    };

    if config.logging.cleanup_days > 0 {
        if let Err(e) = cleanup_old_logs(&config.logging.log_dir, config.logging.cleanup_days) {
            warn!("⚠️ Failed to clean up old log files: {}", e);
        }
    }

    log_run_info();

    if let Err(e) = run(config, target_arg).await {
        error!("❌ Chip distribution run failed: {}", e);
        // Flush buffered file output before exiting
        drop(logging_guard);
        std::process::exit(1);
    }
}

async fn run(config: AppConfig, target_arg: Option<String>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        symbol = %config.series.symbol,
        csv_path = %config.series.csv_path,
        algorithm = %config.chip_distribution.algorithm,
        lookback = %config.chip_distribution.lookback,
        bin_count = config.chip_distribution.bin_count,
        "⚙️ Configuration loaded"
    );

    let (bars, volumes) = load_series_csv(&config.series.csv_path)?;

    let target_date = match target_arg {
        Some(raw) => parse_trade_date(&raw).ok_or_else(|| format!("Invalid target date: {}", raw))?,
        None => bars.last().map(|bar| bar.date).ok_or("Series has no bars")?,
    };

    let actor = ChipDistributionActor::new(config.series.symbol.clone(), config.chip_distribution)?;
    let cancellation = actor.cancellation_handle();
    let actor_ref = kameo::spawn(actor);

    // First Ctrl-C stops the sweep between bars, a second one exits
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancellation.is_cancelled() {
                warn!("🛑 Second interrupt received, exiting");
                std::process::exit(130);
            }
            warn!("🛑 Interrupt received, cancelling sweep");
            cancellation.cancel();
        }
    });

    actor_ref
        .ask(ChipDistributionAsk::Initialize { bars, volumes })
        .send()
        .await
        .map_err(|e| format!("Failed to initialize series: {}", e))?;

    match actor_ref.ask(ChipDistributionAsk::PrecomputeAll).send().await {
        Ok(ChipDistributionReply::Precomputed(summary)) => {
            info!("✅ Precomputed {} snapshots in {:?}", summary.computed, summary.elapsed);
        }
        Ok(other) => return Err(format!("Unexpected reply to PrecomputeAll: {:?}", other).into()),
        Err(e) => return Err(format!("Precompute failed: {}", e).into()),
    }

    let snapshot = match actor_ref.ask(ChipDistributionAsk::Get { date: target_date }).send().await {
        Ok(ChipDistributionReply::CachedSnapshot(Some(snapshot))) => snapshot,
        Ok(ChipDistributionReply::CachedSnapshot(None)) => {
            return Err(format!("No snapshot for {}", format_trade_date(target_date)).into())
        }
        Ok(other) => return Err(format!("Unexpected reply to Get: {:?}", other).into()),
        Err(e) => return Err(format!("Snapshot lookup failed: {}", e).into()),
    };

    let statistics = match actor_ref
        .ask(ChipDistributionAsk::GetStatistics { date: target_date })
        .send()
        .await
    {
        Ok(ChipDistributionReply::Statistics(statistics)) => statistics,
        Ok(other) => return Err(format!("Unexpected reply to GetStatistics: {:?}", other).into()),
        Err(e) => return Err(format!("Statistics failed: {}", e).into()),
    };

    let report = serde_json::json!({
        "symbol": config.series.symbol,
        "date": format_trade_date(target_date),
        "snapshot": &*snapshot,
        "statistics": statistics,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
