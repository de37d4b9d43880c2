/// Engine constants shared by the calculator, controller and loader

// Peak detection
pub const SECONDARY_PEAK_MIN_SEPARATION: f64 = 0.05; // fraction of the primary peak price

// Intrabar spreading kernel: exp(-(KERNEL_SHARPNESS * (p - 0.5))^2)
pub const KERNEL_SHARPNESS: f64 = 4.0;
pub const KERNEL_CENTER: f64 = 0.5;

// Sweep progress reporting
pub const PROGRESS_REPORT_INTERVAL: usize = 50; // bars between progress callbacks

// Configuration defaults
pub const DEFAULT_LOOKBACK_DAYS: u32 = 120;
pub const DEFAULT_DECAY_RATE: f64 = 0.05;
pub const DEFAULT_BIN_COUNT: usize = 100;
pub const MIN_BIN_COUNT: usize = 2;

// Derived statistics
pub const DEFAULT_COST_RANGE_COVERAGES: [f64; 2] = [0.70, 0.90];

// Date formats accepted from the serving layer
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d"; // 20240115
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d"; // 2024-01-15

// Default values
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_SYMBOL: &str = "000155.SZ";
