pub mod chip_distribution;
pub mod common;
pub mod logging;
pub mod series;
