pub mod config;
pub mod indicators;
pub mod registry;

pub use config::{StrategyConfig, StrategyFileConfig};
pub use indicators::{compute_indicators, IndicatorSnapshot};
pub use registry::{Strategy, StrategySignal};
