use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::info;

use common::{Error, Result, ScannerConfig, ScannerConfigRepository};

/// Strategy seed file (TOML), inserted on first boot when no configs exist.
///
/// Example `config/strategies.toml`:
/// ```toml
/// [[strategy]]
/// name = "rsiOversold"
/// description = "RSI oversold/overbought"
/// timeframes = ["1h", "4h", "1d"]
/// pairs = ["EURUSD", "GBPUSD"]
/// enabled = true
/// scan_interval = 60
///
/// [strategy.rules]
/// rsiOverbought = 70
/// rsiOversold = 30
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(rename = "strategy")]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy name, selects the evaluator (e.g. "rsiOversold").
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub timeframes: Vec<String>,
    pub pairs: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_scan_interval")]
    pub scan_interval: i64,
    /// Strategy-specific thresholds.
    #[serde(default)]
    pub rules: HashMap<String, toml::Value>,
}

fn default_enabled() -> bool {
    true
}

fn default_scan_interval() -> i64 {
    60
}

impl StrategyConfig {
    /// Convert into a config record with a fresh id.
    pub fn to_record(&self) -> Result<ScannerConfig> {
        let mut rules = Map::new();
        for (key, value) in &self.rules {
            rules.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(ScannerConfig {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_name: self.name.clone(),
            description: self.description.clone(),
            rules,
            timeframes: self.timeframes.clone(),
            pairs: self.pairs.clone(),
            is_enabled: self.enabled,
            scan_interval: self.scan_interval,
            created_at: Utc::now(),
        })
    }
}

impl StrategyFileConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Failed to parse strategy config at '{path}': {e}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Built-in strategies used when no seed file is configured.
    pub fn defaults() -> Self {
        fn rules(entries: &[(&str, i64)]) -> HashMap<String, toml::Value> {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), toml::Value::Integer(*v)))
                .collect()
        }
        fn list(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }

        Self {
            strategies: vec![
                StrategyConfig {
                    name: "rsiOversold".into(),
                    description: Some(
                        "RSI Oversold/Overbought Strategy - Generates signals when RSI crosses threshold levels".into(),
                    ),
                    timeframes: list(&["1h", "4h", "1d"]),
                    pairs: list(&["EURUSD", "GBPUSD", "USDJPY", "AUDUSD", "USDCAD"]),
                    enabled: true,
                    scan_interval: 60,
                    rules: rules(&[("rsiOverbought", 70), ("rsiOversold", 30)]),
                },
                StrategyConfig {
                    name: "macdCrossover".into(),
                    description: Some(
                        "MACD Crossover Strategy - Signals on MACD line crossing signal line".into(),
                    ),
                    timeframes: list(&["4h", "1d"]),
                    pairs: list(&["EURUSD", "GBPUSD", "USDJPY", "BTCUSD", "ETHUSD"]),
                    enabled: true,
                    scan_interval: 120,
                    rules: rules(&[("minHistogram", 0)]),
                },
                StrategyConfig {
                    name: "movingAverageCross".into(),
                    description: Some(
                        "MA Crossover Strategy - Golden/Death cross signals using moving averages".into(),
                    ),
                    timeframes: list(&["4h", "1d"]),
                    pairs: list(&["EURUSD", "GBPUSD", "USDJPY", "AUDUSD"]),
                    enabled: false,
                    scan_interval: 120,
                    rules: rules(&[("fastMA", 20), ("slowMA", 50)]),
                },
            ],
        }
    }

    /// Insert every seed strategy if the repository holds no configs yet.
    /// Returns how many records were written.
    pub async fn seed_if_empty(&self, repo: &dyn ScannerConfigRepository) -> Result<usize> {
        let existing = repo.count().await?;
        if existing > 0 {
            info!(existing, "Scanner configurations already exist");
            return Ok(0);
        }

        for cfg in &self.strategies {
            repo.insert(&cfg.to_record()?).await?;
            info!(strategy = %cfg.name, enabled = cfg.enabled, "Seeded scanner configuration");
        }
        Ok(self.strategies.len())
    }
}
