use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Maximum number of candles a provider adapter hands to the indicator pipeline.
pub const MAX_CANDLES: usize = 200;

/// How long a freshly created signal stays active.
pub fn signal_ttl() -> Duration {
    Duration::hours(24)
}

/// One OHLC(V) price bar. Series of candles are always ordered newest-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

/// Candle bucket width. The vocabulary is closed; providers map it to their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "5min")]
    FiveMinutes,
    #[serde(rename = "15min")]
    FifteenMinutes,
    #[serde(rename = "30min")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1min",
            Timeframe::FiveMinutes => "5min",
            Timeframe::FifteenMinutes => "15min",
            Timeframe::ThirtyMinutes => "30min",
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Bucket width in minutes.
    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::OneMinute => 1,
            Timeframe::FiveMinutes => 5,
            Timeframe::FifteenMinutes => 15,
            Timeframe::ThirtyMinutes => 30,
            Timeframe::OneHour => 60,
            Timeframe::FourHours => 240,
            Timeframe::OneDay => 1440,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown timeframe '{s}'")))
    }
}

/// A tradable instrument code: exactly six uppercase ASCII letters, e.g. `EURUSD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pair(String);

impl Pair {
    pub fn new(code: impl Into<String>) -> Result<Self> {
        let code = code.into();
        if code.len() == 6 && code.bytes().all(|b| b.is_ascii_uppercase()) {
            Ok(Self(code))
        } else {
            Err(Error::Validation(format!(
                "pair must be 6 uppercase letters, got '{code}'"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        &self.0[..3]
    }

    pub fn quote(&self) -> &str {
        &self.0[3..]
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pair::new(s)
    }
}

impl TryFrom<String> for Pair {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Pair::new(value)
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.0
    }
}

/// External market-data vendor behind a [`DataSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    AlphaVantage,
    TwelveData,
    Polygon,
    Finnhub,
    Custom,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AlphaVantage => "alphavantage",
            ProviderKind::TwelveData => "twelvedata",
            ProviderKind::Polygon => "polygon",
            ProviderKind::Finnhub => "finnhub",
            ProviderKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "alphavantage" => Ok(ProviderKind::AlphaVantage),
            "twelvedata" => Ok(ProviderKind::TwelveData),
            "polygon" => Ok(ProviderKind::Polygon),
            "finnhub" => Ok(ProviderKind::Finnhub),
            "custom" => Ok(ProviderKind::Custom),
            other => Err(Error::Validation(format!("unknown provider '{other}'"))),
        }
    }
}

/// Direction of a generated signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "buy",
            SignalType::Sell => "sell",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(SignalType::Buy),
            "sell" => Ok(SignalType::Sell),
            other => Err(Error::Validation(format!("unknown signal type '{other}'"))),
        }
    }
}

/// A configured provider endpoint together with its usage bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub is_active: bool,
    /// Lower is tried first.
    pub priority: i64,
    /// Calls allowed per day.
    pub rate_limit: i64,
    /// Calls made in the current period.
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Provider-specific extras such as custom query parameters or headers.
    #[serde(default)]
    pub configuration: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl DataSource {
    pub const DEFAULT_RATE_LIMIT: i64 = 500;

    pub fn new(name: impl Into<String>, provider: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            provider,
            base_url: base_url.into(),
            api_key: None,
            api_secret: None,
            is_active: true,
            priority: 0,
            rate_limit: Self::DEFAULT_RATE_LIMIT,
            usage_count: 0,
            last_used: None,
            last_error: None,
            configuration: Map::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: i64) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_configuration(mut self, configuration: Map<String, Value>) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.usage_count >= self.rate_limit
    }
}

/// Strategy configuration record. Pairs and timeframes are kept as entered by
/// the admin collaborator and validated by the scanner entry by entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub id: String,
    pub strategy_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Map<String, Value>,
    pub timeframes: Vec<String>,
    pub pairs: Vec<String>,
    pub is_enabled: bool,
    /// Informational only; the scheduler drives the real cadence.
    pub scan_interval: i64,
    pub created_at: DateTime<Utc>,
}

impl ScannerConfig {
    pub fn new(strategy_name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_name: strategy_name.into(),
            description: None,
            rules: Map::new(),
            timeframes: vec!["1h".into(), "4h".into(), "1d".into()],
            pairs: vec!["EURUSD".into(), "GBPUSD".into(), "USDJPY".into()],
            is_enabled: true,
            scan_interval: 60,
            created_at: Utc::now(),
        }
    }
}

/// A persisted scan result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub pair: String,
    pub timeframe: Timeframe,
    pub signal_type: SignalType,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: f64,
    pub strategy_name: String,
    #[serde(default)]
    pub indicators: Map<String, Value>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Query over active signals, newest first.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    pub pair: Option<String>,
    pub timeframe: Option<Timeframe>,
    pub strategy_name: Option<String>,
    pub limit: usize,
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self {
            pair: None,
            timeframe: None,
            strategy_name: None,
            limit: 50,
        }
    }
}

impl SignalFilter {
    pub fn matches(&self, signal: &Signal) -> bool {
        signal.is_active
            && self.pair.as_deref().map_or(true, |p| p == signal.pair)
            && self.timeframe.map_or(true, |tf| tf == signal.timeframe)
            && self
                .strategy_name
                .as_deref()
                .map_or(true, |s| s == signal.strategy_name)
    }
}

/// How many pairs [`SignalStats::by_pair`] reports.
pub const PAIR_STATS_LIMIT: usize = 10;

/// Counts over the currently active signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SignalStats {
    pub active: u64,
    pub by_type: BTreeMap<SignalType, u64>,
    /// Busiest pairs first, ties by pair name, at most [`PAIR_STATS_LIMIT`].
    pub by_pair: Vec<PairCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairCount {
    pub pair: String,
    pub count: u64,
}

impl SignalStats {
    /// Put `by_pair` into reporting order and cut it to size.
    pub fn rank_pairs(mut self) -> Self {
        self.by_pair
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pair.cmp(&b.pair)));
        self.by_pair.truncate(PAIR_STATS_LIMIT);
        self
    }
}
