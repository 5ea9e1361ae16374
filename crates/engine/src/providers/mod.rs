pub mod alpha_vantage;
pub mod custom;
pub mod finnhub;
pub mod polygon;
pub mod twelve_data;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder};
use serde_json::{Map, Value};

use common::{Candle, DataSource, Error, Pair, ProviderKind, Result, Timeframe, MAX_CANDLES};

pub use alpha_vantage::AlphaVantageProvider;
pub use custom::CustomProvider;
pub use finnhub::FinnhubProvider;
pub use polygon::PolygonProvider;
pub use twelve_data::TwelveDataProvider;

/// Everything an adapter needs for one candle request.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    pub base_url: &'a str,
    pub api_key: Option<&'a str>,
    pub pair: &'a Pair,
    pub timeframe: Timeframe,
    pub configuration: &'a Map<String, Value>,
}

impl<'a> ProviderRequest<'a> {
    pub fn new(source: &'a DataSource, pair: &'a Pair, timeframe: Timeframe) -> Self {
        Self {
            base_url: &source.base_url,
            api_key: source.api_key.as_deref(),
            pair,
            timeframe,
            configuration: &source.configuration,
        }
    }

    pub(crate) fn api_key(&self) -> &'a str {
        self.api_key.unwrap_or_default()
    }
}

/// Normalizes one vendor's candle endpoint into a newest-first series of at
/// most [`MAX_CANDLES`] candles.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    async fn fetch_candles(&self, request: &ProviderRequest<'_>) -> Result<Vec<Candle>>;
}

/// Adapter lookup by provider kind.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn CandleProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five HTTP adapters sharing one client.
    pub fn http(client: Client) -> Self {
        Self::new()
            .with(ProviderKind::AlphaVantage, AlphaVantageProvider::new(client.clone()))
            .with(ProviderKind::TwelveData, TwelveDataProvider::new(client.clone()))
            .with(ProviderKind::Polygon, PolygonProvider::new(client.clone()))
            .with(ProviderKind::Finnhub, FinnhubProvider::new(client.clone()))
            .with(ProviderKind::Custom, CustomProvider::new(client))
    }

    pub fn with(mut self, kind: ProviderKind, provider: impl CandleProvider + 'static) -> Self {
        self.providers.insert(kind, Arc::new(provider));
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn CandleProvider>> {
        self.providers.get(&kind).cloned()
    }
}

/// Shared HTTP client for every adapter.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))
}

// ─── Shared helpers ───────────────────────────────────────────────────────────

/// Send the request and decode a JSON body, mapping failures onto the
/// transport / data split the selector records.
pub(crate) async fn get_json(request: RequestBuilder) -> Result<Value> {
    let resp = request
        .send()
        .await
        .map_err(|e| Error::ProviderTransport(e.to_string()))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::ProviderTransport(e.to_string()))?;

    if !status.is_success() {
        return Err(Error::ProviderData(format!("HTTP {status}: {body}")));
    }
    serde_json::from_str(&body).map_err(|e| Error::ProviderData(format!("Invalid JSON body: {e}")))
}

/// A JSON number or a numeric string.
pub(crate) fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|x| x.is_finite())
}

/// Unix seconds or milliseconds, RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`.
pub(crate) fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(unix_timestamp),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return unix_timestamp(secs);
            }
            parse_datetime(s)
        }
        _ => None,
    }
}

pub(crate) fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn unix_timestamp(raw: i64) -> Option<DateTime<Utc>> {
    // anything past 1e11 cannot be seconds (year 5138)
    if raw.abs() >= 100_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

/// Sort newest-first and cap the series. An empty series is a data error so
/// the selector moves on to the next source.
pub(crate) fn finish(mut candles: Vec<Candle>, provider: ProviderKind) -> Result<Vec<Candle>> {
    if candles.is_empty() {
        return Err(Error::ProviderData(format!("{provider} returned no candles")));
    }
    candles.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    candles.truncate(MAX_CANDLES);
    Ok(candles)
}

/// Text of a soft-error field, whatever JSON type it came as.
pub(crate) fn error_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Timelike};
    use serde_json::json;

    #[test]
    fn numbers_accept_strings_and_numbers() {
        assert_eq!(number(&json!(1.25)), Some(1.25));
        assert_eq!(number(&json!("1.0850")), Some(1.085));
        assert_eq!(number(&json!("n/a")), None);
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!("NaN")), None);
        assert_eq!(number(&json!("inf")), None);
        assert_eq!(number(&json!("-infinity")), None);
    }

    #[test]
    fn timestamps_in_every_supported_shape() {
        let secs = timestamp(&json!(1_704_067_200)).unwrap();
        let millis = timestamp(&json!(1_704_067_200_000i64)).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs.year(), 2024);

        let spaced = timestamp(&json!("2024-01-01 13:00:00")).unwrap();
        assert_eq!(spaced.hour(), 13);
        let rfc = timestamp(&json!("2024-01-01T13:00:00+01:00")).unwrap();
        assert_eq!(rfc.hour(), 12);
        let day = timestamp(&json!("2024-01-05")).unwrap();
        assert_eq!(day.day(), 5);

        assert!(timestamp(&json!("yesterday")).is_none());
    }

    #[test]
    fn finish_orders_newest_first_and_caps() {
        let start = Utc::now();
        let candles: Vec<Candle> = (0..250)
            .map(|i| Candle {
                timestamp: start + Duration::minutes(i),
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: i as f64,
                volume: None,
            })
            .collect();

        let out = finish(candles, ProviderKind::Polygon).unwrap();
        assert_eq!(out.len(), MAX_CANDLES);
        assert_eq!(out[0].close, 249.0);
        assert!(out.windows(2).all(|w| w[0].timestamp > w[1].timestamp));

        assert!(matches!(
            finish(Vec::new(), ProviderKind::Custom),
            Err(Error::ProviderData(_))
        ));
    }
}
