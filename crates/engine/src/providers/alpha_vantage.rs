use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use common::{Candle, Error, ProviderKind, Result, Timeframe};

use super::{error_text, finish, get_json, number, parse_datetime, CandleProvider, ProviderRequest};

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

/// Base symbols served through the crypto endpoint instead of FX.
const CRYPTO_BASES: [&str; 10] = [
    "BTC", "ETH", "BNB", "SOL", "ADA", "XRP", "DOT", "LTC", "DOGE", "MATIC",
];

/// Keys Alpha Vantage uses to report errors inside a 200 response.
const SOFT_ERROR_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

pub struct AlphaVantageProvider {
    http: Client,
    default_base_url: String,
}

impl AlphaVantageProvider {
    pub fn new(http: Client) -> Self {
        Self::with_default_base_url(http, DEFAULT_BASE_URL)
    }

    /// Override the host used when a source's base URL is not an Alpha Vantage one.
    pub fn with_default_base_url(http: Client, default_base_url: impl Into<String>) -> Self {
        Self {
            http,
            default_base_url: default_base_url.into(),
        }
    }

    fn base_url<'a>(&'a self, configured: &'a str) -> &'a str {
        if configured.contains("alphavantage.co") {
            configured
        } else {
            &self.default_base_url
        }
    }
}

fn interval(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1min",
        Timeframe::FiveMinutes => "5min",
        Timeframe::FifteenMinutes => "15min",
        Timeframe::ThirtyMinutes => "30min",
        Timeframe::OneHour => "60min",
        Timeframe::FourHours => "240min",
        Timeframe::OneDay => "daily",
    }
}

#[async_trait]
impl CandleProvider for AlphaVantageProvider {
    async fn fetch_candles(&self, req: &ProviderRequest<'_>) -> Result<Vec<Candle>> {
        let interval = interval(req.timeframe);
        let (base, quote) = (req.pair.base(), req.pair.quote());
        let crypto = CRYPTO_BASES.contains(&base);

        let mut params = vec![
            ("interval", interval),
            ("apikey", req.api_key()),
            ("outputsize", "compact"),
        ];
        if crypto {
            params.extend([("function", "CRYPTO_INTRADAY"), ("symbol", base), ("market", quote)]);
        } else {
            params.extend([("function", "FX_INTRADAY"), ("from_symbol", base), ("to_symbol", quote)]);
        }

        let url = format!("{}/query", self.base_url(req.base_url).trim_end_matches('/'));
        debug!(pair = %req.pair, interval, crypto, "Alpha Vantage request");
        let body = get_json(self.http.get(&url).query(&params)).await?;

        for key in SOFT_ERROR_KEYS {
            if let Some(msg) = body.get(key) {
                return Err(Error::ProviderData(format!("Alpha Vantage {key}: {}", error_text(msg))));
            }
        }

        let series_key = format!(
            "Time Series {} ({interval})",
            if crypto { "Crypto" } else { "FX" }
        );
        let series = body
            .get(&series_key)
            .or_else(|| {
                body.as_object().and_then(|obj| {
                    obj.iter()
                        .find(|(k, _)| k.starts_with("Time Series"))
                        .map(|(_, v)| v)
                })
            })
            .and_then(Value::as_object)
            .ok_or_else(|| Error::ProviderData(format!("Alpha Vantage response has no '{series_key}'")))?;

        let mut candles = Vec::with_capacity(series.len());
        for (stamp, bar) in series {
            let timestamp = parse_datetime(stamp)
                .ok_or_else(|| Error::ProviderData(format!("Alpha Vantage bad timestamp '{stamp}'")))?;
            let field = |name: &str| {
                bar.get(name)
                    .and_then(number)
                    .ok_or_else(|| Error::ProviderData(format!("Alpha Vantage bar {stamp} missing '{name}'")))
            };
            candles.push(Candle {
                timestamp,
                open: field("1. open")?,
                high: field("2. high")?,
                low: field("3. low")?,
                close: field("4. close")?,
                volume: bar.get("5. volume").and_then(number),
            });
        }

        finish(candles, ProviderKind::AlphaVantage)
    }
}
