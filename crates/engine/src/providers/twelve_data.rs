use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use common::{Candle, Error, ProviderKind, Result, Timeframe, MAX_CANDLES};

use super::{finish, get_json, number, timestamp, CandleProvider, ProviderRequest};

pub struct TwelveDataProvider {
    http: Client,
}

impl TwelveDataProvider {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

fn interval(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneDay => "1day",
        other => other.as_str(),
    }
}

#[async_trait]
impl CandleProvider for TwelveDataProvider {
    async fn fetch_candles(&self, req: &ProviderRequest<'_>) -> Result<Vec<Candle>> {
        let symbol = format!("{}/{}", req.pair.base(), req.pair.quote());
        let outputsize = MAX_CANDLES.to_string();
        let url = format!("{}/time_series", req.base_url.trim_end_matches('/'));

        debug!(%symbol, interval = interval(req.timeframe), "Twelve Data request");
        let body = get_json(self.http.get(&url).query(&[
            ("symbol", symbol.as_str()),
            ("interval", interval(req.timeframe)),
            ("apikey", req.api_key()),
            ("outputsize", outputsize.as_str()),
        ]))
        .await?;

        let resp: TimeSeriesResponse = serde_json::from_value(body)
            .map_err(|e| Error::ProviderData(format!("Twelve Data body: {e}")))?;

        if resp.status.as_deref() == Some("error") {
            return Err(Error::ProviderData(format!(
                "Twelve Data error: {}",
                resp.message.unwrap_or_else(|| "unknown error".into())
            )));
        }

        let candles = resp
            .values
            .iter()
            .map(TimeSeriesValue::to_candle)
            .collect::<Result<Vec<_>>>()?;

        finish(candles, ProviderKind::TwelveData)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TimeSeriesResponse {
    status: Option<String>,
    message: Option<String>,
    #[serde(default)]
    values: Vec<TimeSeriesValue>,
}

#[derive(Deserialize)]
struct TimeSeriesValue {
    datetime: Value,
    open: Value,
    high: Value,
    low: Value,
    close: Value,
    volume: Option<Value>,
}

impl TimeSeriesValue {
    fn to_candle(&self) -> Result<Candle> {
        let price = |v: &Value, name: &str| {
            number(v).ok_or_else(|| Error::ProviderData(format!("Twelve Data bad '{name}': {v}")))
        };
        Ok(Candle {
            timestamp: timestamp(&self.datetime).ok_or_else(|| {
                Error::ProviderData(format!("Twelve Data bad datetime: {}", self.datetime))
            })?,
            open: price(&self.open, "open")?,
            high: price(&self.high, "high")?,
            low: price(&self.low, "low")?,
            close: price(&self.close, "close")?,
            volume: self.volume.as_ref().and_then(number),
        })
    }
}
