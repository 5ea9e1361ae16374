use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Candle, Error, ProviderKind, Result, Timeframe, MAX_CANDLES};

use super::{finish, get_json, CandleProvider, ProviderRequest};

pub struct PolygonProvider {
    http: Client,
}

impl PolygonProvider {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

/// Aggregate range as (multiplier, timespan).
fn range(timeframe: Timeframe) -> (u32, &'static str) {
    match timeframe {
        Timeframe::OneMinute => (1, "minute"),
        Timeframe::FiveMinutes => (5, "minute"),
        Timeframe::FifteenMinutes => (15, "minute"),
        Timeframe::ThirtyMinutes => (30, "minute"),
        Timeframe::OneHour => (1, "hour"),
        Timeframe::FourHours => (4, "hour"),
        Timeframe::OneDay => (1, "day"),
    }
}

#[async_trait]
impl CandleProvider for PolygonProvider {
    async fn fetch_candles(&self, req: &ProviderRequest<'_>) -> Result<Vec<Candle>> {
        let (multiplier, timespan) = range(req.timeframe);
        let to = Utc::now();
        let from = to - Duration::minutes(req.timeframe.minutes() * MAX_CANDLES as i64);
        let url = format!(
            "{}/v2/aggs/ticker/C:{}/range/{multiplier}/{timespan}/{}/{}",
            req.base_url.trim_end_matches('/'),
            req.pair,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d"),
        );

        debug!(pair = %req.pair, multiplier, timespan, "Polygon request");
        let body = get_json(self.http.get(&url).query(&[("apiKey", req.api_key())])).await?;
        let resp: AggregatesResponse = serde_json::from_value(body)
            .map_err(|e| Error::ProviderData(format!("Polygon body: {e}")))?;

        if !matches!(resp.status.as_deref(), Some("OK") | Some("DELAYED")) {
            let reason = resp
                .error
                .or(resp.message)
                .or(resp.status)
                .unwrap_or_else(|| "missing status".into());
            return Err(Error::ProviderData(format!("Polygon error: {reason}")));
        }

        let candles = resp
            .results
            .into_iter()
            .map(|bar| {
                let timestamp = Utc
                    .timestamp_millis_opt(bar.t)
                    .single()
                    .ok_or_else(|| Error::ProviderData(format!("Polygon bad timestamp {}", bar.t)))?;
                Ok(Candle {
                    timestamp,
                    open: bar.o,
                    high: bar.h,
                    low: bar.l,
                    close: bar.c,
                    volume: bar.v,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        finish(candles, ProviderKind::Polygon)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AggregatesResponse {
    status: Option<String>,
    error: Option<String>,
    message: Option<String>,
    #[serde(default)]
    results: Vec<AggregateBar>,
}

#[derive(Deserialize)]
struct AggregateBar {
    /// Bucket start, unix milliseconds.
    t: i64,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: Option<f64>,
}
