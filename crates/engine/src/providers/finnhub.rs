use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Candle, Error, ProviderKind, Result, Timeframe, MAX_CANDLES};

use super::{finish, get_json, CandleProvider, ProviderRequest};

pub struct FinnhubProvider {
    http: Client,
}

impl FinnhubProvider {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

fn resolution(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::OneMinute => "1",
        Timeframe::FiveMinutes => "5",
        Timeframe::FifteenMinutes => "15",
        Timeframe::ThirtyMinutes => "30",
        Timeframe::OneHour => "60",
        Timeframe::FourHours => "240",
        Timeframe::OneDay => "D",
    }
}

#[async_trait]
impl CandleProvider for FinnhubProvider {
    async fn fetch_candles(&self, req: &ProviderRequest<'_>) -> Result<Vec<Candle>> {
        let symbol = format!("OANDA:{}_{}", req.pair.base(), req.pair.quote());
        let to = Utc::now();
        let from = to - Duration::minutes(req.timeframe.minutes() * MAX_CANDLES as i64);
        let (from, to) = (from.timestamp().to_string(), to.timestamp().to_string());
        let url = format!("{}/forex/candle", req.base_url.trim_end_matches('/'));

        debug!(%symbol, resolution = resolution(req.timeframe), "Finnhub request");
        let body = get_json(self.http.get(&url).query(&[
            ("symbol", symbol.as_str()),
            ("resolution", resolution(req.timeframe)),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("token", req.api_key()),
        ]))
        .await?;

        let resp: CandleResponse = serde_json::from_value(body)
            .map_err(|e| Error::ProviderData(format!("Finnhub body: {e}")))?;
        if resp.s.as_deref() != Some("ok") {
            return Err(Error::ProviderData(format!(
                "Finnhub status: {}",
                resp.s.unwrap_or_else(|| "missing".into())
            )));
        }

        let len = [resp.t.len(), resp.o.len(), resp.h.len(), resp.l.len(), resp.c.len()]
            .into_iter()
            .min()
            .unwrap_or(0);
        let mut candles = Vec::with_capacity(len);
        for i in 0..len {
            let timestamp = Utc
                .timestamp_opt(resp.t[i], 0)
                .single()
                .ok_or_else(|| Error::ProviderData(format!("Finnhub bad timestamp {}", resp.t[i])))?;
            candles.push(Candle {
                timestamp,
                open: resp.o[i],
                high: resp.h[i],
                low: resp.l[i],
                close: resp.c[i],
                volume: resp.v.get(i).copied(),
            });
        }

        finish(candles, ProviderKind::Finnhub)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

/// Parallel arrays, oldest bucket first.
#[derive(Deserialize)]
struct CandleResponse {
    s: Option<String>,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}
