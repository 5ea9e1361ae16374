use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use common::{Candle, Error, ProviderKind, Result};

use super::{error_text, finish, get_json, number, timestamp, CandleProvider, ProviderRequest};

/// Configuration key whose object entries are sent as HTTP headers.
const HEADERS_KEY: &str = "headers";

/// Generic JSON endpoint: `GET {base}?pair=..&timeframe=..&apiKey=..` plus any
/// configured query parameters.
pub struct CustomProvider {
    http: Client,
}

impl CustomProvider {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// First present key among the aliases.
fn field<'a>(bar: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|k| bar.get(*k))
}

fn to_candle(bar: &Value) -> Option<Candle> {
    let bar = bar.as_object()?;
    Some(Candle {
        timestamp: field(bar, &["timestamp", "time", "datetime", "date", "t"]).and_then(timestamp)?,
        open: field(bar, &["open", "o"]).and_then(number)?,
        high: field(bar, &["high", "h"]).and_then(number)?,
        low: field(bar, &["low", "l"]).and_then(number)?,
        close: field(bar, &["close", "c"]).and_then(number)?,
        volume: field(bar, &["volume", "v"]).and_then(number),
    })
}

#[async_trait]
impl CandleProvider for CustomProvider {
    async fn fetch_candles(&self, req: &ProviderRequest<'_>) -> Result<Vec<Candle>> {
        let mut params: Vec<(String, String)> = vec![
            ("pair".into(), req.pair.to_string()),
            ("timeframe".into(), req.timeframe.to_string()),
        ];
        if let Some(key) = req.api_key {
            params.push(("apiKey".into(), key.to_string()));
        }

        let mut request = self.http.get(req.base_url);
        for (key, value) in req.configuration {
            match (key.as_str(), value) {
                (HEADERS_KEY, Value::Object(headers)) => {
                    for (name, value) in headers {
                        request = request.header(name.as_str(), query_value(value));
                    }
                }
                _ => params.push((key.clone(), query_value(value))),
            }
        }

        debug!(url = req.base_url, pair = %req.pair, "Custom provider request");
        let body = get_json(request.query(&params)).await?;

        if let Some(err) = body.get("error").filter(|v| !v.is_null()) {
            return Err(Error::ProviderData(format!("Custom provider error: {}", error_text(err))));
        }

        let bars = body
            .get("candles")
            .or_else(|| body.get("data"))
            .unwrap_or(&body)
            .as_array()
            .ok_or_else(|| Error::ProviderData("Custom provider returned no candle array".into()))?;

        let candles: Vec<Candle> = bars.iter().filter_map(to_candle).collect();
        if candles.len() < bars.len() {
            warn!(
                dropped = bars.len() - candles.len(),
                "Custom provider returned malformed candles"
            );
        }

        finish(candles, ProviderKind::Custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candles_accept_short_and_long_field_names() {
        let long = to_candle(&json!({
            "timestamp": "2024-03-01T10:00:00Z",
            "open": "1.1", "high": 1.2, "low": "1.0", "close": 1.15, "volume": "300"
        }))
        .unwrap();
        assert_eq!(long.high, 1.2);
        assert_eq!(long.volume, Some(300.0));

        let short = to_candle(&json!({"t": 1_709_287_200_000i64, "o": 1, "h": 2, "l": 0.5, "c": 1.5}))
            .unwrap();
        assert_eq!(short.timestamp, long.timestamp);
        assert!(short.volume.is_none());

        assert!(to_candle(&json!({"open": 1})).is_none());
        assert!(to_candle(&json!([1, 2, 3])).is_none());
    }
}
