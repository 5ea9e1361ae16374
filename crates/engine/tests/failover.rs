//! Selector behaviour against real HTTP adapters when a source hangs.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{DataSource, Error, Pair, ProviderKind, Timeframe};
use engine::{http_client, DataSourceSelector, Pacing, ProviderRegistry};
use store::MemoryStore;

const TIMEOUT: Duration = Duration::from_millis(250);

async fn hanging_twelve_data() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/time_series"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"values": [], "status": "ok"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    server
}

async fn healthy_finnhub() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forex/candle"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "s": "ok",
            "t": [1704067200, 1704070800],
            "o": [1.094, 1.095],
            "h": [1.096, 1.097],
            "l": [1.093, 1.094],
            "c": [1.095, 1.096],
            "v": [100, 120]
        })))
        .mount(&server)
        .await;
    server
}

fn selector(store: &MemoryStore) -> DataSourceSelector {
    let registry = ProviderRegistry::http(http_client(TIMEOUT).unwrap());
    DataSourceSelector::new(Arc::new(store.clone()), registry, Pacing::disabled())
}

#[tokio::test]
async fn timed_out_source_fails_over_without_spending_quota() {
    let slow = hanging_twelve_data().await;
    let fast = healthy_finnhub().await;
    let store = MemoryStore::new();
    store
        .insert_data_source(DataSource::new("slow", ProviderKind::TwelveData, slow.uri()).with_priority(0))
        .await;
    store
        .insert_data_source(DataSource::new("fast", ProviderKind::Finnhub, fast.uri()).with_priority(1))
        .await;

    let pair = Pair::new("EURUSD").unwrap();
    let candles = selector(&store)
        .select_and_fetch(&pair, Timeframe::OneHour)
        .await
        .unwrap();
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].close, 1.096);

    let slow = store.data_source("slow").await.unwrap();
    assert_eq!(slow.usage_count, 0);
    assert!(slow.last_used.is_none());
    assert!(slow.last_error.unwrap().starts_with("Provider transport error"));

    let fast = store.data_source("fast").await.unwrap();
    assert_eq!(fast.usage_count, 1);
    assert!(fast.last_error.is_none());
}

#[tokio::test]
async fn connectivity_check_reports_timeouts_and_successes() {
    let slow = hanging_twelve_data().await;
    let fast = healthy_finnhub().await;
    let store = MemoryStore::new();
    let slow_source = DataSource::new("slow", ProviderKind::TwelveData, slow.uri());
    let fast_source = DataSource::new("fast", ProviderKind::Finnhub, fast.uri());
    store.insert_data_source(slow_source.clone()).await;
    store.insert_data_source(fast_source.clone()).await;
    let selector = selector(&store);

    let err = selector.test_source(&slow_source).await.unwrap_err();
    assert!(matches!(err, Error::ProviderTransport(_)), "{err}");
    assert!(store.data_source("slow").await.unwrap().last_error.is_some());

    let check = selector.test_source(&fast_source).await.unwrap();
    assert_eq!(check.candles, 2);
    assert!(check.latency_ms < 3_000);
    let fast = store.data_source("fast").await.unwrap();
    assert_eq!(fast.usage_count, 0);
    assert!(fast.last_used.is_some());
}
