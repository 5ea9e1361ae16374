use chrono::{Duration, Utc};
use common::Candle;
use proptest::prelude::*;
use serde_json::Map;
use strategy::indicators::RsiIndicator;
use strategy::{compute_indicators, Strategy};

fn candles(closes: &[f64]) -> Vec<Candle> {
    let now = Utc::now();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: now - Duration::minutes(i as i64),
            open: close,
            high: close * 1.001,
            low: close * 0.999,
            close,
            volume: Some(1.0),
        })
        .collect()
}

proptest! {
    /// RSI stays inside [0, 100] for any positive price path.
    #[test]
    fn rsi_is_always_in_range(closes in prop::collection::vec(0.0001f64..100_000.0f64, 0..120)) {
        let value = RsiIndicator::default().compute(&closes);
        prop_assert!((0.0..=100.0).contains(&value), "RSI out of range: {}", value);
    }

    /// The whole pipeline plus every strategy must never panic on well-formed candles.
    #[test]
    fn pipeline_and_strategies_never_panic(
        closes in prop::collection::vec(0.0001f64..100_000.0f64, 50..250),
    ) {
        let snapshot = compute_indicators(&candles(&closes)).unwrap();
        prop_assert!(snapshot.support <= snapshot.resistance);
        prop_assert!(snapshot.candles.len() <= 200);

        for name in Strategy::NAMES {
            let strategy = Strategy::from_config(name, &Map::new()).unwrap();
            if let Some(signal) = strategy.evaluate(&snapshot) {
                prop_assert!(signal.confidence >= 70.0 && signal.confidence.is_finite());
                prop_assert_eq!(signal.entry, snapshot.close);
            }
        }
    }
}
