use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use common::{
    DataSource, DataSourceRepository, PairCount, Result, ScannerConfig, ScannerConfigRepository,
    Signal, SignalFilter, SignalStats, SignalStore,
};

/// In-process store with the same ordering and bookkeeping rules as
/// [`crate::SqliteStore`]. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    sources: Arc<RwLock<Vec<DataSource>>>,
    configs: Arc<RwLock<Vec<ScannerConfig>>>,
    signals: Arc<RwLock<Vec<Signal>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_data_source(&self, source: DataSource) {
        self.sources.write().await.push(source);
    }

    /// Snapshot of a source by name.
    pub async fn data_source(&self, name: &str) -> Option<DataSource> {
        self.sources.read().await.iter().find(|s| s.name == name).cloned()
    }

    /// Snapshot of every stored signal, active or not, in insertion order.
    pub async fn signals(&self) -> Vec<Signal> {
        self.signals.read().await.clone()
    }
}

#[async_trait]
impl DataSourceRepository for MemoryStore {
    async fn active_sources(&self) -> Result<Vec<DataSource>> {
        let mut active: Vec<DataSource> = self
            .sources
            .read()
            .await
            .iter()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        // stable sort keeps insertion order among equal priorities
        active.sort_by_key(|s| s.priority);
        Ok(active)
    }

    async fn record_success(&self, source_id: &str, used_at: DateTime<Utc>) -> Result<()> {
        if let Some(source) = self.sources.write().await.iter_mut().find(|s| s.id == source_id) {
            source.usage_count += 1;
            source.last_used = Some(used_at);
            source.last_error = None;
        }
        Ok(())
    }

    async fn record_check(&self, source_id: &str, used_at: DateTime<Utc>) -> Result<()> {
        if let Some(source) = self.sources.write().await.iter_mut().find(|s| s.id == source_id) {
            source.last_used = Some(used_at);
            source.last_error = None;
        }
        Ok(())
    }

    async fn record_failure(&self, source_id: &str, error: &str) -> Result<()> {
        if let Some(source) = self.sources.write().await.iter_mut().find(|s| s.id == source_id) {
            source.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn reset_usage(&self) -> Result<u64> {
        let mut sources = self.sources.write().await;
        for source in sources.iter_mut() {
            source.usage_count = 0;
        }
        Ok(sources.len() as u64)
    }
}

#[async_trait]
impl ScannerConfigRepository for MemoryStore {
    async fn enabled_configs(&self) -> Result<Vec<ScannerConfig>> {
        Ok(self
            .configs
            .read()
            .await
            .iter()
            .filter(|c| c.is_enabled)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.configs.read().await.len() as u64)
    }

    async fn insert(&self, config: &ScannerConfig) -> Result<()> {
        self.configs.write().await.push(config.clone());
        Ok(())
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn create(&self, signal: &Signal) -> Result<()> {
        self.signals.write().await.push(signal.clone());
        Ok(())
    }

    async fn mark_inactive(&self, ids: &[String]) -> Result<u64> {
        let mut touched = 0;
        for signal in self.signals.write().await.iter_mut() {
            if signal.is_active && ids.contains(&signal.id) {
                signal.is_active = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut touched = 0;
        for signal in self.signals.write().await.iter_mut() {
            if signal.is_active && signal.is_expired(now) {
                signal.is_active = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn find_active(&self, filter: &SignalFilter) -> Result<Vec<Signal>> {
        let signals = self.signals.read().await;
        // newest first; later inserts win ties
        let mut found: Vec<(usize, &Signal)> = signals
            .iter()
            .enumerate()
            .filter(|(_, s)| filter.matches(s))
            .collect();
        found.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(found
            .into_iter()
            .take(filter.limit)
            .map(|(_, s)| s.clone())
            .collect())
    }

    async fn stats(&self) -> Result<SignalStats> {
        let signals = self.signals.read().await;
        let mut by_type = BTreeMap::new();
        let mut by_pair: HashMap<&str, u64> = HashMap::new();
        let mut active = 0;
        for signal in signals.iter().filter(|s| s.is_active) {
            active += 1;
            *by_type.entry(signal.signal_type).or_insert(0) += 1;
            *by_pair.entry(signal.pair.as_str()).or_insert(0) += 1;
        }
        let stats = SignalStats {
            active,
            by_type,
            by_pair: by_pair
                .into_iter()
                .map(|(pair, count)| PairCount { pair: pair.to_string(), count })
                .collect(),
        };
        Ok(stats.rank_pairs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{ProviderKind, SignalType, Timeframe};
    use serde_json::Map;

    fn signal(id: &str, pair: &str, created_at: DateTime<Utc>) -> Signal {
        Signal {
            id: id.into(),
            pair: pair.into(),
            timeframe: Timeframe::FourHours,
            signal_type: SignalType::Sell,
            entry: 150.0,
            stop_loss: 153.0,
            take_profit: 144.0,
            confidence: 70.0,
            strategy_name: "macdCrossover".into(),
            indicators: Map::new(),
            is_active: true,
            expires_at: created_at + common::signal_ttl(),
            created_at,
        }
    }

    #[tokio::test]
    async fn active_sources_follow_priority_with_stable_ties() {
        let store = MemoryStore::new();
        store
            .insert_data_source(DataSource::new("s2", ProviderKind::Polygon, "x").with_priority(2))
            .await;
        store
            .insert_data_source(DataSource::new("s1a", ProviderKind::Finnhub, "x").with_priority(1))
            .await;
        store
            .insert_data_source(DataSource::new("s1b", ProviderKind::Custom, "x").with_priority(1))
            .await;

        let names: Vec<String> = store
            .active_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["s1a", "s1b", "s2"]);
    }

    #[tokio::test]
    async fn success_clears_previous_error() {
        let store = MemoryStore::new();
        let source = DataSource::new("av", ProviderKind::AlphaVantage, "x");
        let id = source.id.clone();
        store.insert_data_source(source).await;

        store.record_failure(&id, "Note: rate limited").await.unwrap();
        assert!(store.data_source("av").await.unwrap().last_error.is_some());

        store.record_success(&id, Utc::now()).await.unwrap();
        let after = store.data_source("av").await.unwrap();
        assert_eq!(after.usage_count, 1);
        assert!(after.last_error.is_none());
        assert!(after.last_used.is_some());
    }

    #[tokio::test]
    async fn expire_and_find_active() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.create(&signal("old", "USDJPY", now - Duration::hours(25))).await.unwrap();
        store.create(&signal("a", "USDJPY", now - Duration::hours(2))).await.unwrap();
        store.create(&signal("b", "USDJPY", now - Duration::hours(1))).await.unwrap();

        assert_eq!(store.expire(now).await.unwrap(), 1);

        let found = store.find_active(&SignalFilter::default()).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);

        assert_eq!(store.mark_inactive(&["a".into(), "old".into()]).await.unwrap(), 1);
        assert_eq!(store.find_active(&SignalFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connectivity_check_keeps_usage() {
        let store = MemoryStore::new();
        let mut source = DataSource::new("fh", ProviderKind::Finnhub, "x");
        source.usage_count = 4;
        source.last_error = Some("HTTP 500".into());
        let id = source.id.clone();
        store.insert_data_source(source).await;

        store.record_check(&id, Utc::now()).await.unwrap();
        let after = store.data_source("fh").await.unwrap();
        assert_eq!(after.usage_count, 4);
        assert!(after.last_error.is_none());
        assert!(after.last_used.is_some());
    }

    #[tokio::test]
    async fn stats_group_active_signals() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut buy = signal("b1", "EURUSD", now);
        buy.signal_type = SignalType::Buy;
        for s in [
            signal("s1", "USDJPY", now),
            signal("s2", "USDJPY", now),
            signal("s3", "EURUSD", now),
            buy,
            signal("gone", "GBPUSD", now),
        ] {
            store.create(&s).await.unwrap();
        }
        store.mark_inactive(&["gone".into()]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active, 4);
        assert_eq!(stats.by_type[&SignalType::Sell], 3);
        assert_eq!(stats.by_type[&SignalType::Buy], 1);
        // equal counts fall back to pair name
        let pairs: Vec<(&str, u64)> = stats.by_pair.iter().map(|p| (p.pair.as_str(), p.count)).collect();
        assert_eq!(pairs, [("EURUSD", 2), ("USDJPY", 2)]);
    }
}
