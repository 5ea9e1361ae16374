use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use common::{
    DataSource, DataSourceRepository, Error, PairCount, Result, ScannerConfig,
    ScannerConfigRepository, Signal, SignalFilter, SignalStats, SignalStore, SignalType,
    PAIR_STATS_LIMIT,
};

/// SQLite-backed implementation of every collaborator repository.
///
/// Timestamps are stored as fixed-width RFC 3339 text in UTC so that string
/// comparison in SQL matches chronological order.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // An in-memory database only exists on the connection that created it.
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };
        Ok(Self { pool })
    }

    /// Fresh, migrated in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let store = Self::connect("sqlite::memory:").await?;
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Admin-side insert, used by provisioning scripts and tests.
    pub async fn insert_data_source(&self, source: &DataSource) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO data_sources
                (id, name, provider, base_url, api_key, api_secret, is_active, priority,
                 rate_limit, usage_count, last_used, last_error, configuration, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&source.id)
        .bind(&source.name)
        .bind(source.provider.as_str())
        .bind(&source.base_url)
        .bind(&source.api_key)
        .bind(&source.api_secret)
        .bind(source.is_active)
        .bind(source.priority)
        .bind(source.rate_limit)
        .bind(source.usage_count)
        .bind(source.last_used.map(ts))
        .bind(&source.last_error)
        .bind(serde_json::to_string(&source.configuration)?)
        .bind(ts(source.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ─── Data sources ─────────────────────────────────────────────────────────────

const DATA_SOURCE_COLUMNS: &str = "id, name, provider, base_url, api_key, api_secret, is_active, \
    priority, rate_limit, usage_count, last_used, last_error, configuration, created_at";

#[async_trait]
impl DataSourceRepository for SqliteStore {
    async fn active_sources(&self) -> Result<Vec<DataSource>> {
        let rows = sqlx::query_as::<_, DataSourceRow>(&format!(
            "SELECT {DATA_SOURCE_COLUMNS} FROM data_sources \
             WHERE is_active = 1 ORDER BY priority ASC, rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DataSource::try_from).collect()
    }

    async fn record_success(&self, source_id: &str, used_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE data_sources SET usage_count = usage_count + 1, last_used = ?1, last_error = NULL \
             WHERE id = ?2",
        )
        .bind(ts(used_at))
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_check(&self, source_id: &str, used_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE data_sources SET last_used = ?1, last_error = NULL WHERE id = ?2")
            .bind(ts(used_at))
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, source_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE data_sources SET last_error = ?1 WHERE id = ?2")
            .bind(error)
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_usage(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE data_sources SET usage_count = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ─── Scanner configs ──────────────────────────────────────────────────────────

const CONFIG_COLUMNS: &str =
    "id, strategy_name, description, rules, timeframes, pairs, is_enabled, scan_interval, created_at";

#[async_trait]
impl ScannerConfigRepository for SqliteStore {
    async fn enabled_configs(&self) -> Result<Vec<ScannerConfig>> {
        let rows = sqlx::query_as::<_, ConfigRow>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM scanner_configs WHERE is_enabled = 1 ORDER BY rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScannerConfig::try_from).collect()
    }

    async fn count(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scanner_configs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }

    async fn insert(&self, config: &ScannerConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scanner_configs
                (id, strategy_name, description, rules, timeframes, pairs, is_enabled, scan_interval, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&config.id)
        .bind(&config.strategy_name)
        .bind(&config.description)
        .bind(serde_json::to_string(&config.rules)?)
        .bind(serde_json::to_string(&config.timeframes)?)
        .bind(serde_json::to_string(&config.pairs)?)
        .bind(config.is_enabled)
        .bind(config.scan_interval)
        .bind(ts(config.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ─── Signals ──────────────────────────────────────────────────────────────────

const SIGNAL_COLUMNS: &str = "id, pair, timeframe, signal_type, entry, stop_loss, take_profit, \
    confidence, strategy_name, indicators, is_active, expires_at, created_at";

#[async_trait]
impl SignalStore for SqliteStore {
    async fn create(&self, signal: &Signal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO signals
                (id, pair, timeframe, signal_type, entry, stop_loss, take_profit, confidence,
                 strategy_name, indicators, is_active, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&signal.id)
        .bind(&signal.pair)
        .bind(signal.timeframe.as_str())
        .bind(signal.signal_type.as_str())
        .bind(signal.entry)
        .bind(signal.stop_loss)
        .bind(signal.take_profit)
        .bind(signal.confidence)
        .bind(&signal.strategy_name)
        .bind(serde_json::to_string(&signal.indicators)?)
        .bind(signal.is_active)
        .bind(ts(signal.expires_at))
        .bind(ts(signal.created_at))
        .execute(&self.pool)
        .await?;
        debug!(id = %signal.id, pair = %signal.pair, "Signal persisted");
        Ok(())
    }

    async fn mark_inactive(&self, ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut touched = 0;
        for id in ids {
            touched += sqlx::query("UPDATE signals SET is_active = 0 WHERE id = ?1 AND is_active = 1")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(touched)
    }

    async fn expire(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("UPDATE signals SET is_active = 0 WHERE is_active = 1 AND expires_at < ?1")
                .bind(ts(now))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn find_active(&self, filter: &SignalFilter) -> Result<Vec<Signal>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE is_active = 1"));
        if let Some(pair) = &filter.pair {
            qb.push(" AND pair = ").push_bind(pair.clone());
        }
        if let Some(timeframe) = filter.timeframe {
            qb.push(" AND timeframe = ").push_bind(timeframe.as_str());
        }
        if let Some(strategy) = &filter.strategy_name {
            qb.push(" AND strategy_name = ").push_bind(strategy.clone());
        }
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(filter.limit as i64);

        let rows = qb
            .build_query_as::<SignalRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Signal::try_from).collect()
    }

    async fn stats(&self) -> Result<SignalStats> {
        let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM signals WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        let by_type: BTreeMap<SignalType, u64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT signal_type, COUNT(*) FROM signals WHERE is_active = 1 GROUP BY signal_type",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(kind, n)| Ok((kind.parse::<SignalType>()?, n as u64)))
        .collect::<Result<_>>()?;

        let by_pair = sqlx::query_as::<_, (String, i64)>(
            "SELECT pair, COUNT(*) AS n FROM signals WHERE is_active = 1 \
             GROUP BY pair ORDER BY n DESC, pair ASC LIMIT ?1",
        )
        .bind(PAIR_STATS_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(pair, n)| PairCount { pair, count: n as u64 })
        .collect();

        Ok(SignalStats {
            active: active as u64,
            by_type,
            by_pair,
        })
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Validation(format!("bad stored timestamp '{raw}': {e}")))
}

fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    Ok(serde_json::from_str(raw)?)
}

#[derive(sqlx::FromRow)]
struct DataSourceRow {
    id: String,
    name: String,
    provider: String,
    base_url: String,
    api_key: Option<String>,
    api_secret: Option<String>,
    is_active: bool,
    priority: i64,
    rate_limit: i64,
    usage_count: i64,
    last_used: Option<String>,
    last_error: Option<String>,
    configuration: String,
    created_at: String,
}

impl TryFrom<DataSourceRow> for DataSource {
    type Error = Error;

    fn try_from(row: DataSourceRow) -> Result<Self> {
        Ok(DataSource {
            provider: row.provider.parse()?,
            last_used: row.last_used.as_deref().map(parse_ts).transpose()?,
            configuration: parse_object(&row.configuration)?,
            created_at: parse_ts(&row.created_at)?,
            id: row.id,
            name: row.name,
            base_url: row.base_url,
            api_key: row.api_key,
            api_secret: row.api_secret,
            is_active: row.is_active,
            priority: row.priority,
            rate_limit: row.rate_limit,
            usage_count: row.usage_count,
            last_error: row.last_error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConfigRow {
    id: String,
    strategy_name: String,
    description: Option<String>,
    rules: String,
    timeframes: String,
    pairs: String,
    is_enabled: bool,
    scan_interval: i64,
    created_at: String,
}

impl TryFrom<ConfigRow> for ScannerConfig {
    type Error = Error;

    fn try_from(row: ConfigRow) -> Result<Self> {
        Ok(ScannerConfig {
            rules: parse_object(&row.rules)?,
            timeframes: serde_json::from_str(&row.timeframes)?,
            pairs: serde_json::from_str(&row.pairs)?,
            created_at: parse_ts(&row.created_at)?,
            id: row.id,
            strategy_name: row.strategy_name,
            description: row.description,
            is_enabled: row.is_enabled,
            scan_interval: row.scan_interval,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SignalRow {
    id: String,
    pair: String,
    timeframe: String,
    signal_type: String,
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    confidence: f64,
    strategy_name: String,
    indicators: String,
    is_active: bool,
    expires_at: String,
    created_at: String,
}

impl TryFrom<SignalRow> for Signal {
    type Error = Error;

    fn try_from(row: SignalRow) -> Result<Self> {
        Ok(Signal {
            timeframe: row.timeframe.parse()?,
            signal_type: row.signal_type.parse()?,
            indicators: parse_object(&row.indicators)?,
            expires_at: parse_ts(&row.expires_at)?,
            created_at: parse_ts(&row.created_at)?,
            id: row.id,
            pair: row.pair,
            entry: row.entry,
            stop_loss: row.stop_loss,
            take_profit: row.take_profit,
            confidence: row.confidence,
            strategy_name: row.strategy_name,
            is_active: row.is_active,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::{ProviderKind, SignalType, Timeframe};

    fn signal(pair: &str, created_at: DateTime<Utc>) -> Signal {
        Signal {
            id: uuid_like(pair, created_at),
            pair: pair.to_string(),
            timeframe: Timeframe::OneHour,
            signal_type: SignalType::Buy,
            entry: 1.1,
            stop_loss: 1.078,
            take_profit: 1.144,
            confidence: 85.0,
            strategy_name: "rsiOversold".into(),
            indicators: serde_json::from_str(r#"{"rsi": 20.0}"#).unwrap(),
            is_active: true,
            expires_at: created_at + common::signal_ttl(),
            created_at,
        }
    }

    fn uuid_like(pair: &str, at: DateTime<Utc>) -> String {
        format!("{pair}-{}", at.timestamp_micros())
    }

    #[tokio::test]
    async fn sources_come_back_by_priority_then_insertion() {
        let store = SqliteStore::in_memory().await.unwrap();
        let b = DataSource::new("b", ProviderKind::Polygon, "https://b").with_priority(1);
        let a = DataSource::new("a", ProviderKind::TwelveData, "https://a").with_priority(0);
        let c = DataSource::new("c", ProviderKind::Finnhub, "https://c").with_priority(1);
        let mut off = DataSource::new("off", ProviderKind::Custom, "https://off");
        off.is_active = false;
        for s in [&b, &a, &c, &off] {
            store.insert_data_source(s).await.unwrap();
        }

        let names: Vec<String> = store
            .active_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn usage_bookkeeping_round_trips() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut cfg = Map::new();
        cfg.insert("outputsize".into(), Value::String("full".into()));
        let source = DataSource::new("td", ProviderKind::TwelveData, "https://api.twelvedata.com")
            .with_api_key("k")
            .with_configuration(cfg);
        store.insert_data_source(&source).await.unwrap();

        store.record_failure(&source.id, "HTTP 429").await.unwrap();
        let loaded = &store.active_sources().await.unwrap()[0];
        assert_eq!(loaded.last_error.as_deref(), Some("HTTP 429"));
        assert_eq!(loaded.usage_count, 0);
        assert_eq!(loaded.configuration["outputsize"], "full");

        let now = Utc::now();
        store.record_success(&source.id, now).await.unwrap();
        let loaded = &store.active_sources().await.unwrap()[0];
        assert_eq!(loaded.usage_count, 1);
        assert!(loaded.last_error.is_none());
        assert_eq!(loaded.last_used.map(|t| t.timestamp_micros()), Some(now.timestamp_micros()));

        assert_eq!(store.reset_usage().await.unwrap(), 1);
        assert_eq!(store.active_sources().await.unwrap()[0].usage_count, 0);
    }

    #[tokio::test]
    async fn expire_only_touches_past_active_signals() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        let stale = signal("EURUSD", now - Duration::hours(30));
        let fresh = signal("GBPUSD", now - Duration::hours(1));
        store.create(&stale).await.unwrap();
        store.create(&fresh).await.unwrap();

        assert_eq!(store.expire(now).await.unwrap(), 1);
        // second pass has nothing left to do
        assert_eq!(store.expire(now).await.unwrap(), 0);

        let active = store.find_active(&SignalFilter::default()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, fresh.id);
        assert_eq!(active[0].indicators["rsi"], 20.0);
    }

    #[tokio::test]
    async fn find_active_filters_and_orders_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        let older = signal("EURUSD", now - Duration::minutes(10));
        let newer = signal("EURUSD", now - Duration::minutes(1));
        let other = signal("USDJPY", now);
        for s in [&older, &newer, &other] {
            store.create(s).await.unwrap();
        }

        let filter = SignalFilter {
            pair: Some("EURUSD".into()),
            ..SignalFilter::default()
        };
        let found = store.find_active(&filter).await.unwrap();
        let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, [newer.id.as_str(), older.id.as_str()]);

        let limited = SignalFilter { limit: 1, ..SignalFilter::default() };
        assert_eq!(store.find_active(&limited).await.unwrap()[0].id, other.id);

        assert_eq!(store.mark_inactive(&[newer.id.clone(), "missing".into()]).await.unwrap(), 1);
        assert_eq!(store.find_active(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connectivity_check_leaves_usage_alone() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut source = DataSource::new("pg", ProviderKind::Polygon, "https://api.polygon.io");
        source.usage_count = 7;
        source.last_error = Some("timeout".into());
        store.insert_data_source(&source).await.unwrap();

        let now = Utc::now();
        store.record_check(&source.id, now).await.unwrap();
        let loaded = &store.active_sources().await.unwrap()[0];
        assert_eq!(loaded.usage_count, 7);
        assert!(loaded.last_error.is_none());
        assert_eq!(loaded.last_used.map(|t| t.timestamp_micros()), Some(now.timestamp_micros()));
    }

    #[tokio::test]
    async fn stats_count_only_active_signals() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        let mut sell = signal("USDJPY", now - Duration::minutes(3));
        sell.signal_type = SignalType::Sell;
        let retired = signal("AUDUSD", now - Duration::minutes(2));
        for s in [
            &signal("EURUSD", now - Duration::minutes(5)),
            &signal("EURUSD", now - Duration::minutes(4)),
            &sell,
            &retired,
        ] {
            store.create(s).await.unwrap();
        }
        store.mark_inactive(&[retired.id.clone()]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active, 3);
        assert_eq!(stats.by_type[&SignalType::Buy], 2);
        assert_eq!(stats.by_type[&SignalType::Sell], 1);
        assert_eq!(
            stats.by_pair,
            [
                PairCount { pair: "EURUSD".into(), count: 2 },
                PairCount { pair: "USDJPY".into(), count: 1 },
            ]
        );

        let empty = SqliteStore::in_memory().await.unwrap().stats().await.unwrap();
        assert_eq!(empty, SignalStats::default());
    }

    #[tokio::test]
    async fn configs_round_trip_and_count() {
        let store = SqliteStore::in_memory().await.unwrap();
        let mut enabled = ScannerConfig::new("rsiOversold");
        enabled.rules.insert("rsiOversold".into(), Value::from(25));
        let mut disabled = ScannerConfig::new("movingAverageCross");
        disabled.is_enabled = false;
        store.insert(&enabled).await.unwrap();
        store.insert(&disabled).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let loaded = store.enabled_configs().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].strategy_name, "rsiOversold");
        assert_eq!(loaded[0].rules["rsiOversold"], 25);
        assert_eq!(loaded[0].pairs, ["EURUSD", "GBPUSD", "USDJPY"]);
    }
}
