use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{DataSource, Result, ScannerConfig, Signal, SignalFilter, SignalStats};

/// Read access to provider records plus the usage bookkeeping the selector
/// writes after every fetch attempt.
///
/// `SqliteStore` implements this for production, `MemoryStore` for tests and
/// database-less embedding. Creating and editing sources belongs to the admin
/// collaborator and is not part of this contract.
#[async_trait]
pub trait DataSourceRepository: Send + Sync {
    /// Active sources ordered by ascending priority, ties in insertion order.
    async fn active_sources(&self) -> Result<Vec<DataSource>>;

    /// Increment usage by one, stamp `last_used` and clear `last_error`.
    async fn record_success(&self, source_id: &str, used_at: DateTime<Utc>) -> Result<()>;

    /// Stamp `last_used` and clear `last_error` after a manual connectivity
    /// check. Usage is left untouched.
    async fn record_check(&self, source_id: &str, used_at: DateTime<Utc>) -> Result<()>;

    /// Store the failure message. Usage is left untouched.
    async fn record_failure(&self, source_id: &str, error: &str) -> Result<()>;

    /// Zero every usage counter. Returns the number of rows touched.
    async fn reset_usage(&self) -> Result<u64>;
}

#[async_trait]
pub trait ScannerConfigRepository: Send + Sync {
    async fn enabled_configs(&self) -> Result<Vec<ScannerConfig>>;

    async fn count(&self) -> Result<u64>;

    async fn insert(&self, config: &ScannerConfig) -> Result<()>;
}

/// Persistence for generated signals.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn create(&self, signal: &Signal) -> Result<()>;

    /// Deactivate the given signals. Already inactive ones stay inactive.
    async fn mark_inactive(&self, ids: &[String]) -> Result<u64>;

    /// Deactivate every active signal with `expires_at < now`.
    async fn expire(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn find_active(&self, filter: &SignalFilter) -> Result<Vec<Signal>>;

    /// Totals over active signals, see [`SignalStats`].
    async fn stats(&self) -> Result<SignalStats>;
}

/// Hands a freshly stored signal to whatever delivers notifications.
/// Called off the scan loop; failures are only logged.
#[async_trait]
pub trait SignalNotifier: Send + Sync {
    async fn notify(&self, signal: &Signal) -> Result<()>;
}
