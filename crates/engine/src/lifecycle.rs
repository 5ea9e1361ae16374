use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use common::{Config, Error, Result};

use crate::scanner::{ScanEngine, ScanOutcome};

/// Work the scheduler can be asked to do, on a tick or on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCommand {
    RunScan,
    Cleanup,
    ResetUsage,
}

/// Cron expressions (six fields, UTC) for the three periodic jobs.
#[derive(Debug, Clone)]
pub struct Schedules {
    pub scan: String,
    pub cleanup: String,
    pub usage_reset: String,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            scan: Config::DEFAULT_SCAN_CRON.into(),
            cleanup: Config::DEFAULT_CLEANUP_CRON.into(),
            usage_reset: Config::DEFAULT_USAGE_RESET_CRON.into(),
        }
    }
}

impl From<&Config> for Schedules {
    fn from(cfg: &Config) -> Self {
        Self {
            scan: cfg.scan_cron.clone(),
            cleanup: cfg.cleanup_cron.clone(),
            usage_reset: cfg.usage_reset_cron.clone(),
        }
    }
}

/// Cloneable handle for manual triggers.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<ScanCommand>,
}

impl SchedulerHandle {
    pub async fn send(&self, cmd: ScanCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(?cmd, "Scheduler is not running, command dropped");
        }
    }

    pub async fn trigger_scan(&self) {
        self.send(ScanCommand::RunScan).await;
    }
}

/// Drives the scan engine from cron ticks and handle commands.
pub struct Scheduler {
    engine: Arc<ScanEngine>,
    jobs: Vec<(ScanCommand, Schedule)>,
    command_rx: mpsc::Receiver<ScanCommand>,
    command_tx: mpsc::Sender<ScanCommand>,
}

impl Scheduler {
    pub fn new(engine: Arc<ScanEngine>, schedules: &Schedules) -> Result<(Self, SchedulerHandle)> {
        let jobs = vec![
            (ScanCommand::RunScan, parse_schedule("scan", &schedules.scan)?),
            (ScanCommand::Cleanup, parse_schedule("cleanup", &schedules.cleanup)?),
            (ScanCommand::ResetUsage, parse_schedule("usage reset", &schedules.usage_reset)?),
        ];
        let (command_tx, command_rx) = mpsc::channel(32);
        let handle = SchedulerHandle {
            command_tx: command_tx.clone(),
        };
        let scheduler = Scheduler {
            engine,
            jobs,
            command_rx,
            command_tx,
        };
        Ok((scheduler, handle))
    }

    /// Run until every sender is gone. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        let mut tickers = Vec::with_capacity(self.jobs.len());
        for (cmd, schedule) in self.jobs.drain(..) {
            tickers.push(tokio::spawn(tick(cmd, schedule, self.command_tx.clone())));
        }
        // the tickers hold their own senders
        drop(self.command_tx);
        info!("Scheduler started");

        while let Some(cmd) = self.command_rx.recv().await {
            let engine = self.engine.clone();
            tokio::spawn(execute(engine, cmd));
        }

        for ticker in tickers {
            ticker.abort();
        }
        warn!("Scheduler command channel closed, shutting down");
    }
}

fn parse_schedule(job: &str, expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr)
        .map_err(|e| Error::Config(format!("Invalid {job} cron expression '{expr}': {e}")))
}

async fn tick(cmd: ScanCommand, schedule: Schedule, tx: mpsc::Sender<ScanCommand>) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!(?cmd, "Cron schedule has no upcoming run");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        debug!(?cmd, next = %next, "Next scheduled run");
        tokio::time::sleep(wait).await;

        if tx.send(cmd).await.is_err() {
            return;
        }
    }
}

async fn execute(engine: Arc<ScanEngine>, cmd: ScanCommand) {
    match cmd {
        ScanCommand::RunScan => match engine.run_scan().await {
            ScanOutcome::Completed(report) => {
                debug!(?report, "Scan run finished");
                match engine.stats().await {
                    Ok(stats) => info!(active = stats.active, by_type = ?stats.by_type, "Active signals"),
                    Err(e) => warn!(error = %e, "Failed to read signal stats"),
                }
            }
            ScanOutcome::AlreadyRunning => {
                info!("Scan trigger ignored, a run is in progress");
            }
        },
        ScanCommand::Cleanup => {
            if let Err(e) = engine.cleanup_expired().await {
                error!(error = %e, "Signal cleanup failed");
            }
        }
        ScanCommand::ResetUsage => {
            if let Err(e) = engine.reset_usage().await {
                error!(error = %e, "Usage reset failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use common::{
        Candle, DataSource, ProviderKind, ScannerConfig, ScannerConfigRepository, SignalStore,
    };
    use store::MemoryStore;

    use crate::notify::LogNotifier;
    use crate::pacing::Pacing;
    use crate::providers::{CandleProvider, ProviderRegistry, ProviderRequest};
    use crate::selector::DataSourceSelector;

    struct Oversold;

    #[async_trait]
    impl CandleProvider for Oversold {
        async fn fetch_candles(&self, _req: &ProviderRequest<'_>) -> Result<Vec<Candle>> {
            let now = Utc::now();
            Ok((0..60)
                .map(|i| {
                    let close = 100.0 + i as f64;
                    Candle {
                        timestamp: now - ChronoDuration::hours(i),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: None,
                    }
                })
                .collect())
        }
    }

    fn engine(store: &MemoryStore) -> Arc<ScanEngine> {
        let selector = DataSourceSelector::new(
            Arc::new(store.clone()),
            ProviderRegistry::new().with(ProviderKind::Custom, Oversold),
            Pacing::disabled(),
        );
        Arc::new(ScanEngine::new(
            Arc::new(store.clone()),
            selector,
            Arc::new(store.clone()),
            Arc::new(LogNotifier),
        ))
    }

    #[test]
    fn invalid_cron_is_a_config_error() {
        let store = MemoryStore::new();
        let schedules = Schedules {
            scan: "every hour".into(),
            ..Schedules::default()
        };
        let err = Scheduler::new(engine(&store), &schedules).err().unwrap();
        assert!(matches!(err, Error::Config(msg) if msg.contains("scan")));
    }

    #[test]
    fn default_schedules_parse() {
        let store = MemoryStore::new();
        assert!(Scheduler::new(engine(&store), &Schedules::default()).is_ok());
    }

    #[tokio::test]
    async fn manual_trigger_runs_a_scan() {
        let store = MemoryStore::new();
        store
            .insert_data_source(DataSource::new("feed", ProviderKind::Custom, "http://feed"))
            .await;
        let mut config = ScannerConfig::new("rsiOversold");
        config.pairs = vec!["EURUSD".into()];
        config.timeframes = vec!["1h".into()];
        store.insert(&config).await.unwrap();

        let (scheduler, handle) = Scheduler::new(engine(&store), &Schedules::default()).unwrap();
        let task = tokio::spawn(scheduler.run());
        handle.trigger_scan().await;

        let mut created = false;
        for _ in 0..100 {
            if !store.signals().await.is_empty() {
                created = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(created, "manual trigger should produce a signal");

        handle.send(ScanCommand::Cleanup).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.expire(Utc::now()).await.unwrap(), 0);
        task.abort();
    }
}
