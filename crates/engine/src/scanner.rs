use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use common::{
    Error, Pair, Result, ScannerConfig, ScannerConfigRepository, SignalNotifier, SignalStats,
    SignalStore, Timeframe,
};
use strategy::{compute_indicators, Strategy};

use crate::selector::DataSourceSelector;

/// Counters for one completed scan run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Configs whose strategy was built and scanned.
    pub strategies: usize,
    /// Pair × timeframe combinations that reached the selector.
    pub evaluated: usize,
    pub signals_created: usize,
    /// No source could serve the combination, or too few candles came back.
    pub unavailable: usize,
    /// Bad config entries, store errors and panicking strategies.
    pub failures: usize,
}

impl ScanReport {
    fn merge(&mut self, other: ScanReport) {
        self.strategies += other.strategies;
        self.evaluated += other.evaluated;
        self.signals_created += other.signals_created;
        self.unavailable += other.unavailable;
        self.failures += other.failures;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(ScanReport),
    /// Another run held the lock; this trigger was dropped.
    AlreadyRunning,
}

/// Runs every enabled strategy over its pairs and timeframes and stores the
/// resulting signals. Runs never overlap.
pub struct ScanEngine {
    configs: Arc<dyn ScannerConfigRepository>,
    selector: DataSourceSelector,
    signals: Arc<dyn SignalStore>,
    notifier: Arc<dyn SignalNotifier>,
    run_lock: Mutex<()>,
}

impl ScanEngine {
    pub fn new(
        configs: Arc<dyn ScannerConfigRepository>,
        selector: DataSourceSelector,
        signals: Arc<dyn SignalStore>,
        notifier: Arc<dyn SignalNotifier>,
    ) -> Self {
        Self {
            configs,
            selector,
            signals,
            notifier,
            run_lock: Mutex::new(()),
        }
    }

    pub async fn run_scan(&self) -> ScanOutcome {
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("Scan already in progress, skipping trigger");
            return ScanOutcome::AlreadyRunning;
        };

        let started = Instant::now();
        let mut report = ScanReport::default();

        let configs = match self.configs.enabled_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                error!(error = %e, "Failed to load scanner configurations");
                report.failures += 1;
                return ScanOutcome::Completed(report);
            }
        };
        info!(configs = configs.len(), "Starting market scan");

        for config in &configs {
            let strategy = match Strategy::from_config(&config.strategy_name, &config.rules) {
                Ok(strategy) => strategy,
                Err(e) => {
                    warn!(strategy = %config.strategy_name, error = %e, "Skipping strategy");
                    report.failures += 1;
                    continue;
                }
            };

            match AssertUnwindSafe(self.scan_strategy(config, &strategy))
                .catch_unwind()
                .await
            {
                Ok(partial) => report.merge(partial),
                Err(_) => {
                    error!(strategy = %config.strategy_name, "Strategy scan panicked");
                    report.failures += 1;
                }
            }
        }

        info!(
            strategies = report.strategies,
            evaluated = report.evaluated,
            signals = report.signals_created,
            unavailable = report.unavailable,
            failures = report.failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Market scan completed"
        );
        ScanOutcome::Completed(report)
    }

    async fn scan_strategy(&self, config: &ScannerConfig, strategy: &Strategy) -> ScanReport {
        let mut report = ScanReport {
            strategies: 1,
            ..ScanReport::default()
        };
        let name = strategy.name();

        let pairs = parse_entries::<Pair>(name, "pair", &config.pairs, &mut report);
        let timeframes = parse_entries::<Timeframe>(name, "timeframe", &config.timeframes, &mut report);

        for pair in &pairs {
            for &timeframe in &timeframes {
                report.evaluated += 1;

                let candles = match self.selector.select_and_fetch(pair, timeframe).await {
                    Ok(candles) => candles,
                    Err(e) if e.is_unavailable() => {
                        warn!(strategy = name, %pair, %timeframe, error = %e, "No market data");
                        report.unavailable += 1;
                        continue;
                    }
                    Err(e) => {
                        error!(strategy = name, %pair, %timeframe, error = %e, "Market data fetch failed");
                        report.failures += 1;
                        continue;
                    }
                };

                let snapshot = match compute_indicators(&candles) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        warn!(strategy = name, %pair, %timeframe, error = %e, "Cannot compute indicators");
                        report.unavailable += 1;
                        continue;
                    }
                };

                let Some(result) = strategy.evaluate(&snapshot) else {
                    debug!(strategy = name, %pair, %timeframe, "No signal");
                    continue;
                };

                let signal = result.into_signal(pair.as_str(), timeframe, name, Utc::now());
                if let Err(e) = self.signals.create(&signal).await {
                    error!(strategy = name, %pair, %timeframe, error = %e, "Failed to store signal");
                    report.failures += 1;
                    continue;
                }
                report.signals_created += 1;
                info!(
                    strategy = name,
                    %pair,
                    %timeframe,
                    side = %signal.signal_type,
                    confidence = signal.confidence,
                    "Signal created"
                );

                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&signal).await {
                        warn!(id = %signal.id, error = %e, "Signal notification failed");
                    }
                });
            }
        }

        report
    }

    /// Deactivate every signal past its expiry.
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let expired = self.signals.expire(Utc::now()).await?;
        info!(expired, "Expired signals cleaned up");
        Ok(expired)
    }

    pub async fn stats(&self) -> Result<SignalStats> {
        self.signals.stats().await
    }

    /// Start a new usage period for every data source.
    pub async fn reset_usage(&self) -> Result<u64> {
        let reset = self.selector.reset_usage().await?;
        info!(sources = reset, "Data source usage counters reset");
        Ok(reset)
    }
}

/// Parse config entries, logging and counting the ones that are invalid.
fn parse_entries<T>(strategy: &str, what: &str, raw: &[String], report: &mut ScanReport) -> Vec<T>
where
    T: std::str::FromStr<Err = Error>,
{
    raw.iter()
        .filter_map(|entry| match entry.parse::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(strategy, entry = %entry, error = %e, "Skipping invalid {what}");
                report.failures += 1;
                None
            }
        })
        .collect()
}
