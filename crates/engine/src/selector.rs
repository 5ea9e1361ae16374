use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use common::{Candle, DataSource, DataSourceRepository, Error, Pair, Result, Timeframe};

use crate::pacing::{Pacer, Pacing};
use crate::providers::{ProviderRegistry, ProviderRequest};

/// Result of a one-off connectivity check against a single source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceCheck {
    pub source_id: String,
    pub latency_ms: u64,
    pub candles: usize,
}

/// Picks the first usable data source in priority order and fails over to the
/// next one on error. Usage and error bookkeeping is written after every attempt.
pub struct DataSourceSelector {
    sources: Arc<dyn DataSourceRepository>,
    providers: ProviderRegistry,
    pacer: Pacer,
}

impl DataSourceSelector {
    pub fn new(
        sources: Arc<dyn DataSourceRepository>,
        providers: ProviderRegistry,
        pacing: Pacing,
    ) -> Self {
        Self {
            sources,
            providers,
            pacer: Pacer::new(pacing),
        }
    }

    pub async fn select_and_fetch(&self, pair: &Pair, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let sources = self.sources.active_sources().await?;
        if sources.is_empty() {
            return Err(Error::NoSourcesConfigured);
        }

        for source in &sources {
            if source.is_exhausted() {
                debug!(
                    source = %source.name,
                    usage = source.usage_count,
                    limit = source.rate_limit,
                    "Skipping rate-limited data source"
                );
                continue;
            }

            let Some(provider) = self.providers.get(source.provider) else {
                let msg = format!("No adapter registered for provider '{}'", source.provider);
                warn!(source = %source.name, "{msg}");
                self.note_failure(&source.id, &source.name, &msg).await;
                continue;
            };

            self.pacer.wait(source.provider).await;
            let request = ProviderRequest::new(source, pair, timeframe);

            match provider.fetch_candles(&request).await {
                Ok(candles) => {
                    if let Err(e) = self.sources.record_success(&source.id, Utc::now()).await {
                        warn!(source = %source.name, error = %e, "Failed to record data source usage");
                    }
                    info!(
                        source = %source.name,
                        provider = %source.provider,
                        %pair,
                        %timeframe,
                        candles = candles.len(),
                        "Fetched candles"
                    );
                    return Ok(candles);
                }
                Err(e) => {
                    warn!(
                        source = %source.name,
                        provider = %source.provider,
                        %pair,
                        %timeframe,
                        error = %e,
                        "Data source failed, trying next"
                    );
                    self.note_failure(&source.id, &source.name, &e.to_string()).await;
                }
            }
        }

        Err(Error::NotAvailable {
            pair: pair.to_string(),
            timeframe,
        })
    }

    /// Fetch EURUSD 1h from one source, regardless of priority, activity or
    /// remaining quota. Success stamps `last_used` and clears `last_error`
    /// without counting against the rate limit; failure records the error.
    pub async fn test_source(&self, source: &DataSource) -> Result<SourceCheck> {
        let Some(provider) = self.providers.get(source.provider) else {
            let msg = format!("No adapter registered for provider '{}'", source.provider);
            self.note_failure(&source.id, &source.name, &msg).await;
            return Err(Error::Config(msg));
        };

        let pair = Pair::new("EURUSD")?;
        self.pacer.wait(source.provider).await;
        let request = ProviderRequest::new(source, &pair, Timeframe::OneHour);

        let started = Instant::now();
        let result = provider.fetch_candles(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(candles) => {
                if let Err(e) = self.sources.record_check(&source.id, Utc::now()).await {
                    warn!(source = %source.name, error = %e, "Failed to record data source check");
                }
                info!(source = %source.name, latency_ms, candles = candles.len(), "Data source check passed");
                Ok(SourceCheck {
                    source_id: source.id.clone(),
                    latency_ms,
                    candles: candles.len(),
                })
            }
            Err(e) => {
                warn!(source = %source.name, latency_ms, error = %e, "Data source check failed");
                self.note_failure(&source.id, &source.name, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Zero every source's usage counter.
    pub async fn reset_usage(&self) -> Result<u64> {
        self.sources.reset_usage().await
    }

    async fn note_failure(&self, id: &str, name: &str, message: &str) {
        if let Err(e) = self.sources.record_failure(id, message).await {
            warn!(source = %name, error = %e, "Failed to record data source error");
        }
    }
}
