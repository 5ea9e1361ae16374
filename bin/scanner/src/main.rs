use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::{Config, LogFormat};
use engine::{
    http_client, DataSourceSelector, LogNotifier, Pacing, ProviderRegistry, ScanEngine, Scheduler,
    Schedules,
};
use store::SqliteStore;
use strategy::StrategyFileConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("Failed to load configuration")?;

    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cfg.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
    info!("Market scanner starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let store = SqliteStore::connect(&cfg.database_url)
        .await
        .with_context(|| format!("Failed to connect to database '{}'", cfg.database_url))?;
    store.migrate().await.context("Database migration failed")?;
    info!("Database ready");

    // ── Strategy seeds ────────────────────────────────────────────────────────
    let seeds = match &cfg.strategy_seed_path {
        Some(path) => StrategyFileConfig::load(path)?,
        None => StrategyFileConfig::defaults(),
    };
    let seeded = seeds.seed_if_empty(&store).await.context("Strategy seeding failed")?;
    if seeded > 0 {
        info!(seeded, "Default scanner configurations created");
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let http = http_client(Duration::from_secs(cfg.http_timeout_secs))?;
    let store = Arc::new(store);
    let selector = DataSourceSelector::new(store.clone(), ProviderRegistry::http(http), Pacing::default());
    let engine = Arc::new(ScanEngine::new(
        store.clone(),
        selector,
        store.clone(),
        Arc::new(LogNotifier),
    ));

    // ── Scheduler ─────────────────────────────────────────────────────────────
    let (scheduler, handle) = Scheduler::new(engine, &Schedules::from(&cfg))?;
    info!(
        scan = %cfg.scan_cron,
        cleanup = %cfg.cleanup_cron,
        usage_reset = %cfg.usage_reset_cron,
        "Schedules configured"
    );
    tokio::spawn(scheduler.run());

    if cfg.scan_on_startup {
        info!("Running startup scan");
        handle.trigger_scan().await;
    }

    // Keep main alive
    info!("Scanner running. Waiting for shutdown signal.");
    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received. Exiting.");
    Ok(())
}
