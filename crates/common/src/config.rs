use crate::{Error, Result};

/// Log output style for the binary's subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// All configuration loaded from environment variables at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Schedules (six-field cron expressions, UTC)
    pub scan_cron: String,
    pub cleanup_cron: String,
    pub usage_reset_cron: String,

    // Provider HTTP
    pub http_timeout_secs: u64,

    // Optional TOML file with the strategies seeded on first boot
    pub strategy_seed_path: Option<String>,

    /// Trigger one scan right after startup instead of waiting for the first tick.
    pub scan_on_startup: bool,

    pub log_format: LogFormat,
}

impl Config {
    pub const DEFAULT_SCAN_CRON: &'static str = "0 0 * * * *";
    pub const DEFAULT_CLEANUP_CRON: &'static str = "0 0 */6 * * *";
    pub const DEFAULT_USAGE_RESET_CRON: &'static str = "0 0 0 * * *";
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                Error::Config(format!(
                    "Required environment variable '{key}' is not set. Check your .env file."
                ))
            })
        };

        let http_timeout_secs = match lookup("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!("HTTP_TIMEOUT_SECS must be a positive integer, got '{raw}'"))
            })?,
            None => Self::DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let scan_on_startup = match lookup("SCAN_ON_STARTUP") {
            Some(raw) => parse_bool("SCAN_ON_STARTUP", &raw)?,
            None => false,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(Error::Config(format!(
                    "LOG_FORMAT must be 'pretty' or 'json', got: '{other}'"
                )))
            }
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            scan_cron: lookup("SCAN_CRON").unwrap_or_else(|| Self::DEFAULT_SCAN_CRON.to_string()),
            cleanup_cron: lookup("CLEANUP_CRON")
                .unwrap_or_else(|| Self::DEFAULT_CLEANUP_CRON.to_string()),
            usage_reset_cron: lookup("USAGE_RESET_CRON")
                .unwrap_or_else(|| Self::DEFAULT_USAGE_RESET_CRON.to_string()),
            http_timeout_secs,
            strategy_seed_path: lookup("STRATEGY_SEED_PATH").filter(|p| !p.trim().is_empty()),
            scan_on_startup,
            log_format,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(Error::Config(format!("{key} must be a boolean, got: '{other}'"))),
    }
}
