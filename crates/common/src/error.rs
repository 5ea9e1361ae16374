use thiserror::Error;

use crate::Timeframe;

#[derive(Debug, Error)]
pub enum Error {
    /// Connect failure, timeout or broken body while talking to a provider.
    #[error("Provider transport error: {0}")]
    ProviderTransport(String),

    /// The provider answered, but with an error status, a soft error or a
    /// body we could not turn into candles.
    #[error("Provider data error: {0}")]
    ProviderData(String),

    #[error("No active data sources configured")]
    NoSourcesConfigured,

    #[error("No data source could serve {pair} {timeframe}")]
    NotAvailable { pair: String, timeframe: Timeframe },

    #[error("Insufficient candle data: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Outcomes that mean "no signal this round" rather than a fault.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::NoSourcesConfigured | Error::NotAvailable { .. } | Error::InsufficientData { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
