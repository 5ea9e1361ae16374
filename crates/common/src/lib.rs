pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{Config, LogFormat};
pub use error::{Error, Result};
pub use store::{DataSourceRepository, ScannerConfigRepository, SignalNotifier, SignalStore};
pub use types::*;
