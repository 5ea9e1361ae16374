pub mod lifecycle;
pub mod notify;
pub mod pacing;
pub mod providers;
pub mod scanner;
pub mod selector;

pub use lifecycle::{ScanCommand, Scheduler, SchedulerHandle, Schedules};
pub use notify::LogNotifier;
pub use pacing::{Pacer, Pacing};
pub use providers::{http_client, CandleProvider, ProviderRegistry, ProviderRequest};
pub use scanner::{ScanEngine, ScanOutcome, ScanReport};
pub use selector::{DataSourceSelector, SourceCheck};
