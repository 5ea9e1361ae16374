use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use common::ProviderKind;

const ALL_KINDS: [ProviderKind; 5] = [
    ProviderKind::AlphaVantage,
    ProviderKind::TwelveData,
    ProviderKind::Polygon,
    ProviderKind::Finnhub,
    ProviderKind::Custom,
];

/// Minimum spacing between two outbound calls to the same provider kind.
#[derive(Debug, Clone)]
pub struct Pacing {
    intervals: HashMap<ProviderKind, Duration>,
}

impl Default for Pacing {
    fn default() -> Self {
        let intervals = ALL_KINDS
            .into_iter()
            .map(|kind| {
                let ms = match kind {
                    // free tier: 5 calls per minute
                    ProviderKind::AlphaVantage => 1200,
                    _ => 100,
                };
                (kind, Duration::from_millis(ms))
            })
            .collect();
        Self { intervals }
    }
}

impl Pacing {
    /// No spacing at all.
    pub fn disabled() -> Self {
        Self {
            intervals: ALL_KINDS.into_iter().map(|k| (k, Duration::ZERO)).collect(),
        }
    }

    pub fn with_interval(mut self, kind: ProviderKind, interval: Duration) -> Self {
        self.intervals.insert(kind, interval);
        self
    }

    pub fn interval(&self, kind: ProviderKind) -> Duration {
        self.intervals.get(&kind).copied().unwrap_or_default()
    }
}

/// Per-provider last-call tracker. One lock per kind, held across the wait so
/// concurrent callers queue up behind each other.
pub struct Pacer {
    pacing: Pacing,
    last_call: HashMap<ProviderKind, Mutex<Option<Instant>>>,
}

impl Pacer {
    pub fn new(pacing: Pacing) -> Self {
        let last_call = ALL_KINDS.into_iter().map(|k| (k, Mutex::new(None))).collect();
        Self { pacing, last_call }
    }

    /// Sleep until `kind` may be called again, then claim the slot.
    pub async fn wait(&self, kind: ProviderKind) {
        let interval = self.pacing.interval(kind);
        let Some(slot) = self.last_call.get(&kind) else {
            return;
        };
        let mut last = slot.lock().await;
        if let Some(prev) = *last {
            let ready_at = prev + interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
