use async_trait::async_trait;
use tracing::info;

use common::{Result, Signal, SignalNotifier};

/// Notifier that only writes the signal to the log. Delivery channels plug in
/// behind the same trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl SignalNotifier for LogNotifier {
    async fn notify(&self, signal: &Signal) -> Result<()> {
        info!(
            id = %signal.id,
            pair = %signal.pair,
            timeframe = %signal.timeframe,
            side = %signal.signal_type,
            entry = signal.entry,
            stop_loss = signal.stop_loss,
            take_profit = signal.take_profit,
            confidence = signal.confidence,
            strategy = %signal.strategy_name,
            "New signal"
        );
        Ok(())
    }
}
