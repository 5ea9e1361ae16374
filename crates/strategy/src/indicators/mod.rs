//! Indicator pipeline: newest-first candles in, one [`IndicatorSnapshot`] out.

pub mod macd;
pub mod rsi;

pub use macd::{MacdIndicator, MacdValue};
pub use rsi::RsiIndicator;

use serde::{Deserialize, Serialize};

use common::{Candle, Error, Result, MAX_CANDLES};

/// Fewest candles the pipeline accepts.
pub const MIN_CANDLES: usize = 50;

/// Window used for support/resistance levels.
pub const LEVELS_WINDOW: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingAverages {
    pub ma20: f64,
    pub ma50: f64,
    pub ma200: f64,
}

impl MovingAverages {
    /// Look up one of the computed windows.
    pub fn window(&self, period: usize) -> Option<f64> {
        match period {
            20 => Some(self.ma20),
            50 => Some(self.ma50),
            200 => Some(self.ma200),
            _ => None,
        }
    }
}

/// Everything a strategy may look at, plus the candles it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub rsi: f64,
    pub macd: MacdValue,
    pub ma: MovingAverages,
    pub support: f64,
    pub resistance: f64,
    pub candles: Vec<Candle>,
}

/// Compute the full snapshot from candles ordered newest-first.
pub fn compute_indicators(candles: &[Candle]) -> Result<IndicatorSnapshot> {
    if candles.len() < MIN_CANDLES {
        return Err(Error::InsufficientData {
            required: MIN_CANDLES,
            available: candles.len(),
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let latest = &candles[0];
    let (support, resistance) = support_resistance(candles, LEVELS_WINDOW);

    Ok(IndicatorSnapshot {
        close: latest.close,
        high: latest.high,
        low: latest.low,
        volume: latest.volume.unwrap_or(0.0),
        rsi: RsiIndicator::default().compute(&closes),
        macd: MacdIndicator::default().compute(&closes),
        ma: MovingAverages {
            ma20: sma(&closes, 20),
            ma50: sma(&closes, 50),
            ma200: sma(&closes, 200),
        },
        support,
        resistance,
        candles: candles.iter().take(MAX_CANDLES).cloned().collect(),
    })
}

/// Simple average of the first `period` values; the latest value when short.
pub fn sma(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if period == 0 || values.len() < period {
        return values[0];
    }
    values[..period].iter().sum::<f64>() / period as f64
}

/// Lowest low and highest high over the most recent `window` candles.
pub fn support_resistance(candles: &[Candle], window: usize) -> (f64, f64) {
    candles
        .iter()
        .take(window)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.low), hi.max(c.high))
        })
}
