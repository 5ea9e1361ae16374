use serde::{Deserialize, Serialize};

/// MACD (Moving Average Convergence/Divergence) indicator.
///
/// MACD line = EMA(fast) − EMA(slow) over closes ordered newest-first.
/// The signal line is a fixed fraction of the MACD line rather than an EMA of
/// the MACD series; stored signals depend on that shape, so it is kept.
#[derive(Debug, Clone)]
pub struct MacdIndicator {
    pub fast: usize,
    pub slow: usize,
}

/// The result of a MACD computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub value: f64,
    pub signal: f64,
    pub histogram: f64,
}

impl Default for MacdIndicator {
    fn default() -> Self {
        Self::new(12, 26)
    }
}

impl MacdIndicator {
    pub const SIGNAL_RATIO: f64 = 0.9;

    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(
            fast < slow,
            "MACD fast period must be less than slow period"
        );
        Self { fast, slow }
    }

    /// Compute MACD from closes (newest first). Never fails: short input
    /// degrades to the EMA fallback of the most recent close.
    pub fn compute(&self, closes: &[f64]) -> MacdValue {
        let value = ema(closes, self.fast) - ema(closes, self.slow);
        let signal = value * Self::SIGNAL_RATIO;
        MacdValue {
            value,
            signal,
            histogram: value - signal,
        }
    }
}

/// Exponential moving average seeded with the SMA of the first `period`
/// values, then smoothed up to `period * 2` samples.
pub fn ema(data: &[f64], period: usize) -> f64 {
    if data.is_empty() || period == 0 {
        return 0.0;
    }
    if data.len() < period {
        return data[0];
    }
    let k = 2.0 / (period as f64 + 1.0);

    let mut ema_val: f64 = data[..period].iter().sum::<f64>() / period as f64;

    let end = data.len().min(period * 2);
    for &price in &data[period..end] {
        ema_val = (price - ema_val) * k + ema_val;
    }
    ema_val
}
