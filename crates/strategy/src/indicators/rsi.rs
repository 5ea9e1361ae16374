/// RSI (Relative Strength Index) indicator.
///
/// Operates on closes ordered newest-first, so a "gain" is the newer close
/// minus the older one. Wilder smoothing is applied over at most
/// `period * 3` samples, which keeps the value stable when providers return
/// different history lengths.
#[derive(Debug, Clone)]
pub struct RsiIndicator {
    pub period: usize,
}

impl Default for RsiIndicator {
    fn default() -> Self {
        Self::new(14)
    }
}

impl RsiIndicator {
    pub const NEUTRAL: f64 = 50.0;

    pub fn new(period: usize) -> Self {
        assert!(period >= 2, "RSI period must be >= 2");
        Self { period }
    }

    /// Compute RSI from closes (newest first).
    /// Returns exactly [`Self::NEUTRAL`] when fewer than `period + 1` values exist.
    pub fn compute(&self, closes: &[f64]) -> f64 {
        let period = self.period;
        if closes.len() < period + 1 {
            return Self::NEUTRAL;
        }

        let change = |i: usize| closes[i - 1] - closes[i];

        let mut gains = 0.0;
        let mut losses = 0.0;
        for i in 1..=period {
            let c = change(i);
            if c > 0.0 {
                gains += c;
            } else {
                losses += c.abs();
            }
        }

        let mut avg_gain = gains / period as f64;
        let mut avg_loss = losses / period as f64;
        let decay = (period - 1) as f64;

        let end = closes.len().min(period * 3);
        for i in (period + 1)..end {
            let c = change(i);
            let (gain, loss) = if c > 0.0 { (c, 0.0) } else { (0.0, c.abs()) };
            avg_gain = (avg_gain * decay + gain) / period as f64;
            avg_loss = (avg_loss * decay + loss) / period as f64;
        }

        if avg_loss == 0.0 {
            return if avg_gain == 0.0 { Self::NEUTRAL } else { 100.0 };
        }

        let rs = avg_gain / avg_loss;
        (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Chronological series reversed into the newest-first order the pipeline uses.
    fn newest_first(chronological: Vec<f64>) -> Vec<f64> {
        chronological.into_iter().rev().collect()
    }

    #[test]
    fn rsi_is_neutral_when_insufficient_data() {
        let rsi = RsiIndicator::default();
        // Need at least period+1 = 15 values
        let prices = newest_first((0..14).map(|i| 100.0 + i as f64).collect());
        assert_eq!(rsi.compute(&prices), 50.0);
    }

    #[test]
    fn rsi_rising_series_converges_to_100() {
        let rsi = RsiIndicator::default();
        let prices = newest_first((0..40).map(|i| 1.0 + i as f64 * 0.01).collect());
        let value = rsi.compute(&prices);
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_falling_series_converges_to_0() {
        let rsi = RsiIndicator::default();
        let prices = newest_first((0..40).map(|i| 2.0 - i as f64 * 0.01).collect());
        let value = rsi.compute(&prices);
        assert!(value.abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let rsi = RsiIndicator::default();
        assert_eq!(rsi.compute(&[1.1; 30]), 50.0);
    }

    #[test]
    fn rsi_known_value() {
        // Investopedia RSI example prices (rounded), oldest first
        let rsi = RsiIndicator::default();
        let prices = newest_first(vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09,
        ]);
        let v = rsi.compute(&prices);
        assert!((0.0..=100.0).contains(&v), "RSI out of range: {v}");
        assert!(v < 60.0 && v > 40.0, "choppy series should stay mid-range, got {v}");
    }

    #[test]
    fn rsi_ignores_history_beyond_three_periods() {
        let rsi = RsiIndicator::default();
        let recent: Vec<f64> = newest_first((0..42).map(|i| 100.0 + (i % 3) as f64).collect());
        let mut longer = recent.clone();
        longer.extend((0..100).map(|i| 500.0 - i as f64));
        assert_eq!(rsi.compute(&recent), rsi.compute(&longer));
    }
}
