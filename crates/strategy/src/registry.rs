use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use common::{signal_ttl, Error, Result, Signal, SignalType, Timeframe};

use crate::indicators::IndicatorSnapshot;

/// Percentage stop-loss / take-profit used by the oscillator strategies.
const STOP_PCT: f64 = 0.02;
const TARGET_PCT: f64 = 0.04;

/// A buy or sell recommendation produced by one strategy evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySignal {
    pub signal_type: SignalType,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: f64,
    /// The indicator values that drove the decision.
    pub indicators: Map<String, Value>,
}

impl StrategySignal {
    /// Turn the evaluation into a persistable record expiring after 24h.
    pub fn into_signal(
        self,
        pair: &str,
        timeframe: Timeframe,
        strategy_name: &str,
        now: DateTime<Utc>,
    ) -> Signal {
        Signal {
            id: uuid::Uuid::new_v4().to_string(),
            pair: pair.to_string(),
            timeframe,
            signal_type: self.signal_type,
            entry: self.entry,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            confidence: self.confidence,
            strategy_name: strategy_name.to_string(),
            indicators: self.indicators,
            is_active: true,
            expires_at: now + signal_ttl(),
            created_at: now,
        }
    }
}

// ─── Rule sets ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RsiRules {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiRules {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacdRules {
    pub min_histogram: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaCrossRules {
    pub fast: usize,
    pub slow: usize,
}

impl Default for MaCrossRules {
    fn default() -> Self {
        Self { fast: 20, slow: 50 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupportResistanceRules {
    /// Fraction of the support–resistance band counted as "near" a level.
    pub band_proximity: f64,
}

impl Default for SupportResistanceRules {
    fn default() -> Self {
        Self {
            band_proximity: 0.05,
        }
    }
}

// ─── Strategy dispatch ────────────────────────────────────────────────────────

/// The closed set of scanner strategies, each with its own rule set.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    RsiOversold(RsiRules),
    MacdCrossover(MacdRules),
    MovingAverageCross(MaCrossRules),
    SupportResistance(SupportResistanceRules),
}

impl Strategy {
    pub const NAMES: [&'static str; 4] = [
        "rsiOversold",
        "macdCrossover",
        "movingAverageCross",
        "supportResistance",
    ];

    /// Build a strategy from a config record's name and rule map.
    pub fn from_config(name: &str, rules: &Map<String, Value>) -> Result<Self> {
        match name {
            "rsiOversold" => {
                let d = RsiRules::default();
                let r = RsiRules {
                    oversold: param_f64(rules, "rsiOversold", d.oversold)?,
                    overbought: param_f64(rules, "rsiOverbought", d.overbought)?,
                };
                if r.oversold >= r.overbought {
                    return Err(Error::Validation(format!(
                        "rsiOversold ({}) must be below rsiOverbought ({})",
                        r.oversold, r.overbought
                    )));
                }
                Ok(Strategy::RsiOversold(r))
            }
            "macdCrossover" => Ok(Strategy::MacdCrossover(MacdRules {
                min_histogram: param_f64(rules, "minHistogram", 0.0)?.abs(),
            })),
            "movingAverageCross" => {
                let d = MaCrossRules::default();
                let r = MaCrossRules {
                    fast: param_usize(rules, "fastMA", d.fast)?,
                    slow: param_usize(rules, "slowMA", d.slow)?,
                };
                for period in [r.fast, r.slow] {
                    if ![20, 50, 200].contains(&period) {
                        return Err(Error::Validation(format!(
                            "moving average window {period} is not one of 20, 50, 200"
                        )));
                    }
                }
                if r.fast >= r.slow {
                    return Err(Error::Validation(format!(
                        "fastMA ({}) must be shorter than slowMA ({})",
                        r.fast, r.slow
                    )));
                }
                Ok(Strategy::MovingAverageCross(r))
            }
            "supportResistance" => {
                let d = SupportResistanceRules::default();
                Ok(Strategy::SupportResistance(SupportResistanceRules {
                    band_proximity: param_f64(rules, "bandProximity", d.band_proximity)?,
                }))
            }
            other => Err(Error::UnknownStrategy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::RsiOversold(_) => "rsiOversold",
            Strategy::MacdCrossover(_) => "macdCrossover",
            Strategy::MovingAverageCross(_) => "movingAverageCross",
            Strategy::SupportResistance(_) => "supportResistance",
        }
    }

    /// Evaluate the snapshot. Returns `None` if no actionable signal is present.
    pub fn evaluate(&self, data: &IndicatorSnapshot) -> Option<StrategySignal> {
        let signal = match self {
            Strategy::RsiOversold(rules) => rsi_oversold(data, rules),
            Strategy::MacdCrossover(rules) => macd_crossover(data, rules),
            Strategy::MovingAverageCross(rules) => moving_average_cross(data, rules),
            Strategy::SupportResistance(rules) => support_resistance(data, rules),
        };
        if let Some(s) = &signal {
            debug!(strategy = self.name(), side = %s.signal_type, entry = s.entry, "Strategy fired");
        }
        signal
    }
}

fn param_f64(rules: &Map<String, Value>, key: &str, default: f64) -> Result<f64> {
    match rules.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|x| x.is_finite())
            .ok_or_else(|| Error::Validation(format!("rule '{key}' must be a number, got {v}"))),
    }
}

fn param_usize(rules: &Map<String, Value>, key: &str, default: usize) -> Result<usize> {
    match rules.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|x| x as usize)
            .ok_or_else(|| {
                Error::Validation(format!("rule '{key}' must be a positive integer, got {v}"))
            }),
    }
}

/// Percentage-based levels: buys stop below and target above, sells mirror.
fn pct_levels(side: SignalType, entry: f64) -> (f64, f64) {
    match side {
        SignalType::Buy => (entry * (1.0 - STOP_PCT), entry * (1.0 + TARGET_PCT)),
        SignalType::Sell => (entry * (1.0 + STOP_PCT), entry * (1.0 - TARGET_PCT)),
    }
}

fn indicators(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

// ─── Concrete strategies ──────────────────────────────────────────────────────

fn rsi_oversold(data: &IndicatorSnapshot, rules: &RsiRules) -> Option<StrategySignal> {
    let (side, confidence) = if data.rsi < rules.oversold {
        (SignalType::Buy, 75.0 + (rules.oversold - data.rsi))
    } else if data.rsi > rules.overbought {
        (SignalType::Sell, 75.0 + (data.rsi - rules.overbought))
    } else {
        return None;
    };

    let (stop_loss, take_profit) = pct_levels(side, data.close);
    Some(StrategySignal {
        signal_type: side,
        entry: data.close,
        stop_loss,
        take_profit,
        confidence,
        indicators: indicators(json!({ "rsi": data.rsi })),
    })
}

fn macd_crossover(data: &IndicatorSnapshot, rules: &MacdRules) -> Option<StrategySignal> {
    let macd = data.macd;
    let side = if macd.histogram > rules.min_histogram && macd.value > macd.signal {
        SignalType::Buy
    } else if macd.histogram < -rules.min_histogram && macd.value < macd.signal {
        SignalType::Sell
    } else {
        return None;
    };

    let confidence = 70.0 + (macd.histogram.abs() * 10_000.0).min(15.0);
    let (stop_loss, take_profit) = pct_levels(side, data.close);
    Some(StrategySignal {
        signal_type: side,
        entry: data.close,
        stop_loss,
        take_profit,
        confidence,
        indicators: indicators(json!({
            "macd": macd.value,
            "signal": macd.signal,
            "histogram": macd.histogram,
        })),
    })
}

fn moving_average_cross(data: &IndicatorSnapshot, rules: &MaCrossRules) -> Option<StrategySignal> {
    let fast = data.ma.window(rules.fast)?;
    let slow = data.ma.window(rules.slow)?;
    let close = data.close;

    // Golden cross / death cross
    let (side, take_profit) = if fast > slow && close > fast {
        (SignalType::Buy, close * 1.05)
    } else if fast < slow && close < fast {
        (SignalType::Sell, close * 0.95)
    } else {
        return None;
    };

    Some(StrategySignal {
        signal_type: side,
        entry: close,
        stop_loss: slow,
        take_profit,
        confidence: 75.0,
        indicators: {
            let mut map = Map::new();
            map.insert(format!("ma{}", rules.fast), json!(fast));
            map.insert(format!("ma{}", rules.slow), json!(slow));
            map.insert("price".to_string(), json!(close));
            map
        },
    })
}

fn support_resistance(
    data: &IndicatorSnapshot,
    rules: &SupportResistanceRules,
) -> Option<StrategySignal> {
    let (support, resistance, close) = (data.support, data.resistance, data.close);
    let threshold = (resistance - support) * rules.band_proximity;

    let (side, stop_loss, take_profit) = if (close - support).abs() < threshold {
        // Mean reversion off support
        (SignalType::Buy, support * 0.995, resistance)
    } else if (close - resistance).abs() < threshold {
        (SignalType::Sell, resistance * 1.005, support)
    } else {
        return None;
    };

    Some(StrategySignal {
        signal_type: side,
        entry: close,
        stop_loss,
        take_profit,
        confidence: 70.0,
        indicators: indicators(json!({
            "support": support,
            "resistance": resistance,
            "price": close,
        })),
    })
}
