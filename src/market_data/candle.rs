use serde::{Deserialize, Serialize};

use crate::types::Interval;

/// A single OHLCV candle as returned by the exchange kline endpoint.
///
/// Series are always ordered oldest first and `open_time` is unique within a
/// series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Candle start time in epoch milliseconds.
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Whether the OHLC values are finite, positive and internally
    /// consistent (`high >= max(open, close) >= min(open, close) >= low`).
    pub fn is_well_formed(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return false;
        }
        self.high >= self.open.max(self.close) && self.open.min(self.close) >= self.low
    }
}

/// Extract the close prices of `candles`, preserving order.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Remove a trailing candle that is still forming at `now_ms`. Exchanges
/// return the current bar as the newest row; it closes at
/// `open_time + interval`.
pub fn drop_unclosed(candles: &mut Vec<Candle>, interval: Interval, now_ms: i64) {
    if candles
        .last()
        .is_some_and(|c| c.open_time + interval.duration_ms() > now_ms)
    {
        candles.pop();
    }
}
