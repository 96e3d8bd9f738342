// =============================================================================
// Higher Time Frame (HTF) Trend Analysis
// =============================================================================
//
// Reads the EMA stack and RSI of the slower "trend" timeframe and decides
// whether it supports a setup direction found on the entry timeframe.
//
// Decision rule:
//   long allowed  = trend EMA fast > EMA slow (AND RSI > 50 if required)
//   short allowed = trend EMA fast < EMA slow (AND RSI < 50 if required)

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::ema::last_ema;
use crate::indicators::rsi::calculate_rsi;
use crate::market_data::{closes, Candle};
use crate::runtime_config::{SetupParams, TrendFilter};
use crate::types::Direction;

/// Indicator snapshot of the trend timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtfAnalysis {
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    /// Direction of the EMA stack, `None` when the EMAs are equal.
    pub bias: Option<Direction>,
    /// `(fast - slow) / slow` in percent.
    pub ema_sep_pct: f64,
    pub candles: usize,
}

impl HtfAnalysis {
    /// Whether this trend reading supports `direction` under `filter`.
    pub fn permits(&self, direction: Direction, filter: &TrendFilter) -> bool {
        if self.bias != Some(direction) {
            return false;
        }
        if !filter.require_rsi_side {
            return true;
        }
        match direction {
            Direction::Long => self.rsi > 50.0,
            Direction::Short => self.rsi < 50.0,
        }
    }

    pub fn describe(&self) -> String {
        let trend = match self.bias {
            Some(Direction::Long) => "BULLISH",
            Some(Direction::Short) => "BEARISH",
            None => "FLAT",
        };
        format!(
            "{} (sep={:.3}%, RSI {:.1})",
            trend, self.ema_sep_pct, self.rsi
        )
    }
}

/// Analyse the trend timeframe with the same EMA/RSI periods as the entry
/// timeframe.
///
/// Returns `None` when the history is too short for any of the indicators.
pub fn analyze(candles: &[Candle], params: &SetupParams) -> Option<HtfAnalysis> {
    let closes = closes(candles);

    let ema_fast = last_ema(&closes, params.ema_fast);
    let ema_slow = last_ema(&closes, params.ema_slow);
    let rsi = calculate_rsi(&closes, params.rsi_period).and_then(|s| s.last());

    let (Some(ema_fast), Some(ema_slow), Some(rsi)) = (ema_fast, ema_slow, rsi) else {
        debug!(
            candles = candles.len(),
            need_ema = params.ema_slow,
            need_rsi = params.rsi_period + 1,
            "HTF analysis: insufficient data"
        );
        return None;
    };

    let bias = if ema_fast > ema_slow {
        Some(Direction::Long)
    } else if ema_fast < ema_slow {
        Some(Direction::Short)
    } else {
        None
    };

    let ema_sep_pct = if ema_slow.abs() > f64::EPSILON {
        ((ema_fast - ema_slow) / ema_slow) * 100.0
    } else {
        0.0
    };

    Some(HtfAnalysis {
        ema_fast,
        ema_slow,
        rsi,
        bias,
        ema_sep_pct,
        candles: candles.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                open_time: i as i64 * 3_600_000,
                open: c,
                high: c + 0.1,
                low: c - 0.1,
                close: c,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn rising_market_is_bullish() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 0.1).collect();
        let htf = analyze(&series(&closes), &SetupParams::default()).unwrap();
        assert_eq!(htf.bias, Some(Direction::Long));
        assert!(htf.ema_sep_pct > 0.0);
        assert!((htf.rsi - 100.0).abs() < 1e-9);
        assert!(htf.permits(Direction::Long, &TrendFilter::default()));
        assert!(!htf.permits(Direction::Short, &TrendFilter::default()));
    }

    #[test]
    fn falling_market_is_bearish() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 - i as f64 * 0.1).collect();
        let htf = analyze(&series(&closes), &SetupParams::default()).unwrap();
        assert_eq!(htf.bias, Some(Direction::Short));
        assert!(htf.permits(Direction::Short, &TrendFilter::default()));
        assert!(!htf.permits(Direction::Long, &TrendFilter::default()));
    }

    #[test]
    fn rsi_side_can_be_waived() {
        let htf = HtfAnalysis {
            ema_fast: 101.0,
            ema_slow: 100.0,
            rsi: 45.0,
            bias: Some(Direction::Long),
            ema_sep_pct: 1.0,
            candles: 100,
        };
        assert!(!htf.permits(Direction::Long, &TrendFilter { require_rsi_side: true }));
        assert!(htf.permits(Direction::Long, &TrendFilter { require_rsi_side: false }));
    }

    #[test]
    fn short_history_is_unavailable() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert!(analyze(&series(&closes), &SetupParams::default()).is_none());
    }
}
