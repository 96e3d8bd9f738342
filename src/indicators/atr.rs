// =============================================================================
// Average True Range (ATR) — simple mean
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is the arithmetic mean of the most recent `period` TR values. Each TR
// needs the previous close, so `period + 1` candles are required.
// =============================================================================

use crate::market_data::Candle;

/// True range of a bar given the previous bar's close.
pub fn true_range(prev_close: f64, high: f64, low: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

/// Compute the most recent ATR value from a slice of candles (oldest first).
///
/// Returns `None` when `period` is zero, fewer than `period + 1` candles are
/// supplied, or the result is non-finite.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let recent = &candles[candles.len() - period - 1..];
    // f64::max swallows NaN, so reject non-finite bars up front.
    if recent
        .iter()
        .any(|c| !(c.high.is_finite() && c.low.is_finite() && c.close.is_finite()))
    {
        return None;
    }

    let sum: f64 = recent
        .windows(2)
        .map(|w| true_range(w[0].close, w[1].high, w[1].low))
        .sum();

    let atr = sum / period as f64;
    atr.is_finite().then_some(atr)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: 0,
            open,
            high,
            low,
            close,
            volume: 100.0,
        }
    }

    #[test]
    fn true_range_picks_largest_component() {
        assert_eq!(true_range(100.0, 105.0, 95.0), 10.0);
        // gap up
        assert_eq!(true_range(95.0, 115.0, 108.0), 20.0);
        // gap down
        assert_eq!(true_range(120.0, 110.0, 105.0), 15.0);
    }

    #[test]
    fn atr_period_zero() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 20];
        assert!(calculate_atr(&candles, 0).is_none());
    }

    #[test]
    fn atr_insufficient_data() {
        let candles = vec![candle(100.0, 105.0, 95.0, 102.0); 14];
        assert!(calculate_atr(&candles, 14).is_none());
    }

    #[test]
    fn atr_exact_minimum_data() {
        let candles = vec![
            candle(100.0, 102.0, 98.0, 101.0),
            candle(101.0, 104.0, 99.0, 103.0),
            candle(103.0, 106.0, 100.0, 105.0),
            candle(105.0, 108.0, 102.0, 107.0),
        ];
        // TRs: 5, 6, 6
        let atr = calculate_atr(&candles, 3).unwrap();
        assert!((atr - 17.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn atr_uses_only_the_last_period_ranges() {
        let mut candles = vec![candle(100.0, 150.0, 50.0, 100.0)];
        for _ in 0..20 {
            candles.push(candle(100.0, 101.0, 99.0, 100.0));
        }
        let atr = calculate_atr(&candles, 14).unwrap();
        assert!((atr - 2.0).abs() < 1e-10, "got {atr}");
    }

    #[test]
    fn atr_reflects_gap() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 95.0),
            candle(110.0, 115.0, 108.0, 112.0),
            candle(112.0, 118.0, 110.0, 115.0),
            candle(115.0, 120.0, 113.0, 118.0),
        ];
        // TRs: 20, 8, 7
        let atr = calculate_atr(&candles, 3).unwrap();
        assert!((atr - 35.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn atr_nan_returns_none() {
        let candles = vec![
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, f64::NAN, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
            candle(100.0, 105.0, 95.0, 100.0),
        ];
        assert!(calculate_atr(&candles, 3).is_none());
    }
}
