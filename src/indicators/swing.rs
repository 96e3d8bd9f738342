// =============================================================================
// Swing Extremes
// =============================================================================
//
// The swing low (high) is the lowest low (highest high) over the most recent
// `lookback` candles. It is the structural reference for swing-based stops.
// =============================================================================

use crate::market_data::Candle;

/// Lowest low over the last `lookback` candles.
///
/// Returns `None` when `lookback` is zero or fewer candles are available.
pub fn swing_low(candles: &[Candle], lookback: usize) -> Option<f64> {
    window(candles, lookback)?
        .iter()
        .map(|c| c.low)
        .reduce(f64::min)
}

/// Highest high over the last `lookback` candles.
pub fn swing_high(candles: &[Candle], lookback: usize) -> Option<f64> {
    window(candles, lookback)?
        .iter()
        .map(|c| c.high)
        .reduce(f64::max)
}

fn window(candles: &[Candle], lookback: usize) -> Option<&[Candle]> {
    if lookback == 0 || candles.len() < lookback {
        return None;
    }
    Some(&candles[candles.len() - lookback..])
}
