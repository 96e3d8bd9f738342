// =============================================================================
// Shared test fixtures
// =============================================================================

use crate::market_data::Candle;

pub const BAR_MS: i64 = 900_000;

/// Candles whose open is the previous close and whose wicks extend 0.05
/// beyond the body.
pub fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
    let mut prev = closes[0];
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = prev;
            prev = close;
            Candle {
                open_time: i as i64 * BAR_MS,
                open,
                high: open.max(close) + 0.05,
                low: open.min(close) - 0.05,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

/// 15m uptrend from 100 to 111.5, a pullback to 109.1, then a bounce that
/// closes at 110. Last two RSI values are ~35.0 and ~44.9, EMA20 ~110.27,
/// EMA50 ~109.89, swing low of the last 10 candles 109.05.
pub fn pullback_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..170)
        .map(|i| 100.0 + 11.5 * i as f64 / 169.0)
        .collect();
    closes.extend((0..8).map(|i| 111.5 - 0.3 * (i + 1) as f64));
    closes.push(109.55);
    closes.push(110.0);
    closes
}

/// Price mirror around 110, turning the long fixture into a short one.
pub fn mirrored(closes: &[f64]) -> Vec<f64> {
    closes.iter().map(|c| 220.0 - c).collect()
}
