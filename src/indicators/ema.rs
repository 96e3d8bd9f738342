// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = value_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period`
// values, so the series is defined from input index `period - 1` onwards.
// =============================================================================

use super::IndicatorSeries;

/// Compute the EMA series for `values` and look-back `period`.
///
/// Returns `None` when `period` is zero, the input is shorter than `period`,
/// or the seed is non-finite. A non-finite value later in the input truncates
/// the series at that point.
pub fn calculate_ema(values: &[f64], period: usize) -> Option<IndicatorSeries> {
    if period == 0 || values.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    let sma: f64 = values[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return None;
    }

    let mut result = Vec::with_capacity(values.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &value in &values[period..] {
        let ema = value * multiplier + prev_ema * (1.0 - multiplier);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    Some(IndicatorSeries::new(result, period - 1))
}

/// Most recent EMA value, or `None` when it is unavailable.
pub fn last_ema(values: &[f64], period: usize) -> Option<f64> {
    calculate_ema(values, period)?.last()
}
