// =============================================================================
// Price Precision
// =============================================================================
//
// Alert prices are rounded so that every asset keeps six significant digits:
// a 60 000 USDT coin shows two decimals, a 0.05 USDT coin shows seven.
// The number of decimals is clamped to [MIN_DECIMALS, MAX_DECIMALS].
// =============================================================================

/// Significant digits preserved by [`round_price`].
const SIGNIFICANT_DIGITS: i32 = 6;

const MIN_DECIMALS: i32 = 2;
const MAX_DECIMALS: i32 = 8;

/// Number of decimal places used to display `price`.
pub fn decimals_for(price: f64) -> u32 {
    if price == 0.0 || !price.is_finite() {
        return MIN_DECIMALS as u32;
    }
    let magnitude = price.abs().log10().floor() as i32;
    (SIGNIFICANT_DIGITS - magnitude - 1).clamp(MIN_DECIMALS, MAX_DECIMALS) as u32
}

/// Round `price` to the precision chosen by [`decimals_for`].
pub fn round_price(price: f64) -> f64 {
    if !price.is_finite() {
        return price;
    }
    let factor = 10f64.powi(decimals_for(price) as i32);
    (price * factor).round() / factor
}

/// Format `price` with exactly the decimals chosen by [`decimals_for`].
pub fn format_price(price: f64) -> String {
    format!("{:.*}", decimals_for(price) as usize, price)
}
