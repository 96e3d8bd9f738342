// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the setup
// engine. Every public function returns `Option<T>` so callers are forced to
// treat insufficient history as "no setup this cycle" instead of reading a
// placeholder number.

pub mod atr;
pub mod ema;
pub mod rsi;
pub mod series;
pub mod swing;

pub use series::IndicatorSeries;
