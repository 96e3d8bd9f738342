pub mod candle;
pub mod source;

pub use candle::{closes, drop_unclosed, Candle};
pub use source::{fetch_with_retry, CandleSource, FetchError, RetryPolicy};
