// =============================================================================
// Candle Source — exchange-agnostic contract plus bounded retries
// =============================================================================
//
// The scanner only needs "give me the last N candles for this symbol and
// interval, oldest first". Failures are classified so that transient faults
// (network, timeouts, rate limiting, 5xx) are retried a bounded number of
// times while permanent ones (malformed payloads, rejected requests) fail the
// symbol for the current cycle immediately.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::Candle;
use crate::types::Interval;

/// Classified failure of a candle fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by exchange: {0}")]
    RateLimited(String),

    #[error("exchange server error: {0}")]
    Server(String),

    #[error("request rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether the failure is worth retrying within the same cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) | Self::Server(_)
        )
    }
}

/// Supplier of ordered OHLCV candles.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch up to `limit` most recent candles, ordered oldest to newest.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError>;
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> Vec<u64> {
    vec![2000, 2000]
}

fn default_timeout_secs() -> u64 {
    12
}

/// Bounded retry schedule applied to every candle fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per fetch, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sleep before retry `n` is `backoff_ms[n - 1]`; the last entry repeats.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: Vec<u64>,

    /// Upper bound for a single attempt.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let idx = (attempt.max(1) - 1) as usize;
        let ms = self
            .backoff_ms
            .get(idx)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Fetch candles through `source`, retrying transient failures according to
/// `policy`. Permanent failures and the last transient failure are returned
/// to the caller.
pub async fn fetch_with_retry(
    source: &dyn CandleSource,
    symbol: &str,
    interval: Interval,
    limit: usize,
    policy: &RetryPolicy,
) -> Result<Vec<Candle>, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let timeout = policy.attempt_timeout();
    let mut attempt = 1;

    loop {
        let result = match tokio::time::timeout(
            timeout,
            source.fetch_candles(symbol, interval, limit),
        )
        .await
        {
            Ok(inner) => inner,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        match result {
            Ok(candles) => return Ok(candles),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    symbol,
                    %interval,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "candle fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
