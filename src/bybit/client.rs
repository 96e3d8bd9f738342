// =============================================================================
// Bybit v5 Public Market Data Client
// =============================================================================
//
// Only the public kline endpoint is used, so no API key or request signing is
// involved. Bybit answers HTTP 200 for most application errors and reports
// them through `retCode`; both layers are mapped onto `FetchError` so the
// scanner can tell retryable faults from permanent ones.
//
// Kline rows arrive newest first as arrays of strings:
//   [0] startTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
//   [6] turnover
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument};

use crate::market_data::{Candle, CandleSource, FetchError};
use crate::types::Interval;

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";

/// Largest `limit` accepted by `/v5/market/kline`.
const MAX_KLINE_LIMIT: usize = 1000;

/// `retCode` values that indicate a temporary condition on Bybit's side.
const RET_CODE_RATE_LIMITED: i64 = 10006;
const RET_CODE_SERVER_TIMEOUT: i64 = 10000;
const RET_CODE_SERVER_ERROR: i64 = 10016;

/// Public REST client for Bybit linear-perpetual candles.
#[derive(Clone)]
pub struct BybitClient {
    base_url: String,
    category: String,
    client: reqwest::Client,
}

impl BybitClient {
    /// Create a client against the production endpoint.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// Create a client against an arbitrary base URL (testnet, proxy).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into();
        debug!(%base_url, "BybitClient initialised");

        Ok(Self {
            base_url,
            category: "linear".to_string(),
            client,
        })
    }

    /// GET /v5/market/kline (public).
    #[instrument(skip(self), name = "bybit::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let limit = limit.clamp(1, MAX_KLINE_LIMIT).to_string();
        let url = format!("{}/v5/market/kline", self.base_url);

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("category", self.category.as_str()),
                ("symbol", symbol),
                ("interval", interval.bybit_code()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        // A body cut short is a transport fault; only the decode is Malformed.
        let bytes = resp.bytes().await.map_err(classify_transport_error)?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| FetchError::Malformed(format!("kline body is not JSON: {e}")))?;

        let candles = parse_kline_response(&body)?;
        debug!(symbol, %interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

#[async_trait]
impl CandleSource for BybitClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        self.get_klines(symbol, interval, limit).await
    }
}

impl std::fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitClient")
            .field("base_url", &self.base_url)
            .field("category", &self.category)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Response handling
// -----------------------------------------------------------------------------

fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Network(format!("request timed out: {e}"))
    } else {
        FetchError::Network(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchError {
    let snippet: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::RateLimited(format!("HTTP {status}: {snippet}"))
    } else if status.is_server_error() {
        FetchError::Server(format!("HTTP {status}: {snippet}"))
    } else {
        FetchError::Rejected {
            code: i64::from(status.as_u16()),
            message: snippet,
        }
    }
}

/// Convert a `/v5/market/kline` JSON body into candles ordered oldest first.
pub fn parse_kline_response(body: &serde_json::Value) -> Result<Vec<Candle>, FetchError> {
    let ret_code = body["retCode"]
        .as_i64()
        .ok_or_else(|| FetchError::Malformed("missing retCode".into()))?;

    if ret_code != 0 {
        let message = body["retMsg"].as_str().unwrap_or_default().to_string();
        return Err(match ret_code {
            RET_CODE_RATE_LIMITED => FetchError::RateLimited(message),
            RET_CODE_SERVER_TIMEOUT | RET_CODE_SERVER_ERROR => {
                FetchError::Server(format!("retCode {ret_code}: {message}"))
            }
            code => FetchError::Rejected { code, message },
        });
    }

    let rows = body["result"]["list"]
        .as_array()
        .ok_or_else(|| FetchError::Malformed("result.list is not an array".into()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows.iter().rev() {
        let candle = parse_row(row)?;
        if !candle.is_well_formed() {
            return Err(FetchError::Malformed(format!(
                "inconsistent kline at {}",
                candle.open_time
            )));
        }
        candles.push(candle);
    }

    if candles.windows(2).any(|w| w[0].open_time >= w[1].open_time) {
        return Err(FetchError::Malformed(
            "kline open times are not strictly increasing".into(),
        ));
    }

    Ok(candles)
}

fn parse_row(row: &serde_json::Value) -> Result<Candle, FetchError> {
    let arr = row
        .as_array()
        .ok_or_else(|| FetchError::Malformed("kline entry is not an array".into()))?;

    if arr.len() < 6 {
        return Err(FetchError::Malformed(format!(
            "kline entry has {} elements, expected at least 6",
            arr.len()
        )));
    }

    Ok(Candle {
        open_time: parse_i64(&arr[0], "startTime")?,
        open: parse_f64(&arr[1], "open")?,
        high: parse_f64(&arr[2], "high")?,
        low: parse_f64(&arr[3], "low")?,
        close: parse_f64(&arr[4], "close")?,
        volume: parse_f64(&arr[5], "volume")?,
    })
}

/// Bybit sends numbers as JSON strings; accept plain numbers as well.
fn parse_f64(val: &serde_json::Value, name: &str) -> Result<f64, FetchError> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| FetchError::Malformed(format!("failed to parse {name} '{s}' as f64"))),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FetchError::Malformed(format!("{name} is not a valid f64"))),
        _ => Err(FetchError::Malformed(format!("{name} has unexpected JSON type"))),
    }
}

fn parse_i64(val: &serde_json::Value, name: &str) -> Result<i64, FetchError> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| FetchError::Malformed(format!("failed to parse {name} '{s}' as i64"))),
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| FetchError::Malformed(format!("{name} is not a valid i64"))),
        _ => Err(FetchError::Malformed(format!("{name} has unexpected JSON type"))),
    }
}
