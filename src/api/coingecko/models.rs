use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response from GET /simple/price
///
/// Shaped like `{ "bitcoin": { "usd": 50000.0, "usd_market_cap": ..., "last_updated_at": ... } }`.
/// Values may be `null` for coins CoinGecko has no data for.
pub type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

/// One entry of GET /coins/markets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCoin {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub total_volume: Option<f64>,
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Error body returned by CoinGecko on 4xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: Option<String>,
    pub status: Option<ErrorStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorStatus {
    pub error_message: Option<String>,
}

impl ErrorResponse {
    pub fn message(&self) -> Option<&str> {
        self.error.as_deref().or_else(|| {
            self.status
                .as_ref()
                .and_then(|s| s.error_message.as_deref())
        })
    }
}

/// Comprehensive error type for CoinGecko API operations
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// 400 Bad Request
    #[error("Bad Request: {0}")]
    BadRequest(String),
    /// 401/403, missing or invalid API key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    /// 404 Not Found
    #[error("Not Found: {0}")]
    NotFound(String),
    /// 429 Too Many Requests
    #[error("Rate Limited. Retry after {}", retry_hint(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },
    /// 5xx Server Error
    #[error("Server Error ({0}): {1}")]
    ServerError(u16, String),
    /// Other HTTP errors
    #[error("HTTP Error ({0}): {1}")]
    HttpError(u16, String),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Network/request error
    #[error("Request Error: {0}")]
    RequestError(String),
    /// Deserialization error
    #[error("Deserialization Error: {0}")]
    DeserializationError(String),
}

fn retry_hint(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!("{} s", secs),
        None => "an unknown delay".to_string(),
    }
}
