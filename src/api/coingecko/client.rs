use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::models::{ApiError, ErrorResponse, MarketCoin, SimplePriceResponse};
use crate::api::PriceSource;
use crate::config::Settings;
use crate::models::{PriceData, QueryKey};
use crate::utils::{FetchError, RateLimiter};

/// CoinGecko public API client
pub struct CoinGeckoClient {
    http_client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl CoinGeckoClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.coingecko.com/api/v3";

    /// Create a client from loaded settings
    pub fn from_settings(settings: &Settings) -> Result<Self, ApiError> {
        Self::with_base_url(
            settings.api_url.clone(),
            settings.api_key.clone(),
            settings.http_timeout,
            settings.rate_limit_per_minute,
        )
    }

    /// Create a client against a custom base URL (self-hosted proxies, testing)
    pub fn with_base_url(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        requests_per_minute: usize,
    ) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("coinwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::RequestError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            limiter: RateLimiter::per_minute(requests_per_minute),
        })
    }

    /// Create default headers, with the demo API key when configured
    fn create_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| ApiError::RequestError(format!("Invalid API key header: {}", e)))?;
            headers.insert("x-cg-demo-api-key", value);
        }

        Ok(headers)
    }

    /// Parse error response based on HTTP status code
    async fn handle_error_response(
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> ApiError {
        let status_code = status.as_u16();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body_text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body_text)
            .ok()
            .and_then(|e| e.message().map(str::to_string))
            .unwrap_or(body_text);

        match status_code {
            400 => ApiError::BadRequest(message),
            401 | 403 => ApiError::Unauthorized(message),
            404 => ApiError::NotFound(message),
            429 => {
                warn!(
                    "CoinGecko rate limited us, retry after {:?} s",
                    retry_after_secs
                );
                ApiError::RateLimited { retry_after_secs }
            }
            500..=599 => {
                warn!("CoinGecko server error {}: {}", status_code, message);
                ApiError::ServerError(status_code, message)
            }
            _ => ApiError::HttpError(status_code, message),
        }
    }

    /// Rate-limited GET returning a decoded JSON body
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let headers = self.create_headers()?;

        self.limiter.acquire().await;
        debug!("GET {} {:?}", url, query);

        let response = self
            .http_client
            .get(&url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::Timeout
                } else {
                    ApiError::RequestError(format!("Request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Self::handle_error_response(status, response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::DeserializationError(format!("Failed to parse response: {}", e)))
    }

    /// GET /simple/price
    ///
    /// Spot prices for every id in every currency, including market cap,
    /// 24h volume, 24h change and the upstream update time.
    pub async fn simple_price(
        &self,
        ids: &[String],
        vs_currencies: &[String],
    ) -> Result<SimplePriceResponse, ApiError> {
        if ids.is_empty() || vs_currencies.is_empty() {
            return Ok(SimplePriceResponse::new());
        }

        let query = [
            ("ids", ids.join(",")),
            ("vs_currencies", vs_currencies.join(",")),
            ("include_market_cap", "true".to_string()),
            ("include_24hr_vol", "true".to_string()),
            ("include_24hr_change", "true".to_string()),
            ("include_last_updated_at", "true".to_string()),
        ];

        self.get_json("simple/price", &query).await
    }

    /// GET /coins/markets
    ///
    /// Coins ordered by market cap, first page only. `ids` narrows the listing
    /// to specific coins.
    pub async fn coins_markets(
        &self,
        vs_currency: &str,
        per_page: u32,
        ids: Option<&[String]>,
    ) -> Result<Vec<MarketCoin>, ApiError> {
        let mut query = vec![
            ("vs_currency", vs_currency.to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "24h".to_string()),
        ];
        if let Some(ids) = ids {
            query.push(("ids", ids.join(",")));
        }

        self.get_json("coins/markets", &query).await
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_price(&self, key: &QueryKey) -> Result<PriceData, FetchError> {
        let response = self
            .simple_price(
                std::slice::from_ref(&key.coin_id),
                std::slice::from_ref(&key.currency),
            )
            .await?;
        price_from_simple(&response, key)
    }
}

/// Extract one coin/currency quote from a /simple/price response
pub fn price_from_simple(
    response: &SimplePriceResponse,
    key: &QueryKey,
) -> Result<PriceData, FetchError> {
    let malformed = |reason: &str| FetchError::Malformed {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let coin = response
        .get(&key.coin_id)
        .ok_or_else(|| malformed("coin missing from response"))?;

    let price = coin
        .get(&key.currency)
        .copied()
        .flatten()
        .ok_or_else(|| malformed("no price for currency"))?;

    if !price.is_finite() || price < 0.0 {
        return Err(malformed("price is not a valid amount"));
    }

    let field = |suffix: &str| {
        coin.get(&format!("{}_{}", key.currency, suffix))
            .copied()
            .flatten()
    };

    Ok(PriceData {
        price,
        market_cap: field("market_cap"),
        volume_24h: field("24h_vol"),
        change_24h_pct: field("24h_change"),
        last_updated_at: coin
            .get("last_updated_at")
            .copied()
            .flatten()
            .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single()),
    })
}
