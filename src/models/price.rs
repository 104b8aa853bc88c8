//! Price and cache models

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies a cached price: a coin id quoted in a target currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
    pub coin_id: String,
    pub currency: String,
}

impl QueryKey {
    /// Both parts are trimmed and lowercased, matching CoinGecko ids
    pub fn new(coin_id: &str, currency: &str) -> Self {
        Self {
            coin_id: coin_id.trim().to_lowercase(),
            currency: currency.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.coin_id, self.currency)
    }
}

/// Market data for one coin in one currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceData {
    pub price: f64,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume_24h: Option<f64>,
    #[serde(default)]
    pub change_24h_pct: Option<f64>,
    /// Upstream timestamp of the quote, when the source reports one
    #[serde(default)]
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl PriceData {
    pub fn from_price(price: f64) -> Self {
        Self {
            price,
            market_cap: None,
            volume_24h: None,
            change_24h_pct: None,
            last_updated_at: None,
        }
    }
}

/// The last successful fetch for a key. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub value: PriceData,
    pub fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Age of the entry at `now`; zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_fresh(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) <= max_age
    }
}

/// How a cached lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from cache within max age
    Fresh,
    /// Fetched from the price source during this lookup
    Refreshed,
    /// Source failed; served an entry older than max age
    Stale { age: Duration },
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPrice {
    pub entry: CacheEntry,
    pub freshness: Freshness,
}

impl CachedPrice {
    pub fn is_stale(&self) -> bool {
        matches!(self.freshness, Freshness::Stale { .. })
    }

    pub fn price(&self) -> f64 {
        self.entry.value.price
    }
}
