pub mod coingecko;

use async_trait::async_trait;

use crate::models::{PriceData, QueryKey};
use crate::utils::FetchError;

/// Upstream source of spot prices, consulted by the cache on a miss or stale entry
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, key: &QueryKey) -> Result<PriceData, FetchError>;
}
