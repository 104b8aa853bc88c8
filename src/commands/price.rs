use chrono::Utc;
use clap::Args;
use std::time::Duration;
use tracing::info;

use super::CommandResult;
use crate::api::coingecko::CoinGeckoClient;
use crate::config::Settings;
use crate::services::cache_service::PriceCache;
use crate::services::market_service;

#[derive(Debug, Args)]
pub struct PriceArgs {
    /// Coin ID (e.g., bitcoin)
    pub coin: String,

    /// Currencies to quote in
    #[arg(short, long, num_args = 1.., default_value = "usd")]
    pub currencies: Vec<String>,

    /// Reuse cached prices up to this many seconds old (default: CACHE_MAX_AGE_SECS)
    #[arg(long)]
    pub max_age: Option<u64>,
}

pub async fn execute(settings: &Settings, args: &PriceArgs) -> CommandResult {
    info!("Price command called with args: {:?}", args);

    let max_age = args
        .max_age
        .map(Duration::from_secs)
        .unwrap_or(settings.cache_max_age);
    let client = CoinGeckoClient::from_settings(settings)?;
    let mut cache = PriceCache::open(client, &settings.cache_path);

    let results =
        market_service::lookup_prices(&mut cache, &args.coin, &args.currencies, max_age, Utc::now())
            .await;

    println!("{}", market_service::render_price_table(&results));

    // Only fail when nothing could be shown at all
    if results.iter().all(|(_, r)| r.is_err()) {
        if let Some((_, Err(e))) = results.into_iter().next() {
            return Err(e.into());
        }
    }
    Ok(())
}
