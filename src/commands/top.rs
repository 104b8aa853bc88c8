use chrono::Utc;
use clap::Args;
use tracing::info;

use super::CommandResult;
use crate::api::coingecko::CoinGeckoClient;
use crate::config::Settings;
use crate::services::cache_service::PriceCache;
use crate::services::market_service;

#[derive(Debug, Args)]
pub struct TopArgs {
    /// Number of coins to display
    #[arg(short = 'n', long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=250))]
    pub number: u32,

    /// Currencies to display
    #[arg(short, long, num_args = 1.., default_value = "usd")]
    pub currencies: Vec<String>,
}

pub async fn execute(settings: &Settings, args: &TopArgs) -> CommandResult {
    info!("Top command called with args: {:?}", args);

    let currencies = market_service::normalize_currencies(&args.currencies);
    let client = CoinGeckoClient::from_settings(settings)?;
    let mut cache = PriceCache::open(client, &settings.cache_path);

    let rows = market_service::top_coins(cache.source(), args.number, &currencies).await?;
    if rows.is_empty() {
        println!("No data available");
        return Ok(());
    }

    let recorded = market_service::warm_cache(&mut cache, &rows, Utc::now());
    info!("Cached {} price(s) from market listing", recorded);

    println!("{}", market_service::render_market_table(&rows, &currencies));
    Ok(())
}
