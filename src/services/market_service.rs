use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::api::coingecko::{ApiError, CoinGeckoClient, MarketCoin, SimplePriceResponse};
use crate::api::PriceSource;
use crate::models::{CachedPrice, Freshness, MarketRow, PriceData, QueryKey};
use crate::services::cache_service::PriceCache;
use crate::utils::{format_amount, format_optional, format_percent, FetchError, Table};

/// Fetch the top `limit` coins by market cap, priced in every currency.
///
/// The first currency comes from the markets listing itself; each further
/// currency costs one /simple/price call for all listed ids.
pub async fn top_coins(
    client: &CoinGeckoClient,
    limit: u32,
    currencies: &[String],
) -> Result<Vec<MarketRow>, ApiError> {
    let currencies = normalize_currencies(currencies);
    let primary = &currencies[0];

    let coins = client.coins_markets(primary, limit, None).await?;
    let mut rows: Vec<MarketRow> = coins
        .into_iter()
        .map(|coin| market_row(coin, primary))
        .collect();

    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
    for currency in &currencies[1..] {
        let prices = client.simple_price(&ids, std::slice::from_ref(currency)).await?;
        merge_prices(&mut rows, currency, &prices);
    }

    debug!("Loaded {} market row(s) in {:?}", rows.len(), currencies);
    Ok(rows)
}

/// Lowercased, de-duplicated currencies; `usd` when none are given
pub fn normalize_currencies(currencies: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for currency in currencies {
        let currency = currency.trim().to_lowercase();
        if !currency.is_empty() && !out.contains(&currency) {
            out.push(currency);
        }
    }
    if out.is_empty() {
        out.push("usd".to_string());
    }
    out
}

fn market_row(coin: MarketCoin, currency: &str) -> MarketRow {
    MarketRow {
        id: coin.id,
        name: coin.name,
        symbol: coin.symbol.to_uppercase(),
        rank: coin.market_cap_rank,
        prices: vec![(currency.to_string(), coin.current_price)],
        market_cap: coin.market_cap,
        volume_24h: coin.total_volume,
        change_24h_pct: coin.price_change_percentage_24h,
    }
}

/// Add `currency` prices from a /simple/price response; missing coins get `None`
pub fn merge_prices(rows: &mut [MarketRow], currency: &str, prices: &SimplePriceResponse) {
    for row in rows.iter_mut() {
        let price = prices
            .get(&row.id)
            .and_then(|quote| quote.get(currency))
            .copied()
            .flatten();
        row.prices.push((currency.to_string(), price));
    }
}

/// Store every known listing price in the cache. Market cap and 24h data are
/// only attached for the listing's primary currency.
pub fn warm_cache<S: PriceSource>(
    cache: &mut PriceCache<S>,
    rows: &[MarketRow],
    now: DateTime<Utc>,
) -> usize {
    let mut recorded = 0;
    for row in rows {
        for (position, (currency, price)) in row.prices.iter().enumerate() {
            let Some(price) = price.filter(|p| p.is_finite() && *p >= 0.0) else {
                continue;
            };
            let value = if position == 0 {
                PriceData {
                    price,
                    market_cap: row.market_cap,
                    volume_24h: row.volume_24h,
                    change_24h_pct: row.change_24h_pct,
                    last_updated_at: None,
                }
            } else {
                PriceData::from_price(price)
            };
            cache.record(&QueryKey::new(&row.id, currency), value, now);
            recorded += 1;
        }
    }

    if let Err(e) = cache.save() {
        warn!("Failed to persist price cache: {}", e);
    }
    recorded
}

/// Render the top listing as a grid table
pub fn render_market_table(rows: &[MarketRow], currencies: &[String]) -> String {
    let mut headers = vec!["Rank".to_string(), "Name".to_string(), "Symbol".to_string()];
    headers.extend(currencies.iter().map(|c| c.to_uppercase()));
    headers.push("24h %".to_string());

    let mut table = Table::new(&headers);
    for row in rows {
        let mut cells = vec![
            row.rank.map(|r| r.to_string()).unwrap_or_else(|| "N/A".to_string()),
            row.name.clone(),
            row.symbol.clone(),
        ];
        cells.extend(currencies.iter().map(|c| format_optional(row.price_in(c))));
        cells.push(format_percent(row.change_24h_pct));
        table.add_row(cells);
    }

    table.render()
}

/// Look up one coin in several currencies through the cache
pub async fn lookup_prices<S: PriceSource>(
    cache: &mut PriceCache<S>,
    coin_id: &str,
    currencies: &[String],
    max_age: Duration,
    now: DateTime<Utc>,
) -> Vec<(QueryKey, Result<CachedPrice, FetchError>)> {
    let mut results = Vec::new();
    for currency in normalize_currencies(currencies) {
        let key = QueryKey::new(coin_id, &currency);
        let result = cache.get(&key, max_age, now).await;
        results.push((key, result));
    }
    results
}

/// Render price lookups as a grid table, marking stale values
pub fn render_price_table(results: &[(QueryKey, Result<CachedPrice, FetchError>)]) -> String {
    let mut table = Table::new(&["Coin", "Currency", "Price", "Market Cap", "24h %", "Source"]);
    for (key, result) in results {
        let cells = match result {
            Ok(cached) => {
                let value = &cached.entry.value;
                vec![
                    key.coin_id.clone(),
                    key.currency.to_uppercase(),
                    format_amount(value.price),
                    format_optional(value.market_cap),
                    format_percent(value.change_24h_pct),
                    describe_freshness(&cached.freshness),
                ]
            }
            Err(e) => vec![
                key.coin_id.clone(),
                key.currency.to_uppercase(),
                "N/A".to_string(),
                "N/A".to_string(),
                "N/A".to_string(),
                format!("error: {}", e),
            ],
        };
        table.add_row(cells);
    }
    table.render()
}

fn describe_freshness(freshness: &Freshness) -> String {
    match freshness {
        Freshness::Fresh => "cache".to_string(),
        Freshness::Refreshed => "live".to_string(),
        Freshness::Stale { age } => format!("STALE ({}s old)", age.as_secs()),
    }
}
