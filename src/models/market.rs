//! Market listing models

/// One row of the top-coins listing
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRow {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub rank: Option<u32>,
    /// Price per requested currency, in request order
    pub prices: Vec<(String, Option<f64>)>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub change_24h_pct: Option<f64>,
}

impl MarketRow {
    pub fn price_in(&self, currency: &str) -> Option<f64> {
        self.prices
            .iter()
            .find(|(c, _)| c == currency)
            .and_then(|(_, p)| *p)
    }
}
