//! Alert rule and state models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::price::{PriceData, QueryKey};

/// Which side of the threshold fires the alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Fires when the price drops under the threshold
    Below,
    /// Fires when the price rises over the threshold
    Above,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Below => write!(f, "below"),
            Direction::Above => write!(f, "above"),
        }
    }
}

/// A user-defined price threshold, immutable once loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub coin_id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub threshold_price: f64,
    #[serde(default = "default_direction")]
    pub direction: Direction,
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_direction() -> Direction {
    Direction::Below
}

impl AlertRule {
    pub fn query_key(&self) -> QueryKey {
        QueryKey::new(&self.coin_id, &self.currency)
    }

    /// Strict comparison: a price equal to the threshold never fires
    pub fn holds(&self, price: f64) -> bool {
        match self.direction {
            Direction::Below => price < self.threshold_price,
            Direction::Above => price > self.threshold_price,
        }
    }
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.coin_id,
            self.direction,
            self.threshold_price,
            self.currency.to_uppercase()
        )
    }
}

/// Per-rule trigger state, owned by the monitor and mutated by the evaluator
#[derive(Debug, Clone, PartialEq)]
pub struct AlertState {
    pub rule: AlertRule,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub currently_active: bool,
}

impl AlertState {
    pub fn new(rule: AlertRule) -> Self {
        Self {
            rule,
            last_triggered_at: None,
            currently_active: false,
        }
    }
}

/// Notify event emitted when a rule goes from inactive to active
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub id: Uuid,
    pub rule: AlertRule,
    pub price: PriceData,
    pub triggered_at: DateTime<Utc>,
}

/// Rendered notification text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}
