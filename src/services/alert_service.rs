use chrono::{DateTime, Utc};

use crate::models::{AlertEvent, AlertMessage, AlertState, Direction};
use crate::utils::{format_amount, format_optional, format_percent};

/// Outcome of evaluating one rule against one price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Inactive → Active, a notification must be sent
    Triggered,
    /// Condition still holds, notification already sent
    Suppressed,
    /// Active → Inactive, the rule is armed for the next crossing
    Rearmed,
    /// Condition does not hold and the rule was already armed
    Idle,
}

impl Evaluation {
    pub fn should_notify(&self) -> bool {
        matches!(self, Evaluation::Triggered)
    }
}

/// Evaluate `price` against the state's rule and apply the transition.
///
/// Non-finite prices leave the state untouched.
pub fn evaluate(state: &mut AlertState, price: f64, now: DateTime<Utc>) -> Evaluation {
    if !price.is_finite() {
        return Evaluation::Idle;
    }

    match (state.rule.holds(price), state.currently_active) {
        (true, false) => {
            state.currently_active = true;
            state.last_triggered_at = Some(now);
            Evaluation::Triggered
        }
        (true, true) => Evaluation::Suppressed,
        (false, true) => {
            state.currently_active = false;
            Evaluation::Rearmed
        }
        (false, false) => Evaluation::Idle,
    }
}

/// Render the notification text for an event
pub fn format_alert(event: &AlertEvent) -> AlertMessage {
    let rule = &event.rule;
    let currency = rule.currency.to_uppercase();
    let (movement, headline) = match rule.direction {
        Direction::Below => ("dropped to", "Price Drop"),
        Direction::Above => ("rose to", "Price Rise"),
    };

    let subject = format!("Crypto Alert: {} {}", rule.coin_id, headline);
    let body = format!(
        "Alert! {} price {} {} {} (threshold {} {})\n24h Change: {}\nMarket Cap: {}",
        rule.coin_id,
        movement,
        format_amount(event.price.price),
        currency,
        format_amount(rule.threshold_price),
        currency,
        format_percent(event.price.change_24h_pct),
        format_optional(event.price.market_cap),
    );

    AlertMessage { subject, body }
}
