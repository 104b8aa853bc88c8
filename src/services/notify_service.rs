use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client as HttpClient;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::models::{AlertEvent, Direction};
use crate::services::alert_service::format_alert;
use crate::utils::NotifyError;

/// Delivery channel for alert events. Implementations do not retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<(), NotifyError>;
}

/// Writes alerts to stdout and the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let message = format_alert(event);
        warn!("{} [{}]", message.subject, event.id);
        println!("{}\n{}\n", message.subject, message.body);
        Ok(())
    }
}

/// JSON body posted to the alert webhook
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    id: Uuid,
    subject: &'a str,
    body: &'a str,
    coin_id: &'a str,
    currency: &'a str,
    direction: Direction,
    threshold_price: f64,
    price: f64,
    triggered_at: DateTime<Utc>,
}

/// Posts alerts as JSON to an HTTP endpoint
pub struct WebhookNotifier {
    http_client: HttpClient,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, http_client: HttpClient) -> Self {
        Self { http_client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let message = format_alert(event);
        let payload = WebhookPayload {
            id: event.id,
            subject: &message.subject,
            body: &message.body,
            coin_id: &event.rule.coin_id,
            currency: &event.rule.currency,
            direction: event.rule.direction,
            threshold_price: event.rule.threshold_price,
            price: event.price.price,
            triggered_at: event.triggered_at,
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Alert {} delivered to webhook", event.id);
        Ok(())
    }
}

/// Pick the notifier the settings ask for
pub fn build_notifier(settings: &Settings) -> Result<Box<dyn Notifier>, NotifyError> {
    match &settings.webhook_url {
        Some(url) => {
            let http_client = HttpClient::builder()
                .timeout(settings.http_timeout)
                .build()
                .map_err(|e| NotifyError::Transport(e.to_string()))?;
            info!("Alerts will be posted to {}", url);
            Ok(Box::new(WebhookNotifier::new(url.clone(), http_client)))
        }
        None => {
            info!("ALERT_WEBHOOK_URL not set, alerts will be printed only");
            Ok(Box::new(LogNotifier))
        }
    }
}
