use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::CommandResult;
use crate::api::coingecko::CoinGeckoClient;
use crate::config::{self, Settings};
use crate::models::{AlertRule, AlertState, Direction};
use crate::services::cache_service::PriceCache;
use crate::services::monitor_service::{self, MonitorOptions};
use crate::services::notify_service;
use crate::utils::ConfigError;

#[derive(Debug, Args)]
pub struct MonitorArgs {
    /// Coin ID (e.g., bitcoin)
    pub coin: Option<String>,

    /// Price threshold for alert
    #[arg(short, long, allow_negative_numbers = true)]
    pub threshold: Option<f64>,

    /// Currency for threshold
    #[arg(short, long, default_value = "usd")]
    pub currency: String,

    /// Alert when the price goes below or above the threshold
    #[arg(short, long, value_enum, default_value = "below")]
    pub direction: DirectionArg,

    /// JSON file with additional alert rules
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Seconds between checks (default: CHECK_INTERVAL_SECS)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Reuse cached prices up to this many seconds old (default: CACHE_MAX_AGE_SECS)
    #[arg(long)]
    pub max_age: Option<u64>,

    /// Run a single check and exit
    #[arg(long)]
    pub once: bool,
}

/// Command-line spelling of [`Direction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Below,
    Above,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Below => Direction::Below,
            DirectionArg::Above => Direction::Above,
        }
    }
}

pub async fn execute(settings: &Settings, args: &MonitorArgs) -> CommandResult {
    info!("Monitor command called with args: {:?}", args);

    let rules = build_rules(args)?;
    let mut states: Vec<AlertState> = rules.into_iter().map(AlertState::new).collect();
    for state in &states {
        info!("Watching {}", state.rule);
    }

    let options = MonitorOptions {
        interval: args
            .interval
            .map(Duration::from_secs)
            .unwrap_or(settings.check_interval)
            .max(Duration::from_secs(1)),
        max_age: args
            .max_age
            .map(Duration::from_secs)
            .unwrap_or(settings.cache_max_age),
        once: args.once,
    };

    let client = CoinGeckoClient::from_settings(settings)?;
    let mut cache = PriceCache::open(client, &settings.cache_path);
    let notifier = notify_service::build_notifier(settings)?;

    let report =
        monitor_service::run_monitor(&mut cache, &mut states, notifier.as_ref(), &options).await;

    // A single check reports its failures through the exit status
    if options.once {
        if let Some((_, e)) = report.notify_failures.into_iter().next() {
            return Err(e.into());
        }
        if let Some((_, e)) = report.fetch_failures.into_iter().next() {
            return Err(e.into());
        }
    }
    Ok(())
}

/// Combine the rules file with the rule given on the command line
pub fn build_rules(args: &MonitorArgs) -> Result<Vec<AlertRule>, ConfigError> {
    let mut rules = match &args.rules {
        Some(path) => config::load_rules(path)?,
        None => Vec::new(),
    };

    match (&args.coin, args.threshold) {
        (Some(coin), Some(threshold)) => {
            let rule = AlertRule {
                coin_id: coin.clone(),
                currency: args.currency.clone(),
                threshold_price: threshold,
                direction: args.direction.into(),
            };
            config::validate_rule(&rule).map_err(|reason| ConfigError::InvalidRule {
                index: rules.len(),
                reason,
            })?;
            rules.push(rule);
        }
        (Some(coin), None) => {
            return Err(ConfigError::Usage(format!(
                "--threshold is required to monitor {}",
                coin
            )));
        }
        (None, Some(_)) => {
            return Err(ConfigError::Usage(
                "--threshold given without a coin".to_string(),
            ));
        }
        (None, None) => {}
    }

    if rules.is_empty() {
        return Err(ConfigError::Usage(
            "Nothing to monitor: pass a coin with --threshold or a --rules file".to_string(),
        ));
    }
    Ok(rules)
}
