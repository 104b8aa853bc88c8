pub mod monitor;
pub mod price;
pub mod top;

use clap::{Parser, Subcommand};

use crate::config::Settings;

pub type CommandResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Cryptocurrency market tracker backed by the CoinGecko API
#[derive(Debug, Parser)]
#[command(name = "coinwatch", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Get top cryptocurrencies by market cap
    Top(top::TopArgs),
    /// Show the current price of a coin
    Price(price::PriceArgs),
    /// Monitor coins and alert on threshold crossings
    Monitor(monitor::MonitorArgs),
}

pub async fn execute(cli: &Cli, settings: &Settings) -> CommandResult {
    match &cli.command {
        Command::Top(args) => top::execute(settings, args).await,
        Command::Price(args) => price::execute(settings, args).await,
        Command::Monitor(args) => monitor::execute(settings, args).await,
    }
}
