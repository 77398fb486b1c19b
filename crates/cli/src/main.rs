//! Bond Analytics CLI
//!
//! A command-line tool for checking model status, forcing retrains and
//! probing the health of the AI service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Bond Analytics CLI
#[derive(Parser)]
#[command(name = "bondctl")]
#[command(author, version, about = "CLI for the Bond Analytics AI service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via BONDCTL_API_URL env var)
    #[arg(long, env = "BONDCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Emit raw JSON instead of tables
    #[arg(long, short)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show per-model loaded state and last retrain time
    Status,

    /// Force an immediate retrain of one model
    Retrain {
        /// Model name (price_prediction, liquidity_forecasting,
        /// credit_risk, recommendation_engine)
        model: String,
    },

    /// Show service health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Status => commands::status::run(&client, cli.json).await,
        Commands::Retrain { model } => commands::retrain::run(&client, &model).await,
        Commands::Health => commands::status::health(&client, cli.json).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_retrain_command() {
        let cli = Cli::parse_from(["bondctl", "retrain", "credit_risk"]);
        match cli.command {
            Commands::Retrain { model } => assert_eq!(model, "credit_risk"),
            _ => panic!("expected retrain command"),
        }
    }
}
