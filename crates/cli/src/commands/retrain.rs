//! Forced model retraining

use crate::client::ApiClient;
use anyhow::Result;
use colored::Colorize;

const KNOWN_MODELS: [&str; 4] = [
    "price_prediction",
    "liquidity_forecasting",
    "credit_risk",
    "recommendation_engine",
];

/// Force an immediate retrain of one model, bypassing its cadence.
pub async fn run(client: &ApiClient, model: &str) -> Result<()> {
    if !KNOWN_MODELS.contains(&model) {
        anyhow::bail!(
            "unknown model '{model}'; expected one of: {}",
            KNOWN_MODELS.join(", ")
        );
    }

    println!("Retraining {model}...");
    let response = client.force_retrain(model).await?;

    if response.success {
        println!("{} {}", "retrained".green(), response.model);
    } else {
        println!(
            "{} {} (insufficient data or training failure; see service logs)",
            "failed".red(),
            response.model
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_model_rejected_before_any_request() {
        let client = ApiClient::new("http://localhost:1").unwrap();
        let err = run(&client, "definitely_not_a_model").await.unwrap_err();
        assert!(err.to_string().contains("unknown model"));
    }
}
