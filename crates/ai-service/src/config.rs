//! Service configuration
//!
//! Environment-driven (`AI_` prefix) with serde defaults. Retrain
//! intervals are static per deployment; only `force_retrain` overrides
//! the cadence at runtime.

use ai_lib::ingest::IngestConfig;
use ai_lib::training::TrainingConfig;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// API server port for predictions, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding model parameter artifacts
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,

    /// Ingestion period in seconds
    #[serde(default = "default_ingest_interval")]
    pub ingest_interval_secs: u64,

    /// Ingestion back-off after a failed cycle, in seconds
    #[serde(default = "default_ingest_backoff")]
    pub ingest_backoff_secs: u64,

    /// Scheduler tick period in seconds
    #[serde(default = "default_trainer_tick")]
    pub trainer_tick_secs: u64,

    /// Per-model retrain intervals in seconds
    #[serde(default = "default_price_retrain")]
    pub price_retrain_secs: u64,
    #[serde(default = "default_liquidity_retrain")]
    pub liquidity_retrain_secs: u64,
    #[serde(default = "default_credit_retrain")]
    pub credit_retrain_secs: u64,
    #[serde(default = "default_recommendation_retrain")]
    pub recommendation_retrain_secs: u64,

    /// Whether a failed model load falls back to bootstrap training a
    /// synthetic default model. When false the model stays unloaded and
    /// inference on it returns ModelUnavailable.
    #[serde(default = "default_bootstrap")]
    pub bootstrap_on_load_failure: bool,

    /// Prediction cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub prediction_cache_ttl_secs: u64,
}

fn default_api_port() -> u16 {
    8080
}

fn default_artifact_dir() -> String {
    std::env::var("AI_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string())
}

fn default_ingest_interval() -> u64 {
    60
}

fn default_ingest_backoff() -> u64 {
    30
}

fn default_trainer_tick() -> u64 {
    60
}

fn default_price_retrain() -> u64 {
    3600
}

fn default_liquidity_retrain() -> u64 {
    1800
}

fn default_credit_retrain() -> u64 {
    86_400
}

fn default_recommendation_retrain() -> u64 {
    7200
}

fn default_bootstrap() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    300
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            artifact_dir: default_artifact_dir(),
            ingest_interval_secs: default_ingest_interval(),
            ingest_backoff_secs: default_ingest_backoff(),
            trainer_tick_secs: default_trainer_tick(),
            price_retrain_secs: default_price_retrain(),
            liquidity_retrain_secs: default_liquidity_retrain(),
            credit_retrain_secs: default_credit_retrain(),
            recommendation_retrain_secs: default_recommendation_retrain(),
            bootstrap_on_load_failure: default_bootstrap(),
            prediction_cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `AI_`-prefixed environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AI"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            tick_period: Duration::from_secs(self.trainer_tick_secs),
            price_interval: Duration::from_secs(self.price_retrain_secs),
            liquidity_interval: Duration::from_secs(self.liquidity_retrain_secs),
            credit_interval: Duration::from_secs(self.credit_retrain_secs),
            recommendation_interval: Duration::from_secs(self.recommendation_retrain_secs),
        }
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            period: Duration::from_secs(self.ingest_interval_secs),
            backoff: Duration::from_secs(self.ingest_backoff_secs),
            ..IngestConfig::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.prediction_cache_ttl_secs)
    }
}
