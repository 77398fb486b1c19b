//! Inference request path
//!
//! Gathers the inputs a model needs from the gateway, dispatches to the
//! currently registered handle, and wraps the payload in a response
//! envelope. Never triggers training; an unloaded model fails fast with
//! `ModelUnavailable` instead of blocking on a retrain.

use crate::error::PredictError;
use crate::gateway::DataGateway;
use crate::model::{
    CreditInputs, LiquidityInputs, ModelRegistry, ModelRequest, PredictionEnvelope, PriceInputs,
    RecommendationInputs,
};
use crate::models::{ModelName, Scenario};
use crate::observability::ServiceMetrics;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// History window gathered for price forecasts (days).
const PRICE_HISTORY_DAYS: i64 = 90;

/// Trade/book window gathered for liquidity forecasts (days).
const LIQUIDITY_HISTORY_DAYS: i64 = 7;

fn default_horizon_days() -> u32 {
    30
}

/// Price forecast request, as received by the API layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceForecastParams {
    pub instrument_id: String,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

/// Liquidity forecast request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityForecastParams {
    pub instrument_id: String,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub quantity: Option<f64>,
}

/// Credit analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAnalysisParams {
    pub issuer_id: String,
}

/// Recommendation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationParams {
    pub user_id: String,
    pub investment_amount: f64,
    #[serde(default = "default_horizon_days")]
    pub horizon_days: u32,
    #[serde(default)]
    pub preferred_sectors: Vec<String>,
}

/// A request addressed to one of the four models.
#[derive(Debug, Clone)]
pub enum PredictionParams {
    Price(PriceForecastParams),
    Liquidity(LiquidityForecastParams),
    Credit(CreditAnalysisParams),
    Recommendations(RecommendationParams),
}

impl PredictionParams {
    pub fn model(&self) -> ModelName {
        match self {
            PredictionParams::Price(_) => ModelName::PricePrediction,
            PredictionParams::Liquidity(_) => ModelName::LiquidityForecasting,
            PredictionParams::Credit(_) => ModelName::CreditRisk,
            PredictionParams::Recommendations(_) => ModelName::RecommendationEngine,
        }
    }

    fn cache_key(&self) -> String {
        match self {
            PredictionParams::Price(p) => {
                format!("price:{}:{}", p.instrument_id, p.horizon_days)
            }
            PredictionParams::Liquidity(p) => format!(
                "liquidity:{}:{}:{}",
                p.instrument_id,
                p.horizon_days,
                p.quantity.unwrap_or(0.0)
            ),
            PredictionParams::Credit(p) => format!("credit:{}", p.issuer_id),
            PredictionParams::Recommendations(p) => format!(
                "recommend:{}:{}:{}",
                p.user_id, p.investment_amount, p.horizon_days
            ),
        }
    }

    /// Scenario-bearing price requests bypass the cache; two requests
    /// with different scenario sets must not share a cached answer.
    fn cacheable(&self) -> bool {
        match self {
            PredictionParams::Price(p) => p.scenarios.is_empty(),
            _ => true,
        }
    }
}

/// Read-side service answering point-in-time requests against whichever
/// parameter snapshot is currently installed.
pub struct InferenceService {
    registry: Arc<ModelRegistry>,
    gateway: Arc<dyn DataGateway>,
    metrics: ServiceMetrics,
}

impl InferenceService {
    pub fn new(registry: Arc<ModelRegistry>, gateway: Arc<dyn DataGateway>) -> Self {
        Self {
            registry,
            gateway,
            metrics: ServiceMetrics::new(),
        }
    }

    /// Serve one prediction. Fails with `ModelUnavailable` when the
    /// target model never loaded; all other gateway gaps degrade to
    /// neutral defaults inside the gathered inputs.
    pub async fn serve_prediction(
        &self,
        params: PredictionParams,
    ) -> Result<PredictionEnvelope, PredictError> {
        let model = params.model();
        let handle = self.registry.handle(model);
        if !handle.is_loaded() {
            return Err(PredictError::ModelUnavailable(model));
        }

        let cache_key = params.cache_key();
        if params.cacheable() {
            if let Some(cached) = self.gateway.cached_prediction(&cache_key).await {
                self.metrics.inc_cache_hits(model);
                debug!(model = %model, key = %cache_key, "Prediction served from cache");
                return Ok(cached);
            }
        }

        let started = Instant::now();
        let cacheable = params.cacheable();
        let request = self.gather(params).await;
        let result = handle.predict(request).await?;

        let envelope = PredictionEnvelope {
            model,
            generated_at: Utc::now(),
            result,
        };

        self.metrics.inc_predictions(model);
        self.metrics
            .observe_prediction_latency(started.elapsed().as_secs_f64());

        if cacheable {
            self.gateway
                .cache_prediction(&cache_key, envelope.clone())
                .await;
        }
        Ok(envelope)
    }

    /// Collect the inputs each model needs from the gateway.
    async fn gather(&self, params: PredictionParams) -> ModelRequest {
        match params {
            PredictionParams::Price(p) => {
                let history = self
                    .gateway
                    .historical_series(&p.instrument_id, Duration::days(PRICE_HISTORY_DAYS))
                    .await;
                let indicators = self.gateway.market_indicators().await;
                let issuer_id = self
                    .gateway
                    .available_instruments()
                    .await
                    .into_iter()
                    .find(|i| i.instrument_id == p.instrument_id)
                    .map(|i| i.issuer_id)
                    .unwrap_or_default();
                let sentiment = self.gateway.news_sentiment(&issuer_id).await;
                ModelRequest::Price(PriceInputs {
                    instrument_id: p.instrument_id,
                    history,
                    indicators,
                    sentiment,
                    horizon_days: p.horizon_days,
                    scenarios: p.scenarios,
                })
            }
            PredictionParams::Liquidity(p) => {
                let trades = self
                    .gateway
                    .trading_history(&p.instrument_id, Duration::days(LIQUIDITY_HISTORY_DAYS))
                    .await;
                let order_book = self
                    .gateway
                    .order_book_history(&p.instrument_id, Duration::days(LIQUIDITY_HISTORY_DAYS))
                    .await;
                ModelRequest::Liquidity(LiquidityInputs {
                    instrument_id: p.instrument_id,
                    trades,
                    order_book,
                    horizon_days: p.horizon_days,
                    quantity: p.quantity,
                })
            }
            PredictionParams::Credit(p) => {
                let financials = self.gateway.issuer_financials(&p.issuer_id).await;
                let sentiment = self.gateway.news_sentiment(&p.issuer_id).await;
                let indicators = self.gateway.market_indicators().await;
                ModelRequest::Credit(CreditInputs {
                    issuer_id: p.issuer_id,
                    financials,
                    sentiment,
                    indicators,
                })
            }
            PredictionParams::Recommendations(p) => {
                let portfolio = self.gateway.user_portfolio(&p.user_id).await;
                let universe = self.gateway.available_instruments().await;
                let indicators = self.gateway.market_indicators().await;
                ModelRequest::Recommendations(RecommendationInputs {
                    user_id: p.user_id,
                    portfolio,
                    universe,
                    indicators,
                    investment_amount: p.investment_amount,
                    horizon_days: p.horizon_days,
                    preferred_sectors: p.preferred_sectors,
                })
            }
        }
    }
}
