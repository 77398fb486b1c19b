//! Predictive model implementations
//!
//! Four model variants share the `ModelHandle` capability contract. The
//! scheduler and the inference path only ever see the trait: internal
//! parameters are opaque, replaced atomically by training, and read as a
//! consistent snapshot by prediction.

mod artifact;
mod credit;
mod liquidity;
mod numeric;
mod price;
mod recommend;

pub use artifact::ArtifactStore;
pub use credit::{
    build_credit_observation, credit_feature_names, default_label, CreditAssessment,
    CreditRiskModel, CREDIT_MIN_SAMPLES,
};
pub use liquidity::{
    build_liquidity_observations, liquidity_feature_names, LiquidityForecast,
    LiquidityForecastingModel, LIQUIDITY_MIN_SAMPLES,
};
pub use price::{
    build_price_observations, price_feature_names, ConfidenceInterval, PriceForecast,
    PricePredictionModel, ScenarioOutcome, PRICE_MIN_SAMPLES,
};
pub use recommend::{
    build_recommendation_observations, rating_risk_score, recommendation_feature_names,
    score_components, AllocationLine, ExpectedReturns, PortfolioAllocation, PortfolioRisk,
    RecommendationEngine, RecommendationSet, ScoredBond, RECOMMENDATION_MIN_SAMPLES,
};

use crate::error::{LoadError, PredictError, TrainError};
use crate::models::{
    IssuerFinancials, Instrument, MarketIndicators, MarketTick, ModelName, OrderBookSnapshot,
    Portfolio, Scenario, SentimentSummary, TradeRecord, TrainMetrics, TrainingDataset,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Inputs for a price forecast, gathered by the request path.
#[derive(Debug, Clone)]
pub struct PriceInputs {
    pub instrument_id: String,
    pub history: Vec<MarketTick>,
    pub indicators: MarketIndicators,
    pub sentiment: SentimentSummary,
    pub horizon_days: u32,
    pub scenarios: Vec<Scenario>,
}

/// Inputs for a liquidity forecast.
#[derive(Debug, Clone)]
pub struct LiquidityInputs {
    pub instrument_id: String,
    pub trades: Vec<TradeRecord>,
    pub order_book: Vec<OrderBookSnapshot>,
    pub horizon_days: u32,
    pub quantity: Option<f64>,
}

/// Inputs for a credit assessment.
#[derive(Debug, Clone)]
pub struct CreditInputs {
    pub issuer_id: String,
    pub financials: IssuerFinancials,
    pub sentiment: SentimentSummary,
    pub indicators: MarketIndicators,
}

/// Inputs for a recommendation run.
#[derive(Debug, Clone)]
pub struct RecommendationInputs {
    pub user_id: String,
    pub portfolio: Portfolio,
    pub universe: Vec<Instrument>,
    pub indicators: MarketIndicators,
    pub investment_amount: f64,
    pub horizon_days: u32,
    pub preferred_sectors: Vec<String>,
}

/// A fully-gathered inference request, dispatched to one model handle.
#[derive(Debug, Clone)]
pub enum ModelRequest {
    Price(PriceInputs),
    Liquidity(LiquidityInputs),
    Credit(CreditInputs),
    Recommendations(RecommendationInputs),
}

/// The payload produced by one model for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionResult {
    Price(PriceForecast),
    Liquidity(LiquidityForecast),
    Credit(CreditAssessment),
    Recommendations(RecommendationSet),
}

/// Response envelope handed back to the API layer and cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionEnvelope {
    pub model: ModelName,
    pub generated_at: DateTime<Utc>,
    pub result: PredictionResult,
}

/// Uniform contract every model implements.
///
/// Training must compute the full replacement parameter set before
/// taking any lock, then install it in a single write: a concurrent
/// `predict` observes fully-old or fully-new parameters, never a
/// partial update.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    fn name(&self) -> ModelName;

    /// Minimum observations required before `train` is worth calling.
    fn min_samples(&self) -> usize;

    /// Whether training expects a held-out validation dataset.
    fn needs_validation(&self) -> bool {
        false
    }

    /// Hydrate parameters from the persisted artifact.
    async fn load(&self) -> Result<(), LoadError>;

    /// Fit new parameters and atomically replace the current snapshot.
    async fn train(
        &self,
        dataset: &TrainingDataset,
        validation: Option<&TrainingDataset>,
    ) -> Result<TrainMetrics, TrainError>;

    /// Answer a request against the currently installed snapshot.
    async fn predict(&self, request: ModelRequest) -> Result<PredictionResult, PredictError>;

    fn is_loaded(&self) -> bool;
}

/// Fixed mapping from model name to handle, created once at startup.
pub struct ModelRegistry {
    price: Arc<dyn ModelHandle>,
    liquidity: Arc<dyn ModelHandle>,
    credit: Arc<dyn ModelHandle>,
    recommendation: Arc<dyn ModelHandle>,
}

impl ModelRegistry {
    pub fn new(
        price: Arc<dyn ModelHandle>,
        liquidity: Arc<dyn ModelHandle>,
        credit: Arc<dyn ModelHandle>,
        recommendation: Arc<dyn ModelHandle>,
    ) -> Self {
        Self {
            price,
            liquidity,
            credit,
            recommendation,
        }
    }

    /// Construct the four production models persisting under `artifact_dir`.
    pub fn with_defaults(artifact_dir: &Path) -> Self {
        let store = ArtifactStore::new(artifact_dir);
        Self::new(
            Arc::new(PricePredictionModel::new(store.clone())),
            Arc::new(LiquidityForecastingModel::new(store.clone())),
            Arc::new(CreditRiskModel::new(store.clone())),
            Arc::new(RecommendationEngine::new(store)),
        )
    }

    pub fn handle(&self, name: ModelName) -> &Arc<dyn ModelHandle> {
        match name {
            ModelName::PricePrediction => &self.price,
            ModelName::LiquidityForecasting => &self.liquidity,
            ModelName::CreditRisk => &self.credit,
            ModelName::RecommendationEngine => &self.recommendation,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelName, &Arc<dyn ModelHandle>)> {
        ModelName::ALL.into_iter().map(|name| (name, self.handle(name)))
    }
}
