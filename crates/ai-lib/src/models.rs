//! Core data models for the bond analytics service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of predictive models this service manages.
///
/// The registry holds exactly one handle per name for the process
/// lifetime; nothing is added or removed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelName {
    PricePrediction,
    LiquidityForecasting,
    CreditRisk,
    RecommendationEngine,
}

impl ModelName {
    pub const ALL: [ModelName; 4] = [
        ModelName::PricePrediction,
        ModelName::LiquidityForecasting,
        ModelName::CreditRisk,
        ModelName::RecommendationEngine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelName::PricePrediction => "price_prediction",
            ModelName::LiquidityForecasting => "liquidity_forecasting",
            ModelName::CreditRisk => "credit_risk",
            ModelName::RecommendationEngine => "recommendation_engine",
        }
    }

    pub fn parse(s: &str) -> Option<ModelName> {
        match s {
            "price_prediction" => Some(ModelName::PricePrediction),
            "liquidity_forecasting" => Some(ModelName::LiquidityForecasting),
            "credit_risk" => Some(ModelName::CreditRisk),
            "recommendation_engine" => Some(ModelName::RecommendationEngine),
            _ => None,
        }
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single market data point for an instrument, as delivered by an
/// exchange feed and stored by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketTick {
    pub instrument_id: String,
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub yield_rate: f64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// An executed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub instrument_id: String,
    pub quantity: f64,
    pub price: f64,
    pub value: f64,
    pub executed_at: DateTime<Utc>,
}

/// Top-of-book snapshot used by liquidity forecasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub instrument_id: String,
    pub best_bid: f64,
    pub best_ask: f64,
    pub bid_depth: f64,
    pub ask_depth: f64,
    pub spread: f64,
    pub timestamp: DateTime<Utc>,
}

/// A scored news item from a sentiment feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub headline: String,
    pub sentiment_score: f64,
    pub source: String,
    pub relevance: f64,
    pub issuer_id: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Aggregated sentiment for an issuer over the recent window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub sentiment_score: f64,
    pub news_volume: u32,
    pub relevance: f64,
}

impl Default for SentimentSummary {
    /// Neutral sentiment, used when no news data exists for an issuer.
    fn default() -> Self {
        Self {
            sentiment_score: 0.0,
            news_volume: 0,
            relevance: 0.5,
        }
    }
}

/// Key financial ratios for an issuer, the credit model's inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerFinancials {
    pub issuer_id: String,
    pub debt_to_equity: f64,
    pub current_ratio: f64,
    pub return_on_assets: f64,
    pub revenue_growth: f64,
    pub interest_coverage: f64,
}

impl Default for IssuerFinancials {
    /// Neutral mid-grade ratios, used when no filing data exists.
    fn default() -> Self {
        Self {
            issuer_id: String::new(),
            debt_to_equity: 1.0,
            current_ratio: 1.2,
            return_on_assets: 0.05,
            revenue_growth: 0.1,
            interest_coverage: 3.0,
        }
    }
}

/// A tradeable bond with the static attributes scoring needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: String,
    pub isin: String,
    pub name: String,
    pub issuer_id: String,
    pub rating: String,
    pub sector: String,
    pub years_to_maturity: f64,
    pub yield_to_maturity: f64,
    pub coupon_rate: f64,
    pub min_investment: f64,
    pub avg_daily_volume: f64,
    pub bid_ask_spread: f64,
}

/// Investor risk appetite, from the user's profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

/// A single position in a user's portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub instrument_id: String,
    pub quantity: f64,
    pub current_value: f64,
    pub sector: String,
    pub rating: String,
    pub years_to_maturity: f64,
}

/// A user's current holdings and profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub user_id: String,
    pub holdings: Vec<Holding>,
    pub risk_profile: RiskProfile,
    pub total_value: f64,
}

impl Portfolio {
    /// Empty portfolio for a user the gateway has no data on.
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            holdings: Vec::new(),
            risk_profile: RiskProfile::default(),
            total_value: 0.0,
        }
    }
}

/// Broad market state shared by several models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketIndicators {
    pub risk_free_rate: f64,
    pub yield_10y: f64,
    pub yield_2y: f64,
    pub volatility: f64,
    pub sentiment: f64,
}

impl Default for MarketIndicators {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.045,
            yield_10y: 0.065,
            yield_2y: 0.055,
            volatility: 0.02,
            sentiment: 0.0,
        }
    }
}

/// One time-stamped training row: feature values plus the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
    pub target: f64,
}

/// An immutable ordered sequence of observations, produced fresh per
/// retrain and owned by that single invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingDataset {
    pub feature_names: Vec<String>,
    pub observations: Vec<Observation>,
}

impl TrainingDataset {
    pub fn new(feature_names: Vec<String>, observations: Vec<Observation>) -> Self {
        Self {
            feature_names,
            observations,
        }
    }

    pub fn empty() -> Self {
        Self {
            feature_names: Vec::new(),
            observations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Metrics reported by a completed training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainMetrics {
    pub samples: usize,
    pub validation_samples: usize,
    pub train_mae: f64,
    pub train_mse: f64,
    pub val_mae: Option<f64>,
    pub val_mse: Option<f64>,
}

/// Loaded/trained state of one model as reported upward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub is_loaded: bool,
    pub last_trained: Option<DateTime<Utc>>,
}

/// A what-if scenario applied on top of a base price forecast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub interest_rate_change: f64,
    #[serde(default = "default_volatility_multiplier")]
    pub volatility_multiplier: f64,
    #[serde(default)]
    pub sentiment_change: f64,
}

fn default_volatility_multiplier() -> f64 {
    1.0
}
