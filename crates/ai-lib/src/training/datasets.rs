//! Per-model training dataset assembly
//!
//! Each retrain queries the gateway for a fresh window of data and turns
//! it into feature/target observations. An empty gateway yields a small
//! or empty dataset, which the scheduler treats as an insufficient-data
//! skip, never an error. Bootstrap sets are built from synthetic data
//! instead and are only used for the load-failure fallback.

use crate::gateway::{synthetic, DataGateway};
use crate::model::{
    build_liquidity_observations, build_price_observations, build_recommendation_observations,
    credit_feature_names, liquidity_feature_names, price_feature_names,
    recommendation_feature_names, build_credit_observation,
};
use crate::models::{
    MarketIndicators, ModelName, Observation, SentimentSummary, TrainingDataset,
};
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Price training window and held-out validation span (days).
const PRICE_WINDOW_DAYS: i64 = 90;
const PRICE_VALIDATION_DAYS: i64 = 14;

/// Liquidity training window (days).
const LIQUIDITY_WINDOW_DAYS: i64 = 30;

/// Synthetic sample count for credit bootstrap training.
const CREDIT_BOOTSTRAP_SAMPLES: usize = 1000;

/// Builds fresh training datasets by querying the data gateway.
#[derive(Clone)]
pub struct DatasetBuilder {
    gateway: Arc<dyn DataGateway>,
}

impl DatasetBuilder {
    pub fn new(gateway: Arc<dyn DataGateway>) -> Self {
        Self { gateway }
    }

    /// Assemble the training set (and validation set, where the model
    /// uses one) for the named model.
    pub async fn training_set(
        &self,
        name: ModelName,
    ) -> (TrainingDataset, Option<TrainingDataset>) {
        match name {
            ModelName::PricePrediction => self.price_datasets().await,
            ModelName::LiquidityForecasting => (self.liquidity_dataset().await, None),
            ModelName::CreditRisk => (self.credit_dataset().await, None),
            ModelName::RecommendationEngine => (self.recommendation_dataset().await, None),
        }
    }

    /// Synthetic dataset used only to bootstrap a default model when no
    /// persisted artifact can be loaded.
    pub async fn bootstrap_set(
        &self,
        name: ModelName,
    ) -> (TrainingDataset, Option<TrainingDataset>) {
        match name {
            ModelName::PricePrediction => {
                let indicators = MarketIndicators::default();
                let sentiment = SentimentSummary::default();
                let mut observations = Vec::new();
                for id in ["BOOT-P1", "BOOT-P2", "BOOT-P3"] {
                    let series = synthetic::synthetic_price_series(id, 120);
                    observations.extend(build_price_observations(&series, &indicators, &sentiment));
                }
                split_by_age(
                    price_feature_names(),
                    observations,
                    PRICE_VALIDATION_DAYS,
                )
            }
            ModelName::LiquidityForecasting => {
                let mut observations = Vec::new();
                for id in ["BOOT-L1", "BOOT-L2"] {
                    let trades = synthetic::synthetic_trades(id, 30);
                    let books = synthetic::synthetic_order_books(id, 7 * 24);
                    observations.extend(build_liquidity_observations(&trades, &books));
                }
                (
                    TrainingDataset::new(liquidity_feature_names(), observations),
                    None,
                )
            }
            ModelName::CreditRisk => (
                TrainingDataset::new(
                    credit_feature_names(),
                    synthetic::synthetic_credit_observations(CREDIT_BOOTSTRAP_SAMPLES),
                ),
                None,
            ),
            ModelName::RecommendationEngine => {
                let universe = synthetic::synthetic_instruments();
                let portfolios = synthetic::synthetic_portfolios(&universe, 12);
                (
                    TrainingDataset::new(
                        recommendation_feature_names(),
                        build_recommendation_observations(
                            &portfolios,
                            &universe,
                            &MarketIndicators::default(),
                        ),
                    ),
                    None,
                )
            }
        }
    }

    async fn price_datasets(&self) -> (TrainingDataset, Option<TrainingDataset>) {
        let instruments = self.gateway.available_instruments().await;
        let indicators = self.gateway.market_indicators().await;

        let mut observations = Vec::new();
        for instrument in &instruments {
            let series = self
                .gateway
                .historical_series(&instrument.instrument_id, Duration::days(PRICE_WINDOW_DAYS))
                .await;
            let sentiment = self.gateway.news_sentiment(&instrument.issuer_id).await;
            observations.extend(build_price_observations(&series, &indicators, &sentiment));
        }

        split_by_age(price_feature_names(), observations, PRICE_VALIDATION_DAYS)
    }

    async fn liquidity_dataset(&self) -> TrainingDataset {
        let instruments = self.gateway.available_instruments().await;
        let mut observations = Vec::new();
        for instrument in &instruments {
            let trades = self
                .gateway
                .trading_history(
                    &instrument.instrument_id,
                    Duration::days(LIQUIDITY_WINDOW_DAYS),
                )
                .await;
            let books = self
                .gateway
                .order_book_history(
                    &instrument.instrument_id,
                    Duration::days(LIQUIDITY_WINDOW_DAYS),
                )
                .await;
            observations.extend(build_liquidity_observations(&trades, &books));
        }
        TrainingDataset::new(liquidity_feature_names(), observations)
    }

    async fn credit_dataset(&self) -> TrainingDataset {
        let instruments = self.gateway.available_instruments().await;
        let issuers: HashSet<String> = instruments
            .iter()
            .map(|i| i.issuer_id.clone())
            .collect();

        let mut observations = Vec::new();
        for issuer_id in issuers {
            let financials = self.gateway.issuer_financials(&issuer_id).await;
            observations.push(build_credit_observation(&financials));
        }
        TrainingDataset::new(credit_feature_names(), observations)
    }

    async fn recommendation_dataset(&self) -> TrainingDataset {
        let universe = self.gateway.available_instruments().await;
        let indicators = self.gateway.market_indicators().await;
        let portfolios = self.gateway.active_portfolios().await;
        TrainingDataset::new(
            recommendation_feature_names(),
            build_recommendation_observations(&portfolios, &universe, &indicators),
        )
    }
}

/// Split observations into train and validation by a trailing-days cutoff.
fn split_by_age(
    feature_names: Vec<String>,
    observations: Vec<Observation>,
    validation_days: i64,
) -> (TrainingDataset, Option<TrainingDataset>) {
    let cutoff = Utc::now() - Duration::days(validation_days);
    let (validation, train): (Vec<Observation>, Vec<Observation>) = observations
        .into_iter()
        .partition(|o| o.timestamp >= cutoff);
    (
        TrainingDataset::new(feature_names.clone(), train),
        Some(TrainingDataset::new(feature_names, validation)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::model::{CREDIT_MIN_SAMPLES, LIQUIDITY_MIN_SAMPLES, PRICE_MIN_SAMPLES};

    fn seeded_builder() -> DatasetBuilder {
        DatasetBuilder::new(Arc::new(MemoryGateway::with_seed_data(
            std::time::Duration::from_secs(300),
        )))
    }

    fn empty_builder() -> DatasetBuilder {
        DatasetBuilder::new(Arc::new(MemoryGateway::new(std::time::Duration::from_secs(
            300,
        ))))
    }

    #[tokio::test]
    async fn test_price_datasets_split_train_and_validation() {
        let (train, validation) = seeded_builder()
            .training_set(ModelName::PricePrediction)
            .await;
        let validation = validation.unwrap();
        assert!(train.len() >= PRICE_MIN_SAMPLES);
        assert!(!validation.is_empty());

        let cutoff = Utc::now() - Duration::days(PRICE_VALIDATION_DAYS);
        assert!(train.observations.iter().all(|o| o.timestamp < cutoff));
        assert!(validation.observations.iter().all(|o| o.timestamp >= cutoff));
    }

    #[tokio::test]
    async fn test_liquidity_dataset_meets_threshold() {
        let (dataset, validation) = seeded_builder()
            .training_set(ModelName::LiquidityForecasting)
            .await;
        assert!(validation.is_none());
        assert!(dataset.len() >= LIQUIDITY_MIN_SAMPLES);
    }

    #[tokio::test]
    async fn test_credit_dataset_one_row_per_issuer() {
        let (dataset, _) = seeded_builder().training_set(ModelName::CreditRisk).await;
        assert!(dataset.len() >= CREDIT_MIN_SAMPLES);
        for o in &dataset.observations {
            assert_eq!(o.features.len(), 5);
        }
    }

    #[tokio::test]
    async fn test_empty_gateway_yields_empty_datasets() {
        let builder = empty_builder();
        for name in ModelName::ALL {
            let (dataset, _) = builder.training_set(name).await;
            assert!(
                dataset.is_empty(),
                "expected empty dataset for {name}, got {}",
                dataset.len()
            );
        }
    }

    #[tokio::test]
    async fn test_bootstrap_sets_meet_model_thresholds() {
        let builder = empty_builder();

        let (price, price_val) = builder.bootstrap_set(ModelName::PricePrediction).await;
        assert!(price.len() >= PRICE_MIN_SAMPLES);
        assert!(price_val.is_some());

        let (liquidity, _) = builder.bootstrap_set(ModelName::LiquidityForecasting).await;
        assert!(liquidity.len() >= LIQUIDITY_MIN_SAMPLES);

        let (credit, _) = builder.bootstrap_set(ModelName::CreditRisk).await;
        assert_eq!(credit.len(), CREDIT_BOOTSTRAP_SAMPLES);

        let (recs, _) = builder.bootstrap_set(ModelName::RecommendationEngine).await;
        assert!(recs.len() >= crate::model::RECOMMENDATION_MIN_SAMPLES);
    }
}
