//! Price forecasting model
//!
//! A ridge regression over engineered price/volume/yield features,
//! predicting the next-period return. Confidence bands come from the
//! residual dispersion of the fit; scenario analysis re-runs the
//! prediction with shifted feature values.

use super::artifact::ArtifactStore;
use super::numeric;
use super::{ModelHandle, ModelRequest, PredictionResult, PriceInputs};
use crate::error::{LoadError, PredictError, TrainError};
use crate::models::{
    MarketIndicators, MarketTick, ModelName, Observation, Scenario, SentimentSummary,
    TrainMetrics, TrainingDataset,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Minimum observations before a price retrain is attempted.
pub const PRICE_MIN_SAMPLES: usize = 100;

/// Lookback required before a training row is emitted (longest SMA).
const FEATURE_WINDOW: usize = 50;

const RIDGE_LAMBDA: f64 = 1.0;

/// Feature order: last_return, volatility, sma20_ratio, sma50_ratio,
/// rsi, volume_ratio, yield_spread, sentiment. Scenario shifts index
/// into this layout.
const FEATURE_NAMES: [&str; 8] = [
    "last_return",
    "volatility",
    "sma20_ratio",
    "sma50_ratio",
    "rsi",
    "volume_ratio",
    "yield_spread",
    "sentiment",
];

const IDX_VOLATILITY: usize = 1;
const IDX_YIELD_SPREAD: usize = 6;
const IDX_SENTIMENT: usize = 7;

/// Forecast confidence bands derived from residual dispersion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower_95: f64,
    pub upper_95: f64,
    pub lower_80: f64,
    pub upper_80: f64,
}

/// Outcome of one scenario re-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub description: String,
    pub predicted_price: f64,
    pub price_impact_pct: f64,
}

/// Price forecast payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceForecast {
    pub instrument_id: String,
    pub price: f64,
    pub confidence_interval: ConfidenceInterval,
    pub price_change_pct: f64,
    pub volatility_pct: f64,
    pub scenarios: Vec<ScenarioOutcome>,
}

/// Trained parameter snapshot, replaced as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PriceParams {
    weights: Vec<f64>,
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    residual_std: f64,
    trained_at: DateTime<Utc>,
}

pub struct PricePredictionModel {
    params: RwLock<Option<Arc<PriceParams>>>,
    artifacts: ArtifactStore,
}

impl PricePredictionModel {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            params: RwLock::new(None),
            artifacts,
        }
    }

    fn snapshot(&self) -> Option<Arc<PriceParams>> {
        self.params.read().ok().and_then(|guard| guard.clone())
    }

    fn install(&self, params: PriceParams) {
        if let Ok(mut guard) = self.params.write() {
            *guard = Some(Arc::new(params));
        }
    }

    fn predict_return(params: &PriceParams, features: &[f64]) -> f64 {
        let scaled = numeric::scale_row(features, &params.feature_means, &params.feature_stds);
        let mut row = Vec::with_capacity(scaled.len() + 1);
        row.push(1.0);
        row.extend(scaled);
        numeric::dot(&params.weights, &row)
    }

    fn fit(
        dataset: &TrainingDataset,
        validation: Option<&TrainingDataset>,
    ) -> Result<(PriceParams, TrainMetrics), TrainError> {
        let raw_rows: Vec<Vec<f64>> = dataset
            .observations
            .iter()
            .map(|o| o.features.clone())
            .collect();
        let targets: Vec<f64> = dataset.observations.iter().map(|o| o.target).collect();

        let (means, stds) = numeric::fit_scaler(&raw_rows);
        let rows: Vec<Vec<f64>> = raw_rows
            .iter()
            .map(|r| {
                let scaled = numeric::scale_row(r, &means, &stds);
                let mut row = Vec::with_capacity(scaled.len() + 1);
                row.push(1.0);
                row.extend(scaled);
                row
            })
            .collect();

        let weights = numeric::ridge_regression(&rows, &targets, RIDGE_LAMBDA)
            .ok_or_else(|| TrainError::Failed("normal equations were singular".to_string()))?;

        let predictions: Vec<f64> = rows.iter().map(|r| numeric::dot(&weights, r)).collect();
        let residuals: Vec<f64> = predictions
            .iter()
            .zip(targets.iter())
            .map(|(p, t)| p - t)
            .collect();

        let params = PriceParams {
            weights,
            feature_means: means,
            feature_stds: stds,
            residual_std: numeric::std_dev(&residuals).max(1e-6),
            trained_at: Utc::now(),
        };

        let (val_mae, val_mse, val_samples) = match validation {
            Some(val) if !val.is_empty() => {
                let val_preds: Vec<f64> = val
                    .observations
                    .iter()
                    .map(|o| Self::predict_return(&params, &o.features))
                    .collect();
                let val_targets: Vec<f64> = val.observations.iter().map(|o| o.target).collect();
                (
                    Some(numeric::mae(&val_preds, &val_targets)),
                    Some(numeric::mse(&val_preds, &val_targets)),
                    val.len(),
                )
            }
            _ => (None, None, 0),
        };

        let metrics = TrainMetrics {
            samples: dataset.len(),
            validation_samples: val_samples,
            train_mae: numeric::mae(&predictions, &targets),
            train_mse: numeric::mse(&predictions, &targets),
            val_mae,
            val_mse,
        };

        Ok((params, metrics))
    }

    fn forecast(&self, inputs: &PriceInputs) -> Result<PriceForecast, PredictError> {
        let params = self
            .snapshot()
            .ok_or(PredictError::ModelUnavailable(ModelName::PricePrediction))?;

        if inputs.history.len() < 2 {
            return Err(PredictError::Internal(format!(
                "no usable price history for {}",
                inputs.instrument_id
            )));
        }

        let features = price_features(&inputs.history, &inputs.indicators, &inputs.sentiment);
        let last_price = inputs.history.last().map(|t| t.price).unwrap_or(0.0);

        let base_return = Self::predict_return(&params, &features);
        let base_price = last_price * (1.0 + base_return);

        let sigma = params.residual_std;
        let confidence_interval = ConfidenceInterval {
            lower_95: last_price * (1.0 + base_return - 1.96 * sigma),
            upper_95: last_price * (1.0 + base_return + 1.96 * sigma),
            lower_80: last_price * (1.0 + base_return - 1.28 * sigma),
            upper_80: last_price * (1.0 + base_return + 1.28 * sigma),
        };

        let scenarios = inputs
            .scenarios
            .iter()
            .map(|s| self.run_scenario(&params, &features, last_price, base_price, s))
            .collect();

        Ok(PriceForecast {
            instrument_id: inputs.instrument_id.clone(),
            price: base_price,
            confidence_interval,
            price_change_pct: base_return * 100.0,
            volatility_pct: sigma * 100.0,
            scenarios,
        })
    }

    fn run_scenario(
        &self,
        params: &PriceParams,
        base_features: &[f64],
        last_price: f64,
        base_price: f64,
        scenario: &Scenario,
    ) -> ScenarioOutcome {
        let mut features = base_features.to_vec();
        features[IDX_YIELD_SPREAD] += scenario.interest_rate_change;
        features[IDX_VOLATILITY] *= scenario.volatility_multiplier;
        features[IDX_SENTIMENT] += scenario.sentiment_change;

        let scenario_return = Self::predict_return(params, &features);
        let predicted_price = last_price * (1.0 + scenario_return);
        let price_impact_pct = if base_price.abs() > 1e-12 {
            (predicted_price - base_price) / base_price * 100.0
        } else {
            0.0
        };

        ScenarioOutcome {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            predicted_price,
            price_impact_pct,
        }
    }
}

#[async_trait]
impl ModelHandle for PricePredictionModel {
    fn name(&self) -> ModelName {
        ModelName::PricePrediction
    }

    fn min_samples(&self) -> usize {
        PRICE_MIN_SAMPLES
    }

    fn needs_validation(&self) -> bool {
        true
    }

    async fn load(&self) -> Result<(), LoadError> {
        let params: PriceParams = self.artifacts.load(ModelName::PricePrediction.as_str())?;
        info!(trained_at = %params.trained_at, "Price prediction model loaded");
        self.install(params);
        Ok(())
    }

    async fn train(
        &self,
        dataset: &TrainingDataset,
        validation: Option<&TrainingDataset>,
    ) -> Result<TrainMetrics, TrainError> {
        // Full fit happens before any lock is taken; the swap is one write.
        let (params, metrics) = Self::fit(dataset, validation)?;

        if let Err(e) = self
            .artifacts
            .save(ModelName::PricePrediction.as_str(), &params)
        {
            tracing::warn!(error = %e, "Failed to persist price model artifact");
        }

        self.install(params);
        debug!(
            samples = metrics.samples,
            train_mae = metrics.train_mae,
            "Price prediction model trained"
        );
        Ok(metrics)
    }

    async fn predict(&self, request: ModelRequest) -> Result<PredictionResult, PredictError> {
        match request {
            ModelRequest::Price(inputs) => Ok(PredictionResult::Price(self.forecast(&inputs)?)),
            _ => Err(PredictError::InvalidRequest(ModelName::PricePrediction)),
        }
    }

    fn is_loaded(&self) -> bool {
        self.params
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

/// Engineered feature vector at the end of a price series.
pub fn price_features(
    history: &[MarketTick],
    indicators: &MarketIndicators,
    sentiment: &SentimentSummary,
) -> Vec<f64> {
    let prices: Vec<f64> = history.iter().map(|t| t.price).collect();
    let volumes: Vec<f64> = history.iter().map(|t| t.volume as f64).collect();
    let n = prices.len();

    let returns: Vec<f64> = prices
        .windows(2)
        .map(|w| if w[0].abs() > 1e-12 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect();

    let last_price = prices.last().copied().unwrap_or(0.0);
    let last_return = returns.last().copied().unwrap_or(0.0);
    let vol_window = &returns[returns.len().saturating_sub(20)..];
    let volatility = numeric::std_dev(vol_window);

    let sma20 = numeric::mean(&prices[n.saturating_sub(20)..]);
    let sma50 = numeric::mean(&prices[n.saturating_sub(50)..]);
    let sma20_ratio = if last_price.abs() > 1e-12 { sma20 / last_price } else { 1.0 };
    let sma50_ratio = if last_price.abs() > 1e-12 { sma50 / last_price } else { 1.0 };

    let volume_sma = numeric::mean(&volumes[n.saturating_sub(20)..]);
    let volume_ratio = if volume_sma > 1e-12 {
        volumes.last().copied().unwrap_or(0.0) / volume_sma
    } else {
        1.0
    };

    vec![
        last_return,
        volatility,
        sma20_ratio,
        sma50_ratio,
        rsi(&prices, 14) / 100.0,
        volume_ratio,
        indicators.yield_10y - indicators.yield_2y,
        sentiment.sentiment_score,
    ]
}

/// Relative strength index over the trailing window; 50 when flat or
/// the series is too short.
fn rsi(prices: &[f64], window: usize) -> f64 {
    if prices.len() < window + 1 {
        return 50.0;
    }
    let deltas: Vec<f64> = prices[prices.len() - window - 1..]
        .windows(2)
        .map(|w| w[1] - w[0])
        .collect();
    let gain: f64 = deltas.iter().filter(|d| **d > 0.0).sum::<f64>() / window as f64;
    let loss: f64 = -deltas.iter().filter(|d| **d < 0.0).sum::<f64>() / window as f64;
    if loss < 1e-12 {
        return if gain < 1e-12 { 50.0 } else { 100.0 };
    }
    let rs = gain / loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Build next-period-return training rows from one instrument's series.
/// Rows start once the longest lookback window is filled.
pub fn build_price_observations(
    series: &[MarketTick],
    indicators: &MarketIndicators,
    sentiment: &SentimentSummary,
) -> Vec<Observation> {
    if series.len() <= FEATURE_WINDOW + 1 {
        return Vec::new();
    }
    let mut observations = Vec::with_capacity(series.len() - FEATURE_WINDOW - 1);
    for t in FEATURE_WINDOW..series.len() - 1 {
        let window = &series[..=t];
        let features = price_features(window, indicators, sentiment);
        let current = series[t].price;
        let next = series[t + 1].price;
        let target = if current.abs() > 1e-12 {
            (next - current) / current
        } else {
            0.0
        };
        observations.push(Observation {
            timestamp: series[t].timestamp,
            features,
            target,
        });
    }
    observations
}

/// Feature names matching `price_features` order.
pub fn price_feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn tick(i: usize, price: f64, volume: u64) -> MarketTick {
        MarketTick {
            instrument_id: "BOND001".to_string(),
            symbol: "TEST-BOND".to_string(),
            price,
            volume,
            yield_rate: 0.06,
            source: "TEST".to_string(),
            timestamp: Utc::now() - Duration::days(200 - i as i64),
        }
    }

    fn trending_series(len: usize) -> Vec<MarketTick> {
        (0..len)
            .map(|i| tick(i, 1000.0 + i as f64 * 0.5, 10_000 + (i as u64 % 7) * 500))
            .collect()
    }

    fn dataset_from(series: &[MarketTick]) -> TrainingDataset {
        TrainingDataset::new(
            price_feature_names(),
            build_price_observations(series, &MarketIndicators::default(), &SentimentSummary::default()),
        )
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert!(rsi(&rising, 14) > 99.0);
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(rsi(&falling, 14) < 1.0);
        assert_eq!(rsi(&[1.0, 2.0], 14), 50.0);
    }

    #[test]
    fn test_observations_require_lookback() {
        let short = trending_series(30);
        assert!(build_price_observations(
            &short,
            &MarketIndicators::default(),
            &SentimentSummary::default()
        )
        .is_empty());

        let long = trending_series(120);
        let obs = build_price_observations(
            &long,
            &MarketIndicators::default(),
            &SentimentSummary::default(),
        );
        assert_eq!(obs.len(), 120 - FEATURE_WINDOW - 1);
        assert_eq!(obs[0].features.len(), FEATURE_NAMES.len());
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let dir = TempDir::new().unwrap();
        let model = PricePredictionModel::new(ArtifactStore::new(dir.path()));
        let series = trending_series(200);
        let dataset = dataset_from(&series);
        assert!(dataset.len() >= PRICE_MIN_SAMPLES);

        let metrics = model.train(&dataset, None).await.unwrap();
        assert!(model.is_loaded());
        assert_eq!(metrics.samples, dataset.len());

        let result = model
            .predict(ModelRequest::Price(PriceInputs {
                instrument_id: "BOND001".to_string(),
                history: series,
                indicators: MarketIndicators::default(),
                sentiment: SentimentSummary::default(),
                horizon_days: 30,
                scenarios: vec![Scenario {
                    name: "rate shock".to_string(),
                    description: String::new(),
                    interest_rate_change: 0.01,
                    volatility_multiplier: 1.0,
                    sentiment_change: 0.0,
                }],
            }))
            .await
            .unwrap();

        let forecast = match result {
            PredictionResult::Price(f) => f,
            other => panic!("unexpected result kind: {other:?}"),
        };
        assert!(forecast.price > 0.0);
        assert!(forecast.confidence_interval.lower_95 <= forecast.price);
        assert!(forecast.confidence_interval.upper_95 >= forecast.price);
        assert_eq!(forecast.scenarios.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_train_keeps_previous_parameters() {
        let dir = TempDir::new().unwrap();
        let model = PricePredictionModel::new(ArtifactStore::new(dir.path()));
        let series = trending_series(200);
        model.train(&dataset_from(&series), None).await.unwrap();

        let before = model
            .predict(ModelRequest::Price(PriceInputs {
                instrument_id: "BOND001".to_string(),
                history: series.clone(),
                indicators: MarketIndicators::default(),
                sentiment: SentimentSummary::default(),
                horizon_days: 30,
                scenarios: Vec::new(),
            }))
            .await
            .unwrap();

        // An empty dataset cannot be fitted; the failure must not
        // disturb the installed snapshot.
        let err = model.train(&TrainingDataset::empty(), None).await.unwrap_err();
        assert!(matches!(err, TrainError::Failed(_)));
        assert!(model.is_loaded());

        let after = model
            .predict(ModelRequest::Price(PriceInputs {
                instrument_id: "BOND001".to_string(),
                history: series,
                indicators: MarketIndicators::default(),
                sentiment: SentimentSummary::default(),
                horizon_days: 30,
                scenarios: Vec::new(),
            }))
            .await
            .unwrap();

        let (before, after) = match (before, after) {
            (PredictionResult::Price(b), PredictionResult::Price(a)) => (b, a),
            other => panic!("unexpected result kinds: {other:?}"),
        };
        assert_eq!(before.price, after.price);
    }

    #[tokio::test]
    async fn test_predict_unloaded_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let model = PricePredictionModel::new(ArtifactStore::new(dir.path()));
        let err = model
            .predict(ModelRequest::Price(PriceInputs {
                instrument_id: "BOND001".to_string(),
                history: trending_series(60),
                indicators: MarketIndicators::default(),
                sentiment: SentimentSummary::default(),
                horizon_days: 30,
                scenarios: Vec::new(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, PredictError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_artifact_round_trip() {
        let dir = TempDir::new().unwrap();
        let series = trending_series(200);
        {
            let model = PricePredictionModel::new(ArtifactStore::new(dir.path()));
            model.train(&dataset_from(&series), None).await.unwrap();
        }
        let reloaded = PricePredictionModel::new(ArtifactStore::new(dir.path()));
        assert!(!reloaded.is_loaded());
        reloaded.load().await.unwrap();
        assert!(reloaded.is_loaded());
    }

    #[tokio::test]
    async fn test_wrong_request_kind_rejected() {
        let dir = TempDir::new().unwrap();
        let model = PricePredictionModel::new(ArtifactStore::new(dir.path()));
        let err = model
            .predict(ModelRequest::Credit(crate::model::CreditInputs {
                issuer_id: "ISSUER1".to_string(),
                financials: Default::default(),
                sentiment: Default::default(),
                indicators: Default::default(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, PredictError::InvalidRequest(_)));
    }
}
