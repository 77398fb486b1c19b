//! Liquidity forecasting model
//!
//! A linear scorer over hourly trading-activity features, fitted against
//! a composite liquidity score (volume 0.4, trade count 0.4, inverse
//! price volatility 0.2).

use super::artifact::ArtifactStore;
use super::numeric;
use super::{LiquidityInputs, ModelHandle, ModelRequest, PredictionResult};
use crate::error::{LoadError, PredictError, TrainError};
use crate::models::{
    ModelName, Observation, OrderBookSnapshot, TradeRecord, TrainMetrics, TrainingDataset,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Minimum hourly observations before a liquidity retrain is attempted.
pub const LIQUIDITY_MIN_SAMPLES: usize = 50;

const RIDGE_LAMBDA: f64 = 1.0;

const FEATURE_NAMES: [&str; 6] = [
    "volume",
    "trade_count",
    "price_volatility",
    "spread",
    "depth",
    "imbalance",
];

/// Neutral spread assumed when no order book data covers an hour.
const DEFAULT_SPREAD: f64 = 0.01;

/// Liquidity forecast payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityForecast {
    pub instrument_id: String,
    pub liquidity_score: f64,
    pub expected_spread: f64,
    pub market_impact: f64,
    pub execution_probability: f64,
    pub recommended_order_size: f64,
    pub horizon_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LiquidityParams {
    weights: Vec<f64>,
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    trained_at: DateTime<Utc>,
}

pub struct LiquidityForecastingModel {
    params: RwLock<Option<Arc<LiquidityParams>>>,
    artifacts: ArtifactStore,
}

impl LiquidityForecastingModel {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            params: RwLock::new(None),
            artifacts,
        }
    }

    fn snapshot(&self) -> Option<Arc<LiquidityParams>> {
        self.params.read().ok().and_then(|guard| guard.clone())
    }

    fn install(&self, params: LiquidityParams) {
        if let Ok(mut guard) = self.params.write() {
            *guard = Some(Arc::new(params));
        }
    }

    fn score(params: &LiquidityParams, features: &[f64]) -> f64 {
        let scaled = numeric::scale_row(features, &params.feature_means, &params.feature_stds);
        let mut row = Vec::with_capacity(scaled.len() + 1);
        row.push(1.0);
        row.extend(scaled);
        numeric::dot(&params.weights, &row).clamp(0.0, 1.0)
    }

    fn forecast(&self, inputs: &LiquidityInputs) -> Result<LiquidityForecast, PredictError> {
        let params = self
            .snapshot()
            .ok_or(PredictError::ModelUnavailable(ModelName::LiquidityForecasting))?;

        let features = activity_features(&inputs.trades, &inputs.order_book);
        let liquidity_score = Self::score(&params, &features);

        let hours = covered_hours(&inputs.trades).max(1) as f64;
        let hourly_volume = inputs.trades.iter().map(|t| t.quantity).sum::<f64>() / hours;

        let expected_spread = if inputs.order_book.is_empty() {
            DEFAULT_SPREAD
        } else {
            numeric::mean(&inputs.order_book.iter().map(|b| b.spread).collect::<Vec<_>>())
        };

        let market_impact = inputs
            .quantity
            .map(|q| (q / hourly_volume.max(1.0) * 0.02).min(0.1))
            .unwrap_or(0.0);

        let execution_probability = (liquidity_score - market_impact).clamp(0.1, 0.95);

        Ok(LiquidityForecast {
            instrument_id: inputs.instrument_id.clone(),
            liquidity_score,
            expected_spread,
            market_impact,
            execution_probability,
            recommended_order_size: hourly_volume * 0.1,
            horizon_days: inputs.horizon_days,
        })
    }
}

#[async_trait]
impl ModelHandle for LiquidityForecastingModel {
    fn name(&self) -> ModelName {
        ModelName::LiquidityForecasting
    }

    fn min_samples(&self) -> usize {
        LIQUIDITY_MIN_SAMPLES
    }

    async fn load(&self) -> Result<(), LoadError> {
        let params: LiquidityParams = self
            .artifacts
            .load(ModelName::LiquidityForecasting.as_str())?;
        info!(trained_at = %params.trained_at, "Liquidity forecasting model loaded");
        self.install(params);
        Ok(())
    }

    async fn train(
        &self,
        dataset: &TrainingDataset,
        _validation: Option<&TrainingDataset>,
    ) -> Result<TrainMetrics, TrainError> {
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
        let metrics = TrainMetrics {
            samples: dataset.len(),
            validation_samples: 0,
            train_mae: numeric::mae(&predictions, &targets),
            train_mse: numeric::mse(&predictions, &targets),
            val_mae: None,
            val_mse: None,
        };

        let params = LiquidityParams {
            weights,
            feature_means: means,
            feature_stds: stds,
            trained_at: Utc::now(),
        };

        if let Err(e) = self
            .artifacts
            .save(ModelName::LiquidityForecasting.as_str(), &params)
        {
            tracing::warn!(error = %e, "Failed to persist liquidity model artifact");
        }

        self.install(params);
        debug!(samples = metrics.samples, "Liquidity forecasting model trained");
        Ok(metrics)
    }

    async fn predict(&self, request: ModelRequest) -> Result<PredictionResult, PredictError> {
        match request {
            ModelRequest::Liquidity(inputs) => {
                Ok(PredictionResult::Liquidity(self.forecast(&inputs)?))
            }
            _ => Err(PredictError::InvalidRequest(ModelName::LiquidityForecasting)),
        }
    }

    fn is_loaded(&self) -> bool {
        self.params
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

fn covered_hours(trades: &[TradeRecord]) -> usize {
    let hours: std::collections::BTreeSet<i64> =
        trades.iter().map(|t| t.executed_at.timestamp() / 3600).collect();
    hours.len()
}

/// Aggregate one window of trades and book snapshots into a feature row.
fn activity_features(trades: &[TradeRecord], books: &[OrderBookSnapshot]) -> Vec<f64> {
    let volume: f64 = trades.iter().map(|t| t.quantity).sum();
    let count = trades.len() as f64;
    let prices: Vec<f64> = trades.iter().map(|t| t.price).collect();
    let volatility = numeric::std_dev(&prices);

    let (spread, depth, imbalance) = if books.is_empty() {
        (DEFAULT_SPREAD, 0.0, 0.0)
    } else {
        let spreads: Vec<f64> = books.iter().map(|b| b.spread).collect();
        let depths: Vec<f64> = books.iter().map(|b| b.bid_depth + b.ask_depth).collect();
        let imbalances: Vec<f64> = books
            .iter()
            .map(|b| {
                let total = b.bid_depth + b.ask_depth;
                if total > 1e-12 {
                    (b.bid_depth - b.ask_depth) / total
                } else {
                    0.0
                }
            })
            .collect();
        (
            numeric::mean(&spreads),
            numeric::mean(&depths),
            numeric::mean(&imbalances),
        )
    };

    vec![volume, count, volatility, spread, depth, imbalance]
}

/// Build hourly liquidity observations from raw trades and book history.
/// Targets are the composite score, min-max normalized within the window.
pub fn build_liquidity_observations(
    trades: &[TradeRecord],
    books: &[OrderBookSnapshot],
) -> Vec<Observation> {
    let mut trades_by_hour: BTreeMap<i64, Vec<&TradeRecord>> = BTreeMap::new();
    for trade in trades {
        trades_by_hour
            .entry(trade.executed_at.timestamp() / 3600)
            .or_default()
            .push(trade);
    }
    let mut books_by_hour: BTreeMap<i64, Vec<&OrderBookSnapshot>> = BTreeMap::new();
    for book in books {
        books_by_hour
            .entry(book.timestamp.timestamp() / 3600)
            .or_default()
            .push(book);
    }

    struct HourRow {
        timestamp: DateTime<Utc>,
        features: Vec<f64>,
    }

    let rows: Vec<HourRow> = trades_by_hour
        .iter()
        .map(|(hour, hour_trades)| {
            let owned_trades: Vec<TradeRecord> =
                hour_trades.iter().map(|t| (*t).clone()).collect();
            let owned_books: Vec<OrderBookSnapshot> = books_by_hour
                .get(hour)
                .map(|bs| bs.iter().map(|b| (*b).clone()).collect())
                .unwrap_or_default();
            HourRow {
                timestamp: Utc
                    .timestamp_opt(hour * 3600, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
                features: activity_features(&owned_trades, &owned_books),
            }
        })
        .collect();

    if rows.is_empty() {
        return Vec::new();
    }

    let volumes: Vec<f64> = rows.iter().map(|r| r.features[0]).collect();
    let counts: Vec<f64> = rows.iter().map(|r| r.features[1]).collect();
    let volatilities: Vec<f64> = rows.iter().map(|r| r.features[2]).collect();

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            let target = 0.4 * min_max_norm(volumes[i], &volumes)
                + 0.4 * min_max_norm(counts[i], &counts)
                + 0.2 * (1.0 - min_max_norm(volatilities[i], &volatilities));
            Observation {
                timestamp: row.timestamp,
                features: row.features,
                target,
            }
        })
        .collect()
}

fn min_max_norm(value: f64, values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < 1e-12 {
        0.5
    } else {
        (value - min) / (max - min)
    }
}

/// Feature names matching `activity_features` order.
pub fn liquidity_feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}
