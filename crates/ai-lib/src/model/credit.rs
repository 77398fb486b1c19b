//! Issuer credit risk model
//!
//! A logistic scorer over five financial ratios producing a default
//! probability, mapped onto a rating scale and a suitability
//! recommendation. Bootstrap training uses synthetic ratio samples with
//! a heuristic default rule.

use super::artifact::ArtifactStore;
use super::numeric;
use super::{CreditInputs, ModelHandle, ModelRequest, PredictionResult};
use crate::error::{LoadError, PredictError, TrainError};
use crate::models::{
    IssuerFinancials, ModelName, Observation, TrainMetrics, TrainingDataset,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Minimum issuer observations before a credit retrain is attempted.
pub const CREDIT_MIN_SAMPLES: usize = 20;

const LOGISTIC_EPOCHS: usize = 500;
const LOGISTIC_LR: f64 = 0.5;

const FEATURE_NAMES: [&str; 5] = [
    "debt_to_equity",
    "current_ratio",
    "return_on_assets",
    "revenue_growth",
    "interest_coverage",
];

/// Default-probability ceilings per rating, best first.
const RATING_THRESHOLDS: [(&str, f64); 10] = [
    ("AAA", 0.01),
    ("AA", 0.03),
    ("A", 0.05),
    ("BBB", 0.10),
    ("BB", 0.20),
    ("B", 0.35),
    ("CCC", 0.50),
    ("CC", 0.70),
    ("C", 0.85),
    ("D", 1.00),
];

/// Credit assessment payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAssessment {
    pub issuer_id: String,
    pub credit_score: u32,
    pub risk_rating: String,
    pub default_probability: f64,
    pub risk_factors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendation: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CreditParams {
    weights: Vec<f64>,
    feature_means: Vec<f64>,
    feature_stds: Vec<f64>,
    trained_at: DateTime<Utc>,
}

pub struct CreditRiskModel {
    params: RwLock<Option<Arc<CreditParams>>>,
    artifacts: ArtifactStore,
}

impl CreditRiskModel {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            params: RwLock::new(None),
            artifacts,
        }
    }

    fn snapshot(&self) -> Option<Arc<CreditParams>> {
        self.params.read().ok().and_then(|guard| guard.clone())
    }

    fn install(&self, params: CreditParams) {
        if let Ok(mut guard) = self.params.write() {
            *guard = Some(Arc::new(params));
        }
    }

    fn default_probability(params: &CreditParams, features: &[f64]) -> f64 {
        let scaled = numeric::scale_row(features, &params.feature_means, &params.feature_stds);
        let mut row = Vec::with_capacity(scaled.len() + 1);
        row.push(1.0);
        row.extend(scaled);
        numeric::sigmoid(numeric::dot(&params.weights, &row))
    }

    fn assess(&self, inputs: &CreditInputs) -> Result<CreditAssessment, PredictError> {
        let params = self
            .snapshot()
            .ok_or(PredictError::ModelUnavailable(ModelName::CreditRisk))?;

        let features = ratio_features(&inputs.financials);
        let pd = Self::default_probability(&params, &features);

        let risk_factors = identify_risk_factors(&inputs.financials);
        let warnings = early_warnings(pd, &risk_factors, inputs);

        let recommendation = if pd < 0.05 {
            "LOW_RISK - Suitable for conservative investors"
        } else if pd < 0.15 {
            "MODERATE_RISK - Suitable for balanced portfolios"
        } else if pd < 0.30 {
            "HIGH_RISK - Only for risk-tolerant investors"
        } else {
            "VERY_HIGH_RISK - Not recommended for most investors"
        };

        Ok(CreditAssessment {
            issuer_id: inputs.issuer_id.clone(),
            credit_score: credit_score(pd),
            risk_rating: risk_rating(pd).to_string(),
            default_probability: pd,
            risk_factors,
            warnings,
            recommendation: recommendation.to_string(),
            confidence: 0.85,
        })
    }
}

#[async_trait]
impl ModelHandle for CreditRiskModel {
    fn name(&self) -> ModelName {
        ModelName::CreditRisk
    }

    fn min_samples(&self) -> usize {
        CREDIT_MIN_SAMPLES
    }

    async fn load(&self) -> Result<(), LoadError> {
        let params: CreditParams = self.artifacts.load(ModelName::CreditRisk.as_str())?;
        info!(trained_at = %params.trained_at, "Credit risk model loaded");
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

        let weights = numeric::fit_logistic(&rows, &targets, LOGISTIC_EPOCHS, LOGISTIC_LR);
        if weights.is_empty() {
            return Err(TrainError::Failed("empty training matrix".to_string()));
        }

        let predictions: Vec<f64> = rows
            .iter()
            .map(|r| numeric::sigmoid(numeric::dot(&weights, r)))
            .collect();
        let metrics = TrainMetrics {
            samples: dataset.len(),
            validation_samples: 0,
            train_mae: numeric::mae(&predictions, &targets),
            train_mse: numeric::mse(&predictions, &targets),
            val_mae: None,
            val_mse: None,
        };

        let params = CreditParams {
            weights,
            feature_means: means,
            feature_stds: stds,
            trained_at: Utc::now(),
        };

        if let Err(e) = self.artifacts.save(ModelName::CreditRisk.as_str(), &params) {
            tracing::warn!(error = %e, "Failed to persist credit model artifact");
        }

        self.install(params);
        debug!(samples = metrics.samples, "Credit risk model trained");
        Ok(metrics)
    }

    async fn predict(&self, request: ModelRequest) -> Result<PredictionResult, PredictError> {
        match request {
            ModelRequest::Credit(inputs) => Ok(PredictionResult::Credit(self.assess(&inputs)?)),
            _ => Err(PredictError::InvalidRequest(ModelName::CreditRisk)),
        }
    }

    fn is_loaded(&self) -> bool {
        self.params
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

/// Convert default probability to a 300-850 credit score.
fn credit_score(pd: f64) -> u32 {
    let score = 850.0 - pd * 550.0;
    score.clamp(300.0, 850.0) as u32
}

fn risk_rating(pd: f64) -> &'static str {
    for (rating, threshold) in RATING_THRESHOLDS {
        if pd <= threshold {
            return rating;
        }
    }
    "D"
}

fn identify_risk_factors(financials: &IssuerFinancials) -> Vec<String> {
    let mut factors = Vec::new();
    if financials.debt_to_equity > 2.0 {
        factors.push("High debt-to-equity ratio".to_string());
    }
    if financials.current_ratio < 1.0 {
        factors.push("Poor liquidity position".to_string());
    }
    if financials.return_on_assets < 0.0 {
        factors.push("Negative return on assets".to_string());
    }
    if financials.revenue_growth < -0.05 {
        factors.push("Declining revenue".to_string());
    }
    if financials.interest_coverage < 2.0 {
        factors.push("Low interest coverage".to_string());
    }
    factors
}

fn early_warnings(pd: f64, risk_factors: &[String], inputs: &CreditInputs) -> Vec<String> {
    let mut warnings = Vec::new();
    if pd > 0.15 {
        warnings.push("Elevated default risk detected".to_string());
    }
    if risk_factors.len() >= 3 {
        warnings.push("Multiple risk factors present".to_string());
    }
    if inputs.sentiment.sentiment_score < -0.5 {
        warnings.push("Negative market sentiment".to_string());
    }
    if inputs.sentiment.news_volume > 100 {
        warnings.push("High media attention - monitor closely".to_string());
    }
    warnings
}

/// The five ratio features in training order.
pub fn ratio_features(financials: &IssuerFinancials) -> Vec<f64> {
    vec![
        financials.debt_to_equity,
        financials.current_ratio,
        financials.return_on_assets,
        financials.revenue_growth,
        financials.interest_coverage,
    ]
}

/// Heuristic default label used for training targets: an issuer is
/// flagged when enough stressed ratios stack up.
pub fn default_label(financials: &IssuerFinancials) -> f64 {
    let indicator = |flag: bool| if flag { 1.0 } else { 0.0 };
    let risk = 0.3 * indicator(financials.debt_to_equity > 2.0)
        + 0.2 * indicator(financials.current_ratio < 1.0)
        + 0.3 * indicator(financials.return_on_assets < 0.0)
        + 0.1 * indicator(financials.revenue_growth < -0.1)
        + 0.1 * indicator(financials.interest_coverage < 1.0);
    indicator(risk > 0.3)
}

/// Build one training observation from an issuer's current ratios.
pub fn build_credit_observation(financials: &IssuerFinancials) -> Observation {
    Observation {
        timestamp: Utc::now(),
        features: ratio_features(financials),
        target: default_label(financials),
    }
}

/// Feature names matching `ratio_features` order.
pub fn credit_feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentimentSummary;
    use tempfile::TempDir;

    fn healthy_issuer() -> IssuerFinancials {
        IssuerFinancials {
            issuer_id: "ISSUER-SAFE".to_string(),
            debt_to_equity: 0.5,
            current_ratio: 2.0,
            return_on_assets: 0.12,
            revenue_growth: 0.15,
            interest_coverage: 8.0,
        }
    }

    fn stressed_issuer() -> IssuerFinancials {
        IssuerFinancials {
            issuer_id: "ISSUER-RISKY".to_string(),
            debt_to_equity: 4.0,
            current_ratio: 0.6,
            return_on_assets: -0.08,
            revenue_growth: -0.25,
            interest_coverage: 0.4,
        }
    }

    fn mixed_dataset(n: usize) -> TrainingDataset {
        let observations = (0..n)
            .map(|i| {
                let f = if i % 2 == 0 {
                    let mut f = healthy_issuer();
                    f.debt_to_equity += (i as f64) * 0.01;
                    f
                } else {
                    let mut f = stressed_issuer();
                    f.current_ratio += (i as f64) * 0.001;
                    f
                };
                build_credit_observation(&f)
            })
            .collect();
        TrainingDataset::new(credit_feature_names(), observations)
    }

    #[test]
    fn test_rating_ordering() {
        assert_eq!(risk_rating(0.005), "AAA");
        assert_eq!(risk_rating(0.08), "BBB");
        assert_eq!(risk_rating(0.6), "CC");
        assert_eq!(risk_rating(0.99), "D");
    }

    #[test]
    fn test_credit_score_bounds() {
        assert_eq!(credit_score(0.0), 850);
        assert_eq!(credit_score(1.0), 300);
        assert!(credit_score(0.5) > 300 && credit_score(0.5) < 850);
    }

    #[test]
    fn test_default_label_separates() {
        assert_eq!(default_label(&healthy_issuer()), 0.0);
        assert_eq!(default_label(&stressed_issuer()), 1.0);
    }

    #[test]
    fn test_risk_factors_for_stressed_issuer() {
        let factors = identify_risk_factors(&stressed_issuer());
        assert_eq!(factors.len(), 5);
        assert!(identify_risk_factors(&healthy_issuer()).is_empty());
    }

    #[tokio::test]
    async fn test_train_then_assess() {
        let dir = TempDir::new().unwrap();
        let model = CreditRiskModel::new(ArtifactStore::new(dir.path()));
        model.train(&mixed_dataset(100), None).await.unwrap();
        assert!(model.is_loaded());

        let safe = model
            .predict(ModelRequest::Credit(CreditInputs {
                issuer_id: "ISSUER-SAFE".to_string(),
                financials: healthy_issuer(),
                sentiment: SentimentSummary::default(),
                indicators: Default::default(),
            }))
            .await
            .unwrap();
        let risky = model
            .predict(ModelRequest::Credit(CreditInputs {
                issuer_id: "ISSUER-RISKY".to_string(),
                financials: stressed_issuer(),
                sentiment: SentimentSummary::default(),
                indicators: Default::default(),
            }))
            .await
            .unwrap();

        let (safe, risky) = match (safe, risky) {
            (PredictionResult::Credit(a), PredictionResult::Credit(b)) => (a, b),
            other => panic!("unexpected result kinds: {other:?}"),
        };
        assert!(safe.default_probability < risky.default_probability);
        assert!(safe.credit_score > risky.credit_score);
        assert!(risky.risk_factors.len() >= 3);
    }

    #[tokio::test]
    async fn test_sentiment_warning() {
        let dir = TempDir::new().unwrap();
        let model = CreditRiskModel::new(ArtifactStore::new(dir.path()));
        model.train(&mixed_dataset(60), None).await.unwrap();

        let result = model
            .predict(ModelRequest::Credit(CreditInputs {
                issuer_id: "ISSUER-NEWS".to_string(),
                financials: healthy_issuer(),
                sentiment: SentimentSummary {
                    sentiment_score: -0.8,
                    news_volume: 250,
                    relevance: 0.9,
                },
                indicators: Default::default(),
            }))
            .await
            .unwrap();
        let assessment = match result {
            PredictionResult::Credit(a) => a,
            other => panic!("unexpected result kind: {other:?}"),
        };
        assert!(assessment
            .warnings
            .iter()
            .any(|w| w.contains("Negative market sentiment")));
        assert!(assessment
            .warnings
            .iter()
            .any(|w| w.contains("High media attention")));
    }
}
