//! Personalized bond recommendation engine
//!
//! Content-based scoring: risk-profile match, liquidity, diversification
//! benefit against the user's current portfolio, risk-adjusted yield and
//! maturity fit, blended by learned preference weights. Training fits
//! the weights from aggregated portfolio holdings.

use super::artifact::ArtifactStore;
use super::numeric;
use super::{ModelHandle, ModelRequest, PredictionResult, RecommendationInputs};
use crate::error::{LoadError, PredictError, TrainError};
use crate::models::{
    Holding, Instrument, MarketIndicators, ModelName, Observation, Portfolio, RiskProfile,
    TrainMetrics, TrainingDataset,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Minimum holding observations before a recommendation retrain is attempted.
pub const RECOMMENDATION_MIN_SAMPLES: usize = 20;

const RIDGE_LAMBDA: f64 = 0.1;

/// Scoring component order: risk match, liquidity, diversification,
/// yield attractiveness, maturity match.
const FEATURE_NAMES: [&str; 5] = [
    "risk_match",
    "liquidity",
    "diversification",
    "yield_attractiveness",
    "maturity_match",
];

/// Default blend used until training learns user preferences.
const DEFAULT_WEIGHTS: [f64; 5] = [0.25, 0.20, 0.20, 0.25, 0.10];

const SECTOR_BONUS: f64 = 1.2;

/// Maximum positions in the suggested allocation.
const MAX_ALLOCATION_BONDS: usize = 5;

/// Horizon assumed when scoring training rows (years).
const TRAINING_HORIZON_YEARS: f64 = 5.0;

/// One recommended bond with its score breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredBond {
    pub instrument_id: String,
    pub isin: String,
    pub name: String,
    pub issuer_id: String,
    pub score: f64,
    pub yield_to_maturity: f64,
    pub rating: String,
    pub maturity_years: f64,
    pub min_investment: f64,
    pub liquidity_score: f64,
    pub risk_score: f64,
    pub reason: String,
}

/// Simple equal-weight allocation over the top affordable bonds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub allocations: Vec<AllocationLine>,
    pub total_invested: f64,
    pub remaining_cash: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationLine {
    pub instrument_id: String,
    pub amount: f64,
}

/// Risk metrics of the recommended allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRisk {
    pub average_risk_score: f64,
    pub risk_volatility: f64,
    pub average_yield: f64,
    pub yield_volatility: f64,
    pub risk_rating: String,
}

/// Expected return metrics of the recommended allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedReturns {
    pub expected_annual_return: f64,
    pub expected_monthly_return: f64,
    pub return_volatility: f64,
    pub sharpe_ratio: f64,
}

/// Recommendation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub user_id: String,
    pub bonds: Vec<ScoredBond>,
    pub allocation: PortfolioAllocation,
    pub risk_analysis: Option<PortfolioRisk>,
    pub expected_returns: Option<ExpectedReturns>,
    pub diversification_score: f64,
    pub total_candidates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecommendParams {
    weights: Vec<f64>,
    trained_at: DateTime<Utc>,
}

pub struct RecommendationEngine {
    params: RwLock<Option<Arc<RecommendParams>>>,
    artifacts: ArtifactStore,
}

impl RecommendationEngine {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            params: RwLock::new(None),
            artifacts,
        }
    }

    fn snapshot(&self) -> Option<Arc<RecommendParams>> {
        self.params.read().ok().and_then(|guard| guard.clone())
    }

    fn install(&self, params: RecommendParams) {
        if let Ok(mut guard) = self.params.write() {
            *guard = Some(Arc::new(params));
        }
    }

    fn recommend(
        &self,
        inputs: &RecommendationInputs,
    ) -> Result<RecommendationSet, PredictError> {
        let params = self
            .snapshot()
            .ok_or(PredictError::ModelUnavailable(ModelName::RecommendationEngine))?;

        let horizon_years = inputs.horizon_days as f64 / 365.0;
        let mut scored: Vec<ScoredBond> = inputs
            .universe
            .iter()
            .map(|bond| {
                let components = score_components(
                    bond,
                    inputs.portfolio.risk_profile,
                    &inputs.portfolio.holdings,
                    &inputs.indicators,
                    horizon_years,
                );
                let mut score = numeric::dot(&params.weights, &components);
                if inputs.preferred_sectors.iter().any(|s| s == &bond.sector) {
                    score *= SECTOR_BONUS;
                }
                ScoredBond {
                    instrument_id: bond.instrument_id.clone(),
                    isin: bond.isin.clone(),
                    name: bond.name.clone(),
                    issuer_id: bond.issuer_id.clone(),
                    score,
                    yield_to_maturity: bond.yield_to_maturity,
                    rating: bond.rating.clone(),
                    maturity_years: bond.years_to_maturity,
                    min_investment: bond.min_investment,
                    liquidity_score: components[1],
                    risk_score: rating_risk_score(&bond.rating),
                    reason: recommendation_reason(&components),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let affordable: Vec<ScoredBond> = scored
            .into_iter()
            .filter(|b| b.min_investment <= inputs.investment_amount)
            .collect();
        let total_candidates = affordable.len();

        let allocation = optimize_allocation(&affordable, inputs.investment_amount);
        let selected: Vec<&ScoredBond> = allocation
            .allocations
            .iter()
            .filter_map(|line| affordable.iter().find(|b| b.instrument_id == line.instrument_id))
            .collect();

        let risk_analysis = analyze_risk(&selected);
        let expected_returns = expected_returns(&selected, &inputs.indicators);
        let diversification_score = portfolio_diversification(&selected);

        Ok(RecommendationSet {
            user_id: inputs.user_id.clone(),
            bonds: affordable.into_iter().take(10).collect(),
            allocation,
            risk_analysis,
            expected_returns,
            diversification_score,
            total_candidates,
        })
    }
}

#[async_trait]
impl ModelHandle for RecommendationEngine {
    fn name(&self) -> ModelName {
        ModelName::RecommendationEngine
    }

    fn min_samples(&self) -> usize {
        RECOMMENDATION_MIN_SAMPLES
    }

    async fn load(&self) -> Result<(), LoadError> {
        let params: RecommendParams = self
            .artifacts
            .load(ModelName::RecommendationEngine.as_str())?;
        info!(trained_at = %params.trained_at, "Recommendation engine loaded");
        self.install(params);
        Ok(())
    }

    async fn train(
        &self,
        dataset: &TrainingDataset,
        _validation: Option<&TrainingDataset>,
    ) -> Result<TrainMetrics, TrainError> {
        let rows: Vec<Vec<f64>> = dataset
            .observations
            .iter()
            .map(|o| o.features.clone())
            .collect();
        let targets: Vec<f64> = dataset.observations.iter().map(|o| o.target).collect();

        let fitted = numeric::ridge_regression(&rows, &targets, RIDGE_LAMBDA)
            .ok_or_else(|| TrainError::Failed("normal equations were singular".to_string()))?;

        // Preference weights stay positive and sum to one; the fit only
        // tilts the blend, it cannot invert a component's meaning.
        let clamped: Vec<f64> = fitted.iter().map(|w| w.max(0.05)).collect();
        let total: f64 = clamped.iter().sum();
        let weights: Vec<f64> = clamped.iter().map(|w| w / total).collect();

        let predictions: Vec<f64> = rows.iter().map(|r| numeric::dot(&weights, r)).collect();
        let metrics = TrainMetrics {
            samples: dataset.len(),
            validation_samples: 0,
            train_mae: numeric::mae(&predictions, &targets),
            train_mse: numeric::mse(&predictions, &targets),
            val_mae: None,
            val_mse: None,
        };

        let params = RecommendParams {
            weights,
            trained_at: Utc::now(),
        };

        if let Err(e) = self
            .artifacts
            .save(ModelName::RecommendationEngine.as_str(), &params)
        {
            tracing::warn!(error = %e, "Failed to persist recommendation model artifact");
        }

        self.install(params);
        debug!(samples = metrics.samples, "Recommendation engine trained");
        Ok(metrics)
    }

    async fn predict(&self, request: ModelRequest) -> Result<PredictionResult, PredictError> {
        match request {
            ModelRequest::Recommendations(inputs) => {
                Ok(PredictionResult::Recommendations(self.recommend(&inputs)?))
            }
            _ => Err(PredictError::InvalidRequest(ModelName::RecommendationEngine)),
        }
    }

    fn is_loaded(&self) -> bool {
        self.params
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }
}

/// Normalized risk score for a rating; unknown ratings fall to BBB.
pub fn rating_risk_score(rating: &str) -> f64 {
    match rating {
        "AAA" => 0.1,
        "AA" => 0.2,
        "A" => 0.3,
        "BBB" => 0.5,
        "BB" => 0.7,
        "B" => 0.8,
        "CCC" => 0.9,
        "CC" => 0.95,
        "C" => 0.98,
        "D" => 1.0,
        _ => 0.5,
    }
}

fn risk_preference(profile: RiskProfile) -> f64 {
    match profile {
        RiskProfile::Conservative => 0.3,
        RiskProfile::Moderate => 0.5,
        RiskProfile::Aggressive => 0.8,
    }
}

fn risk_match(profile: RiskProfile, bond_risk: f64) -> f64 {
    1.0 - (risk_preference(profile) - bond_risk).abs()
}

fn liquidity_score(bond: &Instrument) -> f64 {
    let volume_score = (bond.avg_daily_volume / 1_000_000.0).min(1.0);
    let spread_score = (1.0 - bond.bid_ask_spread * 100.0).max(0.1);
    (volume_score + spread_score) / 2.0
}

fn diversification_benefit(bond: &Instrument, holdings: &[Holding]) -> f64 {
    if holdings.is_empty() {
        return 1.0;
    }
    let n = holdings.len() as f64;
    let sector_concentration =
        holdings.iter().filter(|h| h.sector == bond.sector).count() as f64 / n;
    let rating_concentration =
        holdings.iter().filter(|h| h.rating == bond.rating).count() as f64 / n;
    let avg_maturity =
        holdings.iter().map(|h| h.years_to_maturity).sum::<f64>() / n;
    let maturity_difference = ((bond.years_to_maturity - avg_maturity).abs() / 10.0).min(1.0);

    (1.0 - sector_concentration) * 0.4
        + (1.0 - rating_concentration) * 0.3
        + maturity_difference * 0.3
}

fn yield_attractiveness(bond: &Instrument, indicators: &MarketIndicators) -> f64 {
    let risk_premium = bond.yield_to_maturity - indicators.risk_free_rate;
    let risk_adjusted = risk_premium / rating_risk_score(&bond.rating).max(0.1);
    (risk_adjusted / 0.1).clamp(0.0, 1.0)
}

fn maturity_match(bond: &Instrument, horizon_years: f64) -> f64 {
    (1.0 - (bond.years_to_maturity - horizon_years).abs() / 10.0).max(0.1)
}

/// The five scoring components for one bond and one investor context.
pub fn score_components(
    bond: &Instrument,
    profile: RiskProfile,
    holdings: &[Holding],
    indicators: &MarketIndicators,
    horizon_years: f64,
) -> Vec<f64> {
    vec![
        risk_match(profile, rating_risk_score(&bond.rating)),
        liquidity_score(bond),
        diversification_benefit(bond, holdings),
        yield_attractiveness(bond, indicators),
        maturity_match(bond, horizon_years),
    ]
}

fn recommendation_reason(components: &[f64]) -> String {
    let mut reasons = Vec::new();
    if components[0] > 0.8 {
        reasons.push("excellent risk profile match");
    }
    if components[1] > 0.7 {
        reasons.push("high liquidity");
    }
    if components[2] > 0.7 {
        reasons.push("good portfolio diversification");
    }
    if components[3] > 0.7 {
        reasons.push("attractive yield");
    }
    if components[4] > 0.8 {
        reasons.push("suitable maturity");
    }
    if reasons.is_empty() {
        "meets basic investment criteria".to_string()
    } else {
        format!("Recommended due to {}", reasons.join(", "))
    }
}

fn optimize_allocation(bonds: &[ScoredBond], investment_amount: f64) -> PortfolioAllocation {
    if bonds.is_empty() {
        return PortfolioAllocation {
            allocations: Vec::new(),
            total_invested: 0.0,
            remaining_cash: investment_amount,
        };
    }

    let num_bonds = bonds.len().min(MAX_ALLOCATION_BONDS);
    let per_bond = investment_amount / num_bonds as f64;

    let allocations: Vec<AllocationLine> = bonds
        .iter()
        .take(num_bonds)
        .filter(|b| b.min_investment <= per_bond)
        .map(|b| AllocationLine {
            instrument_id: b.instrument_id.clone(),
            amount: per_bond,
        })
        .collect();

    let total_invested: f64 = allocations.iter().map(|a| a.amount).sum();
    PortfolioAllocation {
        allocations,
        total_invested,
        remaining_cash: investment_amount - total_invested,
    }
}

fn analyze_risk(bonds: &[&ScoredBond]) -> Option<PortfolioRisk> {
    if bonds.is_empty() {
        return None;
    }
    let risk_scores: Vec<f64> = bonds.iter().map(|b| b.risk_score).collect();
    let yields: Vec<f64> = bonds.iter().map(|b| b.yield_to_maturity).collect();
    let average_risk = numeric::mean(&risk_scores);

    let risk_rating = if average_risk < 0.3 {
        "Conservative"
    } else if average_risk < 0.6 {
        "Moderate"
    } else {
        "Aggressive"
    };

    Some(PortfolioRisk {
        average_risk_score: average_risk,
        risk_volatility: numeric::std_dev(&risk_scores),
        average_yield: numeric::mean(&yields),
        yield_volatility: numeric::std_dev(&yields),
        risk_rating: risk_rating.to_string(),
    })
}

fn expected_returns(
    bonds: &[&ScoredBond],
    indicators: &MarketIndicators,
) -> Option<ExpectedReturns> {
    if bonds.is_empty() {
        return None;
    }
    let yields: Vec<f64> = bonds.iter().map(|b| b.yield_to_maturity).collect();
    let expected_annual = numeric::mean(&yields);
    let volatility = numeric::std_dev(&yields);

    Some(ExpectedReturns {
        expected_annual_return: expected_annual,
        expected_monthly_return: expected_annual / 12.0,
        return_volatility: volatility,
        sharpe_ratio: (expected_annual - indicators.risk_free_rate) / volatility.max(0.01),
    })
}

fn portfolio_diversification(bonds: &[&ScoredBond]) -> f64 {
    if bonds.is_empty() {
        return 0.0;
    }
    let ratings: std::collections::HashSet<&str> =
        bonds.iter().map(|b| b.rating.as_str()).collect();
    let issuers: std::collections::HashSet<&str> =
        bonds.iter().map(|b| b.issuer_id.as_str()).collect();
    let n = bonds.len() as f64;
    (ratings.len() as f64 / n + issuers.len() as f64 / n) / 2.0
}

/// Build preference-weight training rows from observed portfolios: each
/// holding becomes one row of scoring components with the holding's
/// value share as the target.
pub fn build_recommendation_observations(
    portfolios: &[Portfolio],
    universe: &[Instrument],
    indicators: &MarketIndicators,
) -> Vec<Observation> {
    let mut observations = Vec::new();
    for portfolio in portfolios {
        if portfolio.total_value <= 0.0 {
            continue;
        }
        for holding in &portfolio.holdings {
            let Some(bond) = universe
                .iter()
                .find(|i| i.instrument_id == holding.instrument_id)
            else {
                continue;
            };
            let rest: Vec<Holding> = portfolio
                .holdings
                .iter()
                .filter(|h| h.instrument_id != holding.instrument_id)
                .cloned()
                .collect();
            observations.push(Observation {
                timestamp: Utc::now(),
                features: score_components(
                    bond,
                    portfolio.risk_profile,
                    &rest,
                    indicators,
                    TRAINING_HORIZON_YEARS,
                ),
                target: holding.current_value / portfolio.total_value,
            });
        }
    }
    observations
}

/// Feature names matching `score_components` order.
pub fn recommendation_feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// The untrained default blend, used for bootstrap parameter sets.
pub fn default_weights() -> Vec<f64> {
    DEFAULT_WEIGHTS.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bond(id: &str, rating: &str, sector: &str, ytm: f64, maturity: f64) -> Instrument {
        Instrument {
            instrument_id: id.to_string(),
            isin: format!("INE{id}"),
            name: format!("{id} bond"),
            issuer_id: format!("issuer-{id}"),
            rating: rating.to_string(),
            sector: sector.to_string(),
            years_to_maturity: maturity,
            yield_to_maturity: ytm,
            coupon_rate: ytm,
            min_investment: 10_000.0,
            avg_daily_volume: 250_000.0,
            bid_ask_spread: 0.005,
        }
    }

    fn universe() -> Vec<Instrument> {
        vec![
            bond("B1", "AAA", "Banking", 0.065, 4.0),
            bond("B2", "AA", "Energy", 0.07, 6.0),
            bond("B3", "BBB", "Banking", 0.085, 5.0),
            bond("B4", "BB", "Infrastructure", 0.11, 8.0),
            bond("B5", "A", "Utilities", 0.075, 3.0),
            bond("B6", "B", "Energy", 0.13, 9.0),
        ]
    }

    fn portfolios() -> Vec<Portfolio> {
        let mk_holding = |id: &str, value: f64, sector: &str, rating: &str, mat: f64| Holding {
            instrument_id: id.to_string(),
            quantity: value / 1000.0,
            current_value: value,
            sector: sector.to_string(),
            rating: rating.to_string(),
            years_to_maturity: mat,
        };
        (0..6)
            .map(|i| Portfolio {
                user_id: format!("user-{i}"),
                holdings: vec![
                    mk_holding("B1", 40_000.0, "Banking", "AAA", 4.0),
                    mk_holding("B3", 25_000.0, "Banking", "BBB", 5.0),
                    mk_holding("B4", 15_000.0, "Infrastructure", "BB", 8.0),
                    mk_holding("B5", 20_000.0, "Utilities", "A", 3.0),
                ],
                risk_profile: if i % 2 == 0 {
                    RiskProfile::Moderate
                } else {
                    RiskProfile::Conservative
                },
                total_value: 100_000.0,
            })
            .collect()
    }

    async fn trained_engine(dir: &TempDir) -> RecommendationEngine {
        let engine = RecommendationEngine::new(ArtifactStore::new(dir.path()));
        let obs =
            build_recommendation_observations(&portfolios(), &universe(), &Default::default());
        let dataset = TrainingDataset::new(recommendation_feature_names(), obs);
        engine.train(&dataset, None).await.unwrap();
        engine
    }

    #[test]
    fn test_rating_risk_ordering() {
        assert!(rating_risk_score("AAA") < rating_risk_score("BBB"));
        assert!(rating_risk_score("BBB") < rating_risk_score("CCC"));
        assert_eq!(rating_risk_score("NOT_A_RATING"), 0.5);
    }

    #[test]
    fn test_diversification_prefers_new_sectors() {
        let holdings = vec![Holding {
            instrument_id: "B1".to_string(),
            quantity: 10.0,
            current_value: 10_000.0,
            sector: "Banking".to_string(),
            rating: "AAA".to_string(),
            years_to_maturity: 4.0,
        }];
        let same_sector = diversification_benefit(&bond("B3", "BBB", "Banking", 0.08, 5.0), &holdings);
        let new_sector =
            diversification_benefit(&bond("B2", "BBB", "Energy", 0.08, 5.0), &holdings);
        assert!(new_sector > same_sector);
        assert_eq!(diversification_benefit(&bond("B2", "AA", "Energy", 0.07, 6.0), &[]), 1.0);
    }

    #[test]
    fn test_training_rows_target_value_share() {
        let obs =
            build_recommendation_observations(&portfolios(), &universe(), &Default::default());
        assert_eq!(obs.len(), 24);
        for o in &obs {
            assert_eq!(o.features.len(), 5);
            assert!(o.target > 0.0 && o.target < 1.0);
        }
    }

    #[tokio::test]
    async fn test_trained_weights_stay_normalized() {
        let dir = TempDir::new().unwrap();
        let engine = trained_engine(&dir).await;
        let params = engine.snapshot().unwrap();
        let total: f64 = params.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(params.weights.iter().all(|w| *w > 0.0));
    }

    #[tokio::test]
    async fn test_recommend_filters_and_ranks() {
        let dir = TempDir::new().unwrap();
        let engine = trained_engine(&dir).await;

        let result = engine
            .predict(ModelRequest::Recommendations(RecommendationInputs {
                user_id: "user-1".to_string(),
                portfolio: portfolios().remove(0),
                universe: universe(),
                indicators: Default::default(),
                investment_amount: 60_000.0,
                horizon_days: 1825,
                preferred_sectors: vec!["Energy".to_string()],
            }))
            .await
            .unwrap();
        let set = match result {
            PredictionResult::Recommendations(s) => s,
            other => panic!("unexpected result kind: {other:?}"),
        };

        assert!(!set.bonds.is_empty());
        assert!(set.bonds.len() <= 10);
        for pair in set.bonds.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(set.allocation.total_invested <= 60_000.0);
        assert!(set.allocation.allocations.len() <= MAX_ALLOCATION_BONDS);
        assert!(set.risk_analysis.is_some());
        assert!(set.diversification_score > 0.0);
    }

    #[tokio::test]
    async fn test_recommend_empty_universe() {
        let dir = TempDir::new().unwrap();
        let engine = trained_engine(&dir).await;
        let result = engine
            .predict(ModelRequest::Recommendations(RecommendationInputs {
                user_id: "user-1".to_string(),
                portfolio: Portfolio::empty("user-1"),
                universe: Vec::new(),
                indicators: Default::default(),
                investment_amount: 50_000.0,
                horizon_days: 365,
                preferred_sectors: Vec::new(),
            }))
            .await
            .unwrap();
        let set = match result {
            PredictionResult::Recommendations(s) => s,
            other => panic!("unexpected result kind: {other:?}"),
        };
        assert!(set.bonds.is_empty());
        assert_eq!(set.allocation.remaining_cash, 50_000.0);
        assert!(set.risk_analysis.is_none());
    }
}
