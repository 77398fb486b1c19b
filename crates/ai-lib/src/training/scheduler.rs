//! Retraining scheduler
//!
//! Owns the "due for retrain" decision per model, serializes retrains
//! per model name, and isolates failures so one model's broken fit never
//! delays or aborts another's. Inference keeps reading the previous
//! parameter snapshot for the whole duration of a retrain; the swap at
//! the end is atomic inside the model handle.

use super::datasets::DatasetBuilder;
use crate::error::TrainError;
use crate::gateway::DataGateway;
use crate::model::ModelRegistry;
use crate::models::{ModelName, ModelStatus, TrainMetrics};
use crate::observability::{ServiceMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Retrain cadence and tick period. Intervals are static per deployment;
/// `force_retrain` is the only runtime override.
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Period between scheduler ticks.
    pub tick_period: Duration,
    pub price_interval: Duration,
    pub liquidity_interval: Duration,
    pub credit_interval: Duration,
    pub recommendation_interval: Duration,
}

impl Default for TrainingConfig {
    /// Cadence follows how fast each signal decays: order-book liquidity
    /// is the most perishable, credit fundamentals move slowest.
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(60),
            price_interval: Duration::from_secs(3600),
            liquidity_interval: Duration::from_secs(1800),
            credit_interval: Duration::from_secs(86_400),
            recommendation_interval: Duration::from_secs(7200),
        }
    }
}

impl TrainingConfig {
    pub fn interval(&self, name: ModelName) -> Duration {
        match name {
            ModelName::PricePrediction => self.price_interval,
            ModelName::LiquidityForecasting => self.liquidity_interval,
            ModelName::CreditRisk => self.credit_interval,
            ModelName::RecommendationEngine => self.recommendation_interval,
        }
    }
}

/// Outcome of a retrain attempt that ran to a decision.
/// Only `Completed` advances `last_trained`.
#[derive(Debug)]
pub enum RetrainOutcome {
    Completed(TrainMetrics),
    SkippedInsufficientData { have: usize, need: usize },
}

/// What one tick did for one model.
#[derive(Debug)]
pub enum TickResult {
    /// The interval has not elapsed yet.
    NotDue,
    /// A retrain for this model was already in flight; no queueing.
    InFlight,
    /// A retrain ran; failures are contained here, never propagated.
    Ran(Result<RetrainOutcome, TrainError>),
}

/// Per-model schedule state. The guard mutex is the mutual-exclusion
/// key: at most one retrain per model name at any time.
struct ScheduleEntry {
    interval: Duration,
    last_trained: RwLock<Option<DateTime<Utc>>>,
    guard: Mutex<()>,
}

impl ScheduleEntry {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_trained: RwLock::new(None),
            guard: Mutex::new(()),
        }
    }
}

/// Drives per-model retraining against the fixed registry.
pub struct RetrainScheduler {
    registry: Arc<ModelRegistry>,
    datasets: DatasetBuilder,
    entries: [ScheduleEntry; 4],
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl RetrainScheduler {
    pub fn new(
        registry: Arc<ModelRegistry>,
        gateway: Arc<dyn DataGateway>,
        config: &TrainingConfig,
    ) -> Self {
        let entries = ModelName::ALL.map(|name| ScheduleEntry::new(config.interval(name)));
        Self {
            registry,
            datasets: DatasetBuilder::new(gateway),
            entries,
            metrics: ServiceMetrics::new(),
            logger: StructuredLogger::new("retraining-scheduler"),
        }
    }

    pub fn datasets(&self) -> &DatasetBuilder {
        &self.datasets
    }

    fn entry(&self, name: ModelName) -> &ScheduleEntry {
        let index = ModelName::ALL
            .iter()
            .position(|n| *n == name)
            .unwrap_or(0);
        &self.entries[index]
    }

    /// Evaluate every model once. Models are checked concurrently so a
    /// slow retrain of one never delays the others; a model whose guard
    /// is already held is skipped for this tick.
    pub async fn tick(&self) -> Vec<(ModelName, TickResult)> {
        let [price, liquidity, credit, recommendation] = ModelName::ALL;
        let (r0, r1, r2, r3) = tokio::join!(
            self.tick_model(price),
            self.tick_model(liquidity),
            self.tick_model(credit),
            self.tick_model(recommendation),
        );
        vec![
            (price, r0),
            (liquidity, r1),
            (credit, r2),
            (recommendation, r3),
        ]
    }

    async fn tick_model(&self, name: ModelName) -> TickResult {
        let entry = self.entry(name);
        let Ok(_guard) = entry.guard.try_lock() else {
            debug!(model = %name, "Retrain already in flight, skipping this tick");
            self.metrics.record_retrain_outcome(name, "skipped_in_flight");
            return TickResult::InFlight;
        };

        let due = match *entry.last_trained.read().await {
            None => true,
            Some(last) => {
                let elapsed = (Utc::now() - last).num_seconds().max(0) as u64;
                elapsed >= entry.interval.as_secs()
            }
        };
        if !due {
            return TickResult::NotDue;
        }

        TickResult::Ran(self.run_retrain(name, entry).await)
    }

    /// Retrain one model, serialized behind its guard. Bypasses the
    /// interval check; used by operators and by due ticks.
    pub async fn retrain(&self, name: ModelName) -> Result<RetrainOutcome, TrainError> {
        let entry = self.entry(name);
        let _guard = entry.guard.lock().await;
        self.run_retrain(name, entry).await
    }

    /// Operator-triggered retrain outside the schedule. Waits for any
    /// in-flight retrain of the same model, then runs immediately.
    pub async fn force_retrain(&self, name: ModelName) -> bool {
        matches!(self.retrain(name).await, Ok(RetrainOutcome::Completed(_)))
    }

    /// Runs with the caller holding the per-model guard.
    async fn run_retrain(
        &self,
        name: ModelName,
        entry: &ScheduleEntry,
    ) -> Result<RetrainOutcome, TrainError> {
        let handle = self.registry.handle(name);
        let started = Instant::now();

        let (dataset, validation) = self.datasets.training_set(name).await;
        let need = handle.min_samples();
        if dataset.len() < need {
            self.logger.log_insufficient_data(name, dataset.len(), need);
            self.metrics.record_retrain_outcome(name, "insufficient_data");
            return Ok(RetrainOutcome::SkippedInsufficientData {
                have: dataset.len(),
                need,
            });
        }

        match handle.train(&dataset, validation.as_ref()).await {
            Ok(metrics) => {
                // A failed attempt must be retried next cycle, so the
                // timestamp only moves on success.
                *entry.last_trained.write().await = Some(Utc::now());

                let duration_secs = started.elapsed().as_secs_f64();
                self.metrics.observe_training_duration(name, duration_secs);
                self.metrics.record_retrain_outcome(name, "completed");
                self.metrics.set_model_loaded(name, true);
                self.metrics.set_model_staleness(name, 0.0);
                self.logger.log_retrain_completed(name, duration_secs, &metrics);
                Ok(RetrainOutcome::Completed(metrics))
            }
            Err(e) => {
                self.metrics.record_retrain_outcome(name, "failed");
                self.logger.log_retrain_failed(name, &e.to_string());
                Err(e)
            }
        }
    }

    /// Loaded state and last successful retrain per model.
    pub async fn model_status(&self) -> BTreeMap<String, ModelStatus> {
        let mut statuses = BTreeMap::new();
        for name in ModelName::ALL {
            let entry = self.entry(name);
            let last_trained = *entry.last_trained.read().await;
            if let Some(last) = last_trained {
                let staleness = (Utc::now() - last).num_seconds().max(0) as f64;
                self.metrics.set_model_staleness(name, staleness);
            }
            statuses.insert(
                name.as_str().to_string(),
                ModelStatus {
                    is_loaded: self.registry.handle(name).is_loaded(),
                    last_trained,
                },
            );
        }
        statuses
    }

    #[cfg(test)]
    async fn set_last_trained(&self, name: ModelName, at: Option<DateTime<Utc>>) {
        *self.entry(name).last_trained.write().await = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, PredictError};
    use crate::gateway::MemoryGateway;
    use crate::model::{ModelHandle, ModelRequest, PredictionResult};
    use crate::models::TrainingDataset;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockModel {
        name: ModelName,
        min: usize,
        train_delay: Duration,
        fail: AtomicBool,
        loaded: AtomicBool,
        train_calls: AtomicUsize,
        concurrent: AtomicUsize,
        max_concurrent: AtomicUsize,
    }

    impl MockModel {
        fn new(name: ModelName) -> Self {
            Self {
                name,
                min: 1,
                train_delay: Duration::from_millis(0),
                fail: AtomicBool::new(false),
                loaded: AtomicBool::new(false),
                train_calls: AtomicUsize::new(0),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            }
        }

        fn with_min(mut self, min: usize) -> Self {
            self.min = min;
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.train_delay = delay;
            self
        }

        fn set_failing(&self, failing: bool) {
            self.fail.store(failing, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ModelHandle for MockModel {
        fn name(&self) -> ModelName {
            self.name
        }

        fn min_samples(&self) -> usize {
            self.min
        }

        async fn load(&self) -> Result<(), LoadError> {
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn train(
            &self,
            dataset: &TrainingDataset,
            _validation: Option<&TrainingDataset>,
        ) -> Result<TrainMetrics, TrainError> {
            let current = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(current, Ordering::SeqCst);
            if !self.train_delay.is_zero() {
                tokio::time::sleep(self.train_delay).await;
            }
            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            self.train_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail.load(Ordering::SeqCst) {
                return Err(TrainError::Failed("injected training failure".to_string()));
            }
            self.loaded.store(true, Ordering::SeqCst);
            Ok(TrainMetrics {
                samples: dataset.len(),
                validation_samples: 0,
                train_mae: 0.01,
                train_mse: 0.001,
                val_mae: None,
                val_mse: None,
            })
        }

        async fn predict(
            &self,
            _request: ModelRequest,
        ) -> Result<PredictionResult, PredictError> {
            Err(PredictError::Internal("mock model does not predict".to_string()))
        }

        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }
    }

    struct Fixture {
        scheduler: Arc<RetrainScheduler>,
        mocks: Vec<Arc<MockModel>>,
    }

    impl Fixture {
        fn mock(&self, name: ModelName) -> &Arc<MockModel> {
            self.mocks
                .iter()
                .find(|m| m.name == name)
                .expect("mock exists for every model")
        }
    }

    fn fixture_with(seeded: bool, build: impl Fn(ModelName) -> MockModel) -> Fixture {
        let mocks: Vec<Arc<MockModel>> =
            ModelName::ALL.iter().map(|n| Arc::new(build(*n))).collect();
        let registry = Arc::new(ModelRegistry::new(
            mocks[0].clone(),
            mocks[1].clone(),
            mocks[2].clone(),
            mocks[3].clone(),
        ));
        let ttl = std::time::Duration::from_secs(300);
        let gateway: Arc<dyn DataGateway> = if seeded {
            Arc::new(MemoryGateway::with_seed_data(ttl))
        } else {
            Arc::new(MemoryGateway::new(ttl))
        };
        let scheduler = Arc::new(RetrainScheduler::new(
            registry,
            gateway,
            &TrainingConfig::default(),
        ));
        Fixture { scheduler, mocks }
    }

    fn fixture(seeded: bool) -> Fixture {
        fixture_with(seeded, MockModel::new)
    }

    #[tokio::test]
    async fn test_first_tick_retrains_every_model() {
        let fx = fixture(true);
        let results = fx.scheduler.tick().await;
        assert_eq!(results.len(), 4);
        for (name, result) in &results {
            assert!(
                matches!(result, TickResult::Ran(Ok(RetrainOutcome::Completed(_)))),
                "{name} got {result:?}"
            );
        }
        let status = fx.scheduler.model_status().await;
        for (_, model_status) in status {
            assert!(model_status.is_loaded);
            assert!(model_status.last_trained.is_some());
        }
    }

    #[tokio::test]
    async fn test_tick_is_idempotent_within_interval() {
        let fx = fixture(true);
        fx.scheduler.tick().await;
        let second = fx.scheduler.tick().await;
        for (name, result) in &second {
            assert!(matches!(result, TickResult::NotDue), "{name} got {result:?}");
        }
        for mock in &fx.mocks {
            assert_eq!(mock.train_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_failed_retrain_leaves_last_trained_unset() {
        let fx = fixture(true);
        fx.mock(ModelName::PricePrediction).set_failing(true);

        let results = fx.scheduler.tick().await;
        let price_result = &results
            .iter()
            .find(|(n, _)| *n == ModelName::PricePrediction)
            .unwrap()
            .1;
        assert!(matches!(price_result, TickResult::Ran(Err(TrainError::Failed(_)))));

        let status = fx.scheduler.model_status().await;
        let price = &status["price_prediction"];
        assert!(price.last_trained.is_none());
        assert!(!price.is_loaded);

        // The failure is retried on the next tick, not silently dropped.
        let again = fx.scheduler.tick().await;
        let price_again = &again
            .iter()
            .find(|(n, _)| *n == ModelName::PricePrediction)
            .unwrap()
            .1;
        assert!(matches!(price_again, TickResult::Ran(Err(_))));
        assert_eq!(
            fx.mock(ModelName::PricePrediction)
                .train_calls
                .load(Ordering::SeqCst),
            2
        );
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_other_models() {
        let fx = fixture(true);
        fx.mock(ModelName::CreditRisk).set_failing(true);

        let results = fx.scheduler.tick().await;
        for (name, result) in &results {
            if *name == ModelName::CreditRisk {
                assert!(matches!(result, TickResult::Ran(Err(_))));
            } else {
                assert!(
                    matches!(result, TickResult::Ran(Ok(RetrainOutcome::Completed(_)))),
                    "{name} got {result:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_insufficient_data_is_a_noop() {
        // Empty gateway: datasets come back empty, below every threshold.
        let fx = fixture_with(false, |n| MockModel::new(n).with_min(5));

        let results = fx.scheduler.tick().await;
        for (name, result) in &results {
            assert!(
                matches!(
                    result,
                    TickResult::Ran(Ok(RetrainOutcome::SkippedInsufficientData { have: 0, need: 5 }))
                ),
                "{name} got {result:?}"
            );
        }
        for mock in &fx.mocks {
            assert_eq!(mock.train_calls.load(Ordering::SeqCst), 0);
        }
        let status = fx.scheduler.model_status().await;
        for (_, model_status) in status {
            assert!(model_status.last_trained.is_none());
        }
    }

    #[tokio::test]
    async fn test_overdue_credit_risk_is_retrained() {
        let fx = fixture(true);
        let now = Utc::now();
        // credit_risk interval is 86400s; 90000s ago is overdue.
        fx.scheduler
            .set_last_trained(ModelName::CreditRisk, Some(now - chrono::Duration::seconds(90_000)))
            .await;
        for name in [
            ModelName::PricePrediction,
            ModelName::LiquidityForecasting,
            ModelName::RecommendationEngine,
        ] {
            fx.scheduler.set_last_trained(name, Some(now)).await;
        }

        let results = fx.scheduler.tick().await;
        for (name, result) in &results {
            if *name == ModelName::CreditRisk {
                assert!(matches!(result, TickResult::Ran(Ok(RetrainOutcome::Completed(_)))));
            } else {
                assert!(matches!(result, TickResult::NotDue), "{name} got {result:?}");
            }
        }

        let status = fx.scheduler.model_status().await;
        let last = status["credit_risk"].last_trained.unwrap();
        assert!((Utc::now() - last).num_seconds() < 60);
    }

    #[tokio::test]
    async fn test_force_retrain_bypasses_interval() {
        let fx = fixture(true);
        fx.scheduler.tick().await;
        assert_eq!(
            fx.mock(ModelName::PricePrediction)
                .train_calls
                .load(Ordering::SeqCst),
            1
        );

        // Immediately after a completed retrain the model is not due,
        // but a forced retrain still runs.
        assert!(fx.scheduler.force_retrain(ModelName::PricePrediction).await);
        assert_eq!(
            fx.mock(ModelName::PricePrediction)
                .train_calls
                .load(Ordering::SeqCst),
            2
        );
    }

    #[tokio::test]
    async fn test_force_retrain_reports_failure() {
        let fx = fixture(true);
        fx.mock(ModelName::LiquidityForecasting).set_failing(true);
        assert!(!fx.scheduler.force_retrain(ModelName::LiquidityForecasting).await);
    }

    #[tokio::test]
    async fn test_concurrent_retrains_of_same_model_are_serialized() {
        let fx = fixture_with(true, |n| {
            MockModel::new(n).with_delay(Duration::from_millis(80))
        });

        let a = {
            let scheduler = fx.scheduler.clone();
            tokio::spawn(async move { scheduler.force_retrain(ModelName::CreditRisk).await })
        };
        let b = {
            let scheduler = fx.scheduler.clone();
            tokio::spawn(async move { scheduler.force_retrain(ModelName::CreditRisk).await })
        };

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());

        let mock = fx.mock(ModelName::CreditRisk);
        assert_eq!(mock.train_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            mock.max_concurrent.load(Ordering::SeqCst),
            1,
            "train() ran concurrently for the same model"
        );
    }

    #[tokio::test]
    async fn test_tick_skips_model_with_retrain_in_flight() {
        let fx = fixture_with(true, |n| {
            if n == ModelName::PricePrediction {
                MockModel::new(n).with_delay(Duration::from_millis(300))
            } else {
                MockModel::new(n)
            }
        });

        let forced = {
            let scheduler = fx.scheduler.clone();
            tokio::spawn(async move { scheduler.force_retrain(ModelName::PricePrediction).await })
        };
        // Let the forced retrain take the guard and start training.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let results = fx.scheduler.tick().await;
        for (name, result) in &results {
            if *name == ModelName::PricePrediction {
                assert!(matches!(result, TickResult::InFlight), "{name} got {result:?}");
            } else {
                assert!(matches!(result, TickResult::Ran(Ok(_))), "{name} got {result:?}");
            }
        }

        assert!(forced.await.unwrap());
        assert_eq!(
            fx.mock(ModelName::PricePrediction)
                .train_calls
                .load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_retrains_of_different_models_can_overlap() {
        let fx = fixture_with(true, |n| {
            MockModel::new(n).with_delay(Duration::from_millis(150))
        });

        let started = Instant::now();
        fx.scheduler.tick().await;
        let elapsed = started.elapsed();

        // Four 150ms retrains run concurrently inside one tick; strictly
        // sequential execution would need at least 600ms.
        assert!(
            elapsed < Duration::from_millis(450),
            "tick took {elapsed:?}, models likely retrained sequentially"
        );
    }
}
