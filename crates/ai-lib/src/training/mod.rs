//! Model lifecycle: startup loading, bootstrap fallback, and the
//! perpetual retraining loop driving the scheduler.

mod datasets;
mod scheduler;

pub use datasets::DatasetBuilder;
pub use scheduler::{
    RetrainOutcome, RetrainScheduler, TickResult, TrainingConfig,
};

use crate::health::{components, HealthRegistry};
use crate::model::{ModelHandle, ModelRegistry};
use crate::models::ModelName;
use crate::observability::{ServiceMetrics, StructuredLogger};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

/// Hydrate every model from its artifact; on failure, the configured
/// policy either bootstrap-trains a synthetic default model or leaves
/// the model unloaded (inference then reports it unavailable).
pub async fn load_or_bootstrap(
    registry: &ModelRegistry,
    datasets: &DatasetBuilder,
    bootstrap_on_failure: bool,
) {
    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new("model-loader");

    let [a, b, c, d] = ModelName::ALL;
    tokio::join!(
        load_one(registry.handle(a), datasets, bootstrap_on_failure, &metrics, &logger),
        load_one(registry.handle(b), datasets, bootstrap_on_failure, &metrics, &logger),
        load_one(registry.handle(c), datasets, bootstrap_on_failure, &metrics, &logger),
        load_one(registry.handle(d), datasets, bootstrap_on_failure, &metrics, &logger),
    );
}

async fn load_one(
    handle: &Arc<dyn ModelHandle>,
    datasets: &DatasetBuilder,
    bootstrap_on_failure: bool,
    metrics: &ServiceMetrics,
    logger: &StructuredLogger,
) {
    let name = handle.name();
    match handle.load().await {
        Ok(()) => {
            info!(model = %name, "Model hydrated from persisted artifact");
            metrics.set_model_loaded(name, true);
        }
        Err(e) => {
            warn!(model = %name, error = %e, "Model load failed");
            if !bootstrap_on_failure {
                metrics.set_model_loaded(name, false);
                return;
            }
            let (dataset, validation) = datasets.bootstrap_set(name).await;
            match handle.train(&dataset, validation.as_ref()).await {
                Ok(_) => {
                    logger.log_bootstrap(name, true);
                    metrics.set_model_loaded(name, true);
                }
                Err(train_err) => {
                    logger.log_bootstrap(name, false);
                    warn!(model = %name, error = %train_err, "Bootstrap training failed; model stays unloaded");
                    metrics.set_model_loaded(name, false);
                }
            }
        }
    }
}

/// Perpetual loop invoking `RetrainScheduler::tick` on a fixed period.
pub struct TrainerLoop {
    scheduler: Arc<RetrainScheduler>,
    tick_period: Duration,
    health: HealthRegistry,
}

impl TrainerLoop {
    pub fn new(
        scheduler: Arc<RetrainScheduler>,
        tick_period: Duration,
        health: HealthRegistry,
    ) -> Self {
        Self {
            scheduler,
            tick_period,
            health,
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            tick_period_secs = self.tick_period.as_secs(),
            "Starting retraining loop"
        );

        let mut ticker = interval(self.tick_period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let results = self.scheduler.tick().await;

                    let mut completed = 0usize;
                    let mut failed = 0usize;
                    let mut skipped = 0usize;
                    for (_, result) in &results {
                        match result {
                            TickResult::Ran(Ok(RetrainOutcome::Completed(_))) => completed += 1,
                            TickResult::Ran(Ok(RetrainOutcome::SkippedInsufficientData { .. })) => {
                                skipped += 1
                            }
                            TickResult::Ran(Err(_)) => failed += 1,
                            TickResult::NotDue | TickResult::InFlight => {}
                        }
                    }

                    tracing::debug!(
                        completed = completed,
                        failed = failed,
                        insufficient = skipped,
                        "Scheduler tick complete"
                    );

                    if failed > 0 {
                        self.health
                            .set_degraded(
                                components::TRAINER,
                                format!("{failed} model(s) failed to retrain"),
                            )
                            .await;
                    } else {
                        self.health.set_healthy(components::TRAINER).await;
                    }
                }
                _ = shutdown.recv() => {
                    // An in-flight tick has already run to completion by
                    // the time this branch is taken, so no retrain is
                    // abandoned halfway.
                    info!("Shutting down retraining loop");
                    break;
                }
            }
        }
    }
}
