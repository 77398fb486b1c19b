//! Observability infrastructure
//!
//! Prometheus metrics for the retraining scheduler, the ingestion loop
//! and the inference path, plus structured JSON event logging.

use crate::models::{ModelName, TrainMetrics};
use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter_vec,
    GaugeVec, Histogram, HistogramVec, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for inference latency (seconds).
const INFERENCE_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for training duration (seconds).
const TRAINING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    retrains_total: IntCounterVec,
    training_duration_seconds: HistogramVec,
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    prediction_cache_hits_total: IntCounterVec,
    ingest_items_total: IntCounterVec,
    ingest_errors_total: IntCounterVec,
    model_loaded: GaugeVec,
    model_staleness_seconds: GaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            retrains_total: register_int_counter_vec!(
                "ai_service_retrains_total",
                "Retrain attempts by model and outcome",
                &["model", "outcome"]
            )
            .expect("Failed to register retrains_total"),

            training_duration_seconds: register_histogram_vec!(
                "ai_service_training_duration_seconds",
                "Wall-clock duration of model training runs",
                &["model"],
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            prediction_latency_seconds: register_histogram!(
                "ai_service_prediction_latency_seconds",
                "Time spent serving one inference request",
                INFERENCE_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "ai_service_predictions_total",
                "Served predictions by model",
                &["model"]
            )
            .expect("Failed to register predictions_total"),

            prediction_cache_hits_total: register_int_counter_vec!(
                "ai_service_prediction_cache_hits_total",
                "Predictions answered from the gateway cache",
                &["model"]
            )
            .expect("Failed to register prediction_cache_hits_total"),

            ingest_items_total: register_int_counter_vec!(
                "ai_service_ingest_items_total",
                "Items stored by the ingestion loop, by stage",
                &["stage"]
            )
            .expect("Failed to register ingest_items_total"),

            ingest_errors_total: register_int_counter_vec!(
                "ai_service_ingest_errors_total",
                "Ingestion fetch failures, by stage",
                &["stage"]
            )
            .expect("Failed to register ingest_errors_total"),

            model_loaded: register_gauge_vec!(
                "ai_service_model_loaded",
                "Whether a model currently has trained parameters (0/1)",
                &["model"]
            )
            .expect("Failed to register model_loaded"),

            model_staleness_seconds: register_gauge_vec!(
                "ai_service_model_staleness_seconds",
                "Seconds since the model's last successful retrain",
                &["model"]
            )
            .expect("Failed to register model_staleness_seconds"),
        }
    }
}

/// Lightweight handle to the global metrics instance; clones share the
/// same underlying registry entries.
#[derive(Clone, Default)]
pub struct ServiceMetrics {
    _private: (),
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn record_retrain_outcome(&self, model: ModelName, outcome: &str) {
        self.inner()
            .retrains_total
            .with_label_values(&[model.as_str(), outcome])
            .inc();
    }

    pub fn observe_training_duration(&self, model: ModelName, duration_secs: f64) {
        self.inner()
            .training_duration_seconds
            .with_label_values(&[model.as_str()])
            .observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, model: ModelName) {
        self.inner()
            .predictions_total
            .with_label_values(&[model.as_str()])
            .inc();
    }

    pub fn inc_cache_hits(&self, model: ModelName) {
        self.inner()
            .prediction_cache_hits_total
            .with_label_values(&[model.as_str()])
            .inc();
    }

    pub fn add_ingested_items(&self, stage: &str, count: u64) {
        self.inner()
            .ingest_items_total
            .with_label_values(&[stage])
            .inc_by(count);
    }

    pub fn inc_ingest_errors(&self, stage: &str) {
        self.inner()
            .ingest_errors_total
            .with_label_values(&[stage])
            .inc();
    }

    pub fn set_model_loaded(&self, model: ModelName, loaded: bool) {
        self.inner()
            .model_loaded
            .with_label_values(&[model.as_str()])
            .set(if loaded { 1.0 } else { 0.0 });
    }

    pub fn set_model_staleness(&self, model: ModelName, seconds: f64) {
        self.inner()
            .model_staleness_seconds
            .with_label_values(&[model.as_str()])
            .set(seconds);
    }
}

/// Structured logger for significant service events.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "service_started",
            service = %self.service_name,
            version = %version,
            "AI service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service_name,
            reason = %reason,
            "AI service shutting down"
        );
    }

    pub fn log_retrain_completed(
        &self,
        model: ModelName,
        duration_secs: f64,
        metrics: &TrainMetrics,
    ) {
        info!(
            event = "retrain_completed",
            service = %self.service_name,
            model = %model,
            duration_secs = duration_secs,
            samples = metrics.samples,
            validation_samples = metrics.validation_samples,
            train_mae = metrics.train_mae,
            val_mae = metrics.val_mae,
            "Model retrained"
        );
    }

    pub fn log_retrain_failed(&self, model: ModelName, error: &str) {
        warn!(
            event = "retrain_failed",
            service = %self.service_name,
            model = %model,
            error = %error,
            "Model retrain failed, keeping previous parameters"
        );
    }

    pub fn log_insufficient_data(&self, model: ModelName, have: usize, need: usize) {
        info!(
            event = "retrain_skipped",
            service = %self.service_name,
            model = %model,
            have = have,
            need = need,
            "Insufficient data for retraining, will retry next cycle"
        );
    }

    pub fn log_bootstrap(&self, model: ModelName, success: bool) {
        if success {
            info!(
                event = "model_bootstrapped",
                service = %self.service_name,
                model = %model,
                "Model bootstrapped from synthetic data"
            );
        } else {
            warn!(
                event = "model_bootstrap_failed",
                service = %self.service_name,
                model = %model,
                "Bootstrap training failed, model stays unloaded"
            );
        }
    }

    pub fn log_ingest_cycle(&self, ticks: usize, news_items: usize, failures: usize) {
        info!(
            event = "ingest_cycle",
            service = %self.service_name,
            ticks = ticks,
            news_items = news_items,
            failures = failures,
            "Ingestion cycle complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        // Prometheus keeps a process-global registry, so metrics are
        // created once and every handle records into the same series.
        let metrics = ServiceMetrics::new();
        metrics.record_retrain_outcome(ModelName::PricePrediction, "completed");
        metrics.observe_training_duration(ModelName::PricePrediction, 0.2);
        metrics.observe_prediction_latency(0.001);
        metrics.inc_predictions(ModelName::CreditRisk);
        metrics.set_model_loaded(ModelName::CreditRisk, true);
        metrics.set_model_staleness(ModelName::CreditRisk, 120.0);

        let second = ServiceMetrics::new();
        second.inc_ingest_errors("market_data");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("ai-service");
        assert_eq!(logger.service_name, "ai-service");
    }
}
