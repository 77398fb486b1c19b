//! Bond analytics AI service
//!
//! Serves price, liquidity, credit-risk and recommendation predictions
//! while two background loops keep the data fresh and the models
//! retrained on their cadences.

use ai_lib::gateway::{DataGateway, MemoryGateway};
use ai_lib::health::{components, HealthRegistry};
use ai_lib::ingest::{IngestLoop, MarketFeed, NewsFeed, SyntheticExchangeFeed, SyntheticNewsFeed};
use ai_lib::model::ModelRegistry;
use ai_lib::observability::{ServiceMetrics, StructuredLogger};
use ai_lib::serve::InferenceService;
use ai_lib::training::{load_or_bootstrap, RetrainScheduler, TrainerLoop};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ai_service::{api, config};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with env-filter control
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cfg = config::ServiceConfig::load()?;
    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new("ai-service");
    logger.log_startup(SERVICE_VERSION);

    // Explicitly constructed shared context: the gateway is the only
    // resource all three flows share, the registry holds the only model
    // handle per name for the process lifetime.
    let gateway = Arc::new(MemoryGateway::with_seed_data(cfg.cache_ttl()));
    let registry = Arc::new(ModelRegistry::with_defaults(Path::new(&cfg.artifact_dir)));

    let training_config = cfg.training_config();
    let scheduler = Arc::new(RetrainScheduler::new(
        registry.clone(),
        gateway.clone() as Arc<dyn DataGateway>,
        &training_config,
    ));

    load_or_bootstrap(&registry, scheduler.datasets(), cfg.bootstrap_on_load_failure).await;

    let health = HealthRegistry::new();
    health.register(components::INGESTION).await;
    health.register(components::TRAINER).await;
    health.register(components::MODELS).await;
    health.register(components::GATEWAY).await;

    let unloaded: Vec<String> = registry
        .iter()
        .filter(|(_, handle)| !handle.is_loaded())
        .map(|(name, _)| name.to_string())
        .collect();
    if unloaded.is_empty() {
        health.set_healthy(components::MODELS).await;
    } else {
        health
            .set_degraded(components::MODELS, format!("unloaded: {}", unloaded.join(", ")))
            .await;
    }

    let universe = gateway.available_instruments().await;
    let market_feeds: Vec<Arc<dyn MarketFeed>> = vec![
        Arc::new(SyntheticExchangeFeed::new("NSE", &universe)),
        Arc::new(SyntheticExchangeFeed::new("BSE", &universe)),
    ];
    let news_feeds: Vec<Arc<dyn NewsFeed>> =
        vec![Arc::new(SyntheticNewsFeed::new("newswire", &universe))];

    let ingest = IngestLoop::new(
        gateway.clone() as Arc<dyn DataGateway>,
        market_feeds,
        news_feeds,
        cfg.ingest_config(),
        health.clone(),
    );
    let trainer = TrainerLoop::new(
        scheduler.clone(),
        Duration::from_secs(cfg.trainer_tick_secs),
        health.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let ingest_handle = tokio::spawn(ingest.run(shutdown_tx.subscribe()));
    let trainer_handle = tokio::spawn(trainer.run(shutdown_tx.subscribe()));

    let inference = Arc::new(InferenceService::new(
        registry.clone(),
        gateway.clone() as Arc<dyn DataGateway>,
    ));
    let state = Arc::new(api::AppState {
        health: health.clone(),
        metrics,
        scheduler,
        inference,
    });

    health.set_ready(true).await;
    let _api_handle = tokio::spawn(api::serve(cfg.api_port, state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    // In-flight retrains and fetches finish their current iteration;
    // the atomic parameter swap means an abandoned retrain leaves the
    // prior trained state intact.
    let _ = shutdown_tx.send(());
    let _ = tokio::join!(ingest_handle, trainer_handle);

    Ok(())
}
