//! Background data ingestion
//!
//! A perpetual loop refreshing the gateway's market and sentiment data,
//! independent of any model's retrain schedule. Each cycle runs two
//! best-effort stages (market ticks from every exchange feed, then
//! news); a failure in one source never blocks another, and a failed
//! cycle shortens the sleep to the back-off interval instead of
//! crashing the loop.

use crate::error::FetchError;
use crate::gateway::{synthetic, DataGateway};
use crate::health::{components, HealthRegistry};
use crate::models::{Instrument, MarketTick, NewsItem};
use crate::observability::{ServiceMetrics, StructuredLogger};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// One upstream exchange connector.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<MarketTick>, FetchError>;
}

/// One upstream news/sentiment connector.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> Result<Vec<NewsItem>, FetchError>;
}

/// Built-in feed producing deterministic synthetic quotes, standing in
/// for a real exchange connector.
pub struct SyntheticExchangeFeed {
    exchange: String,
    instruments: Vec<(String, String)>,
    batch: AtomicU64,
}

impl SyntheticExchangeFeed {
    pub fn new(exchange: impl Into<String>, universe: &[Instrument]) -> Self {
        Self {
            exchange: exchange.into(),
            instruments: universe
                .iter()
                .map(|i| (i.instrument_id.clone(), i.isin.clone()))
                .collect(),
            batch: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MarketFeed for SyntheticExchangeFeed {
    fn name(&self) -> &str {
        &self.exchange
    }

    async fn fetch(&self) -> Result<Vec<MarketTick>, FetchError> {
        let batch = self.batch.fetch_add(1, Ordering::Relaxed);
        let ticks = self
            .instruments
            .iter()
            .map(|(id, symbol)| {
                let mut rng =
                    StdRng::seed_from_u64(batch ^ id.bytes().map(u64::from).sum::<u64>());
                MarketTick {
                    instrument_id: id.clone(),
                    symbol: symbol.clone(),
                    price: 1000.0 + rng.gen_range(-15.0..15.0),
                    volume: rng.gen_range(1_000..100_000),
                    yield_rate: 0.06 + rng.gen_range(-0.005..0.005),
                    source: self.exchange.clone(),
                    timestamp: Utc::now(),
                }
            })
            .collect();
        Ok(ticks)
    }
}

/// Built-in synthetic news wire.
pub struct SyntheticNewsFeed {
    name: String,
    issuers: Vec<String>,
    batch: AtomicU64,
}

impl SyntheticNewsFeed {
    pub fn new(name: impl Into<String>, universe: &[Instrument]) -> Self {
        Self {
            name: name.into(),
            issuers: universe.iter().map(|i| i.issuer_id.clone()).collect(),
            batch: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl NewsFeed for SyntheticNewsFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<NewsItem>, FetchError> {
        let batch = self.batch.fetch_add(1, Ordering::Relaxed);
        Ok(synthetic::synthetic_news_items(&self.issuers, batch))
    }
}

/// Ingestion loop timing.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Sleep after a clean cycle.
    pub period: Duration,
    /// Shorter sleep after a cycle with failures.
    pub backoff: Duration,
    /// Consecutive failed cycles before the component degrades.
    pub degraded_after: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            backoff: Duration::from_secs(30),
            degraded_after: 3,
        }
    }
}

/// Counts from one ingestion cycle.
#[derive(Debug, Default)]
pub struct CycleStats {
    pub ticks_stored: usize,
    pub news_stored: usize,
    pub market_failures: usize,
    pub news_failures: usize,
}

impl CycleStats {
    pub fn failed(&self) -> bool {
        self.market_failures + self.news_failures > 0
    }
}

/// Perpetual fetch-and-store loop over all configured feeds.
pub struct IngestLoop {
    gateway: Arc<dyn DataGateway>,
    market_feeds: Vec<Arc<dyn MarketFeed>>,
    news_feeds: Vec<Arc<dyn NewsFeed>>,
    config: IngestConfig,
    health: HealthRegistry,
    metrics: ServiceMetrics,
    logger: StructuredLogger,
}

impl IngestLoop {
    pub fn new(
        gateway: Arc<dyn DataGateway>,
        market_feeds: Vec<Arc<dyn MarketFeed>>,
        news_feeds: Vec<Arc<dyn NewsFeed>>,
        config: IngestConfig,
        health: HealthRegistry,
    ) -> Self {
        Self {
            gateway,
            market_feeds,
            news_feeds,
            config,
            health,
            metrics: ServiceMetrics::new(),
            logger: StructuredLogger::new("data-ingestion"),
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            period_secs = self.config.period.as_secs(),
            backoff_secs = self.config.backoff.as_secs(),
            market_feeds = self.market_feeds.len(),
            news_feeds = self.news_feeds.len(),
            "Starting data ingestion loop"
        );

        let mut consecutive_failures = 0u32;

        loop {
            let stats = self.run_cycle().await;
            self.logger.log_ingest_cycle(
                stats.ticks_stored,
                stats.news_stored,
                stats.market_failures + stats.news_failures,
            );

            let delay = if stats.failed() {
                consecutive_failures += 1;
                self.config.backoff
            } else {
                consecutive_failures = 0;
                self.config.period
            };

            if consecutive_failures >= self.config.degraded_after {
                self.health
                    .set_degraded(
                        components::INGESTION,
                        format!("{consecutive_failures} consecutive failed cycles"),
                    )
                    .await;
            } else {
                self.health.set_healthy(components::INGESTION).await;
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down data ingestion loop");
                    break;
                }
            }
        }
    }

    /// One fetch-and-store pass. The market and news stages are
    /// independent; partial success still stores whatever was fetched.
    pub async fn run_cycle(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        for feed in &self.market_feeds {
            match feed.fetch().await {
                Ok(ticks) => {
                    let count = ticks.len();
                    self.gateway.store_market_ticks(ticks).await;
                    stats.ticks_stored += count;
                    self.metrics.add_ingested_items("market_data", count as u64);
                }
                Err(e) => {
                    stats.market_failures += 1;
                    self.metrics.inc_ingest_errors("market_data");
                    warn!(feed = feed.name(), error = %e, "Market data fetch failed");
                }
            }
        }

        for feed in &self.news_feeds {
            match feed.fetch().await {
                Ok(items) => {
                    let count = items.len();
                    self.gateway.store_news(items).await;
                    stats.news_stored += count;
                    self.metrics.add_ingested_items("news_sentiment", count as u64);
                }
                Err(e) => {
                    stats.news_failures += 1;
                    self.metrics.inc_ingest_errors("news_sentiment");
                    warn!(feed = feed.name(), error = %e, "News sentiment fetch failed");
                }
            }
        }

        stats
    }
}
