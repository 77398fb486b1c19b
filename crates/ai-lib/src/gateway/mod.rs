//! Data and cache gateway
//!
//! Supplies historical, trading, sentiment and portfolio data on demand
//! and absorbs what the ingestion loop fetches. Every read degrades to
//! an empty or neutral result rather than failing; callers proceed with
//! defaults. The database/cache engines behind a production gateway are
//! out of scope — `MemoryGateway` is the in-process implementation.

pub mod synthetic;

use crate::model::PredictionEnvelope;
use crate::models::{
    Instrument, IssuerFinancials, MarketIndicators, MarketTick, NewsItem, OrderBookSnapshot,
    Portfolio, SentimentSummary, TradeRecord,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use std::sync::RwLock;
use std::time::Instant;

/// Most samples retained per instrument series.
const MAX_SERIES_SAMPLES: usize = 10_000;

/// Most news items retained per issuer key.
const MAX_NEWS_ITEMS: usize = 1_000;

/// Window over which news sentiment is aggregated.
const SENTIMENT_WINDOW_DAYS: i64 = 30;

/// Capability set the scheduler, ingestion loop and inference path share.
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn historical_series(&self, instrument_id: &str, window: Duration) -> Vec<MarketTick>;

    async fn trading_history(&self, instrument_id: &str, window: Duration) -> Vec<TradeRecord>;

    async fn order_book_history(
        &self,
        instrument_id: &str,
        window: Duration,
    ) -> Vec<OrderBookSnapshot>;

    async fn market_indicators(&self) -> MarketIndicators;

    async fn issuer_financials(&self, issuer_id: &str) -> IssuerFinancials;

    async fn news_sentiment(&self, issuer_id: &str) -> SentimentSummary;

    async fn user_portfolio(&self, user_id: &str) -> Portfolio;

    /// Every portfolio with current holdings, for preference training.
    async fn active_portfolios(&self) -> Vec<Portfolio>;

    async fn available_instruments(&self) -> Vec<Instrument>;

    /// Absorb freshly ingested market ticks.
    async fn store_market_ticks(&self, ticks: Vec<MarketTick>);

    /// Absorb freshly ingested news items.
    async fn store_news(&self, items: Vec<NewsItem>);

    async fn cache_prediction(&self, key: &str, envelope: PredictionEnvelope);

    async fn cached_prediction(&self, key: &str) -> Option<PredictionEnvelope>;
}

/// In-memory gateway backed by concurrent maps. The connection-pooled
/// database of the production deployment sits behind this same trait.
pub struct MemoryGateway {
    series: DashMap<String, Vec<MarketTick>>,
    trades: DashMap<String, Vec<TradeRecord>>,
    order_books: DashMap<String, Vec<OrderBookSnapshot>>,
    financials: DashMap<String, IssuerFinancials>,
    news: DashMap<String, Vec<NewsItem>>,
    portfolios: DashMap<String, Portfolio>,
    instruments: RwLock<Vec<Instrument>>,
    indicators: RwLock<MarketIndicators>,
    predictions: DashMap<String, (PredictionEnvelope, Instant)>,
    cache_ttl: std::time::Duration,
}

impl MemoryGateway {
    pub fn new(cache_ttl: std::time::Duration) -> Self {
        Self {
            series: DashMap::new(),
            trades: DashMap::new(),
            order_books: DashMap::new(),
            financials: DashMap::new(),
            news: DashMap::new(),
            portfolios: DashMap::new(),
            instruments: RwLock::new(Vec::new()),
            indicators: RwLock::new(MarketIndicators::default()),
            predictions: DashMap::new(),
            cache_ttl,
        }
    }

    /// Gateway pre-populated with the synthetic universe: instruments,
    /// 90 days of prices, 30 days of trades, 24 hours of book snapshots,
    /// issuer financials and user portfolios.
    pub fn with_seed_data(cache_ttl: std::time::Duration) -> Self {
        let gateway = Self::new(cache_ttl);
        let universe = synthetic::synthetic_instruments();
        for bond in &universe {
            gateway.series.insert(
                bond.instrument_id.clone(),
                synthetic::synthetic_price_series(&bond.instrument_id, 90),
            );
            gateway.trades.insert(
                bond.instrument_id.clone(),
                synthetic::synthetic_trades(&bond.instrument_id, 30),
            );
            gateway.order_books.insert(
                bond.instrument_id.clone(),
                synthetic::synthetic_order_books(&bond.instrument_id, 24),
            );
            gateway.financials.insert(
                bond.issuer_id.clone(),
                synthetic::synthetic_financials(&bond.issuer_id),
            );
        }
        for portfolio in synthetic::synthetic_portfolios(&universe, 12) {
            gateway
                .portfolios
                .insert(portfolio.user_id.clone(), portfolio);
        }
        *gateway.instruments.write().expect("instruments lock") = universe;
        gateway
    }

    pub fn set_instruments(&self, instruments: Vec<Instrument>) {
        *self.instruments.write().expect("instruments lock") = instruments;
    }

    pub fn set_portfolio(&self, portfolio: Portfolio) {
        self.portfolios
            .insert(portfolio.user_id.clone(), portfolio);
    }

    pub fn set_financials(&self, financials: IssuerFinancials) {
        self.financials
            .insert(financials.issuer_id.clone(), financials);
    }

    pub fn set_trades(&self, instrument_id: &str, trades: Vec<TradeRecord>) {
        self.trades.insert(instrument_id.to_string(), trades);
    }

    pub fn set_order_books(&self, instrument_id: &str, books: Vec<OrderBookSnapshot>) {
        self.order_books.insert(instrument_id.to_string(), books);
    }

    pub fn set_series(&self, instrument_id: &str, series: Vec<MarketTick>) {
        self.series.insert(instrument_id.to_string(), series);
    }

    /// Total stored tick count, used by tests and stats.
    pub fn tick_count(&self) -> usize {
        self.series.iter().map(|entry| entry.value().len()).sum()
    }

    /// Total stored news item count.
    pub fn news_count(&self) -> usize {
        self.news.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn historical_series(&self, instrument_id: &str, window: Duration) -> Vec<MarketTick> {
        let cutoff = Utc::now() - window;
        self.series
            .get(instrument_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|t| t.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn trading_history(&self, instrument_id: &str, window: Duration) -> Vec<TradeRecord> {
        let cutoff = Utc::now() - window;
        self.trades
            .get(instrument_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|t| t.executed_at >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn order_book_history(
        &self,
        instrument_id: &str,
        window: Duration,
    ) -> Vec<OrderBookSnapshot> {
        let cutoff = Utc::now() - window;
        self.order_books
            .get(instrument_id)
            .map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|b| b.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn market_indicators(&self) -> MarketIndicators {
        self.indicators
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    async fn issuer_financials(&self, issuer_id: &str) -> IssuerFinancials {
        self.financials
            .get(issuer_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| IssuerFinancials {
                issuer_id: issuer_id.to_string(),
                ..IssuerFinancials::default()
            })
    }

    async fn news_sentiment(&self, issuer_id: &str) -> SentimentSummary {
        let cutoff = Utc::now() - Duration::days(SENTIMENT_WINDOW_DAYS);
        let Some(entry) = self.news.get(issuer_id) else {
            return SentimentSummary::default();
        };
        let recent: Vec<&NewsItem> = entry
            .value()
            .iter()
            .filter(|n| n.published_at >= cutoff)
            .collect();
        if recent.is_empty() {
            return SentimentSummary::default();
        }
        let n = recent.len() as f64;
        SentimentSummary {
            sentiment_score: recent.iter().map(|i| i.sentiment_score).sum::<f64>() / n,
            news_volume: recent.len() as u32,
            relevance: recent.iter().map(|i| i.relevance).sum::<f64>() / n,
        }
    }

    async fn user_portfolio(&self, user_id: &str) -> Portfolio {
        self.portfolios
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| Portfolio::empty(user_id))
    }

    async fn active_portfolios(&self) -> Vec<Portfolio> {
        self.portfolios
            .iter()
            .filter(|entry| !entry.value().holdings.is_empty())
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn available_instruments(&self) -> Vec<Instrument> {
        self.instruments
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    async fn store_market_ticks(&self, ticks: Vec<MarketTick>) {
        for tick in ticks {
            let mut entry = self.series.entry(tick.instrument_id.clone()).or_default();
            entry.push(tick);
            let len = entry.len();
            if len > MAX_SERIES_SAMPLES {
                entry.drain(0..len - MAX_SERIES_SAMPLES);
            }
        }
    }

    async fn store_news(&self, items: Vec<NewsItem>) {
        for item in items {
            let key = item.issuer_id.clone().unwrap_or_else(|| "market".to_string());
            let mut entry = self.news.entry(key).or_default();
            entry.push(item);
            let len = entry.len();
            if len > MAX_NEWS_ITEMS {
                entry.drain(0..len - MAX_NEWS_ITEMS);
            }
        }
    }

    async fn cache_prediction(&self, key: &str, envelope: PredictionEnvelope) {
        self.predictions
            .insert(key.to_string(), (envelope, Instant::now()));
    }

    async fn cached_prediction(&self, key: &str) -> Option<PredictionEnvelope> {
        if let Some(entry) = self.predictions.get(key) {
            let (envelope, stored_at) = entry.value();
            if stored_at.elapsed() < self.cache_ttl {
                return Some(envelope.clone());
            }
        }
        self.predictions
            .remove_if(key, |_, (_, stored_at)| stored_at.elapsed() >= self.cache_ttl);
        None
    }
}
