//! Deterministic synthetic market data
//!
//! Used to seed the in-memory gateway and to build bootstrap training
//! sets when no persisted artifacts exist. Generators are seeded from
//! stable identifiers so repeated runs produce the same series.

use crate::model::{build_credit_observation, rating_risk_score};
use crate::models::{
    Holding, Instrument, IssuerFinancials, MarketTick, NewsItem, Observation, OrderBookSnapshot,
    Portfolio, RiskProfile, TradeRecord,
};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const SECTORS: [&str; 6] = [
    "Banking",
    "Energy",
    "Infrastructure",
    "Utilities",
    "Telecom",
    "Manufacturing",
];

const RATINGS: [&str; 6] = ["AAA", "AA", "A", "BBB", "BB", "B"];

fn seed_for(tag: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    hasher.finish()
}

/// Standard normal draw via Box-Muller.
fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// A fixed universe of synthetic bonds across sectors and ratings.
pub fn synthetic_instruments() -> Vec<Instrument> {
    let mut rng = StdRng::seed_from_u64(seed_for("instrument-universe"));
    let mut instruments = Vec::new();
    for (i, (sector, rating)) in SECTORS
        .iter()
        .flat_map(|s| RATINGS.iter().map(move |r| (*s, *r)))
        .enumerate()
    {
        let id = format!("BOND{:03}", i + 1);
        let risk = rating_risk_score(rating);
        let ytm = 0.05 + risk * 0.06 + normal(&mut rng) * 0.002;
        instruments.push(Instrument {
            instrument_id: id.clone(),
            isin: format!("INE{:06}A", 100_000 + i * 37),
            name: format!("{sector} {rating} Series {}", 2027 + (i % 8)),
            issuer_id: format!("issuer-{:03}", i + 1),
            rating: rating.to_string(),
            sector: sector.to_string(),
            years_to_maturity: 1.0 + rng.gen::<f64>() * 11.0,
            yield_to_maturity: ytm,
            coupon_rate: ytm - 0.002,
            min_investment: 10_000.0,
            avg_daily_volume: 50_000.0 + rng.gen::<f64>() * 950_000.0,
            bid_ask_spread: 0.002 + rng.gen::<f64>() * 0.018,
        });
    }
    instruments
}

/// Daily random-walk price series for one instrument.
pub fn synthetic_price_series(instrument_id: &str, days: usize) -> Vec<MarketTick> {
    let mut rng = StdRng::seed_from_u64(seed_for(instrument_id));
    let start = Utc::now() - Duration::days(days as i64);
    let mut price = 1000.0;
    let mut yield_rate = 0.06;
    (0..days)
        .map(|d| {
            price += normal(&mut rng) * 2.0;
            yield_rate = (yield_rate + normal(&mut rng) * 0.0005).clamp(0.01, 0.15);
            MarketTick {
                instrument_id: instrument_id.to_string(),
                symbol: format!("{instrument_id}-SYN"),
                price: price.max(1.0),
                volume: rng.gen_range(1_000..100_000),
                yield_rate,
                source: "synthetic".to_string(),
                timestamp: start + Duration::days(d as i64),
            }
        })
        .collect()
}

/// Hourly trade tape with gaps; roughly a third of hours see activity.
pub fn synthetic_trades(instrument_id: &str, days: usize) -> Vec<TradeRecord> {
    let mut rng = StdRng::seed_from_u64(seed_for(&format!("{instrument_id}-trades")));
    let hours = days * 24;
    let start = Utc::now() - Duration::hours(hours as i64);
    let mut trades = Vec::new();
    for h in 0..hours {
        if rng.gen::<f64>() > 0.7 {
            let quantity = rng.gen_range(100..10_000) as f64;
            let price = 1000.0 + normal(&mut rng) * 10.0;
            trades.push(TradeRecord {
                instrument_id: instrument_id.to_string(),
                quantity,
                price,
                value: quantity * price,
                executed_at: start + Duration::hours(h as i64)
                    + Duration::minutes(rng.gen_range(0..60)),
            });
        }
    }
    trades
}

/// Book snapshots every 15 minutes over the trailing window.
pub fn synthetic_order_books(instrument_id: &str, hours: usize) -> Vec<OrderBookSnapshot> {
    let mut rng = StdRng::seed_from_u64(seed_for(&format!("{instrument_id}-book")));
    let snapshots = hours * 4;
    let start = Utc::now() - Duration::hours(hours as i64);
    (0..snapshots)
        .map(|i| {
            let best_bid = 999.0 + normal(&mut rng) * 2.0;
            let best_ask = 1001.0 + normal(&mut rng) * 2.0;
            OrderBookSnapshot {
                instrument_id: instrument_id.to_string(),
                best_bid,
                best_ask,
                bid_depth: rng.gen_range(1_000..100_000) as f64,
                ask_depth: rng.gen_range(1_000..100_000) as f64,
                spread: (best_ask - best_bid).abs().max(0.1),
                timestamp: start + Duration::minutes(15 * i as i64),
            }
        })
        .collect()
}

/// Plausible financial ratios for one issuer.
pub fn synthetic_financials(issuer_id: &str) -> IssuerFinancials {
    let mut rng = StdRng::seed_from_u64(seed_for(issuer_id));
    IssuerFinancials {
        issuer_id: issuer_id.to_string(),
        debt_to_equity: normal(&mut rng).exp(),
        current_ratio: (0.5 + normal(&mut rng) * 0.5).exp(),
        return_on_assets: 0.05 + normal(&mut rng) * 0.1,
        revenue_growth: 0.1 + normal(&mut rng) * 0.3,
        interest_coverage: (1.0 + normal(&mut rng)).exp(),
    }
}

/// Ratio samples with heuristic default labels, for bootstrap training.
pub fn synthetic_credit_observations(count: usize) -> Vec<Observation> {
    (0..count)
        .map(|i| build_credit_observation(&synthetic_financials(&format!("synthetic-issuer-{i}"))))
        .collect()
}

/// Synthetic user portfolios drawn from the given universe.
pub fn synthetic_portfolios(universe: &[Instrument], count: usize) -> Vec<Portfolio> {
    let mut rng = StdRng::seed_from_u64(seed_for("portfolios"));
    let profiles = [
        RiskProfile::Conservative,
        RiskProfile::Moderate,
        RiskProfile::Aggressive,
    ];
    (0..count)
        .map(|u| {
            let lower = universe.len().min(3);
            let upper = universe.len().min(5);
            let positions = rng.gen_range(lower..=upper);
            let mut holdings = Vec::new();
            let mut total_value = 0.0;
            for _ in 0..positions {
                let bond = &universe[rng.gen_range(0..universe.len())];
                if holdings
                    .iter()
                    .any(|h: &Holding| h.instrument_id == bond.instrument_id)
                {
                    continue;
                }
                let value = rng.gen_range(10_000..80_000) as f64;
                total_value += value;
                holdings.push(Holding {
                    instrument_id: bond.instrument_id.clone(),
                    quantity: value / 1000.0,
                    current_value: value,
                    sector: bond.sector.clone(),
                    rating: bond.rating.clone(),
                    years_to_maturity: bond.years_to_maturity,
                });
            }
            Portfolio {
                user_id: format!("user-{:03}", u + 1),
                holdings,
                risk_profile: profiles[u % profiles.len()],
                total_value,
            }
        })
        .collect()
}

const HEADLINE_TEMPLATES: [(&str, f64); 6] = [
    ("Corporate bond market shows steady growth", 0.6),
    ("Interest rate concerns weigh on bond markets", -0.3),
    ("Issuer reports stronger than expected earnings", 0.7),
    ("Rating agency places issuer on negative watch", -0.6),
    ("Liquidity improves across secondary bond trading", 0.4),
    ("Refinancing risk rises for leveraged issuers", -0.4),
];

/// A batch of scored news items, optionally attributed to issuers.
pub fn synthetic_news_items(issuers: &[String], batch: u64) -> Vec<NewsItem> {
    let mut rng = StdRng::seed_from_u64(seed_for(&format!("news-{batch}")));
    let count = rng.gen_range(1..=3);
    (0..count)
        .map(|_| {
            let (headline, base_sentiment) =
                HEADLINE_TEMPLATES[rng.gen_range(0..HEADLINE_TEMPLATES.len())];
            let issuer_id = if !issuers.is_empty() && rng.gen::<f64>() > 0.3 {
                Some(issuers[rng.gen_range(0..issuers.len())].clone())
            } else {
                None
            };
            NewsItem {
                headline: headline.to_string(),
                sentiment_score: (base_sentiment + normal(&mut rng) * 0.1).clamp(-1.0, 1.0),
                source: "synthetic-wire".to_string(),
                relevance: rng.gen_range(0.5..1.0),
                issuer_id,
                published_at: Utc::now(),
            }
        })
        .collect()
}
