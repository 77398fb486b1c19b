//! Core library for the bond analytics AI service
//!
//! This crate provides:
//! - Four predictive models behind a uniform handle trait
//! - The retraining scheduler and model lifecycle management
//! - Background market/news data ingestion
//! - The inference request path with response caching
//! - Health checks and observability

pub mod error;
pub mod gateway;
pub mod health;
pub mod ingest;
pub mod model;
pub mod models;
pub mod observability;
pub mod serve;
pub mod training;

pub use error::{FetchError, LoadError, PredictError, TrainError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
