//! API client for communicating with the AI service

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Thin HTTP client over the service API.
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;
        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Per-model loaded state and last retrain time.
    pub async fn model_status(&self) -> Result<BTreeMap<String, ModelStatusRow>> {
        self.get("/v1/models/status").await
    }

    /// Force a retrain of one model.
    pub async fn force_retrain(&self, model: &str) -> Result<RetrainResponse> {
        self.post(&format!("/v1/models/{model}/retrain")).await
    }

    /// Raw health document.
    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get("/healthz").await
    }

    /// Raw readiness document.
    pub async fn readiness(&self) -> Result<serde_json::Value> {
        self.get("/readyz").await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatusRow {
    pub is_loaded: bool,
    pub last_trained: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrainResponse {
    pub model: String,
    pub success: bool,
}
