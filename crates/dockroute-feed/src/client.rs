//! Feed HTTP client.

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::record::{parse_feed, FeedBatch};

/// HTTP client for one regulatory feed endpoint.
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    url: String,
}

impl FeedClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the current set of feed zones.
    pub async fn fetch_zones(&self) -> Result<FeedBatch> {
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to fetch airspace feed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Feed request failed: {} {}", status, body));
        }

        let payload: Value = response
            .json()
            .await
            .context("Failed to parse feed response")?;
        let batch = parse_feed(payload)?;
        tracing::debug!(
            url = %self.url,
            zones = batch.zones.len(),
            rejected = batch.rejected.len(),
            "Feed fetched"
        );
        Ok(batch)
    }
}
