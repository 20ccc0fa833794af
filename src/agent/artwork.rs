//! Artwork lookups against the Art Institute of Chicago public API

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_ARTWORK_API: &str = "https://api.artic.edu/api/v1";

/// Something that can name an artwork by id
#[async_trait]
pub trait ArtworkSource: Send + Sync {
    async fn artwork_title(&self, artwork_id: u64) -> Result<String>;
}

pub struct ArticClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ArtworkResponse {
    data: ArtworkData,
}

#[derive(Debug, Deserialize)]
struct ArtworkData {
    title: Option<String>,
}

impl ArticClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build artwork HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ArtworkSource for ArticClient {
    async fn artwork_title(&self, artwork_id: u64) -> Result<String> {
        let url = format!(
            "{}/artworks/{}",
            self.base_url.trim_end_matches('/'),
            artwork_id
        );
        debug!("Fetching artwork {}", artwork_id);

        let response = self
            .client
            .get(&url)
            .query(&[("fields", "title")])
            .send()
            .await
            .context("Failed to reach artwork API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Artwork API error: {} - {}", status, body);
        }

        let parsed: ArtworkResponse = response
            .json()
            .await
            .context("Failed to parse artwork response")?;

        parsed
            .data
            .title
            .filter(|t| !t.is_empty())
            .with_context(|| format!("Artwork {} has no title", artwork_id))
    }
}
