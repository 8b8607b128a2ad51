//! HTTP transport for the query API

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::config::HarvestConfig;
use crate::error::{HarvestError, Result};

/// Source of raw feed pages
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the page starting at `offset` holding at most `page_size` entries.
    ///
    /// A non-success response is an error; an empty page is not.
    async fn fetch_page(&self, offset: u64, page_size: u32) -> Result<String>;
}

/// Query API client, one shared connection pool per run
pub struct ArxivClient {
    client: Client,
    base_url: String,
    category: String,
}

impl ArxivClient {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            category: config.category.clone(),
        })
    }

    /// Query parameters for one page, in the order the API documents them
    pub fn query_params(&self, offset: u64, page_size: u32) -> Vec<(&'static str, String)> {
        vec![
            ("search_query", format!("cat:{}", self.category)),
            ("start", offset.to_string()),
            ("sortBy", "lastUpdatedDate".to_string()),
            ("max_results", page_size.to_string()),
        ]
    }
}

#[async_trait]
impl FeedSource for ArxivClient {
    async fn fetch_page(&self, offset: u64, page_size: u32) -> Result<String> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&self.query_params(offset, page_size))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::Transport {
                status,
                url: response.url().to_string(),
            });
        }

        let body = response.text().await?;
        debug!(offset, page_size, bytes = body.len(), "Fetched feed page");
        Ok(body)
    }
}
