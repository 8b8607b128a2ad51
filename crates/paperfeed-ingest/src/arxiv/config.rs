//! Harvest configuration

use paperfeed_common::ReplacePolicy;
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// Default remote query endpoint
pub const DEFAULT_BASE_URL: &str = "http://export.arxiv.org/api/query";

/// Default number of records requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default retry budget; also the first pause length in minutes
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for one harvest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Remote taxonomy filter, e.g. "cs.CV"
    pub category: String,

    /// Offset of the first page
    pub start_index: u64,

    /// Records requested per page
    pub page_size: u32,

    pub replace_policy: ReplacePolicy,

    /// Paused retries allowed before the run stops
    pub max_retries: u32,

    /// Query endpoint of the remote feed
    pub base_url: String,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            category: String::new(),
            start_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
            replace_policy: ReplacePolicy::Permissive,
            max_retries: DEFAULT_MAX_RETRIES,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("paperfeed-ingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HarvestConfig {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Self::default()
        }
    }

    /// Load configuration from `PAPERFEED_*` environment variables
    ///
    /// - `PAPERFEED_CATEGORY` (required)
    /// - `PAPERFEED_START_INDEX`
    /// - `PAPERFEED_PAGE_SIZE`
    /// - `PAPERFEED_REPLACE_POLICY`: conservative or permissive
    /// - `PAPERFEED_MAX_RETRIES`
    /// - `PAPERFEED_BASE_URL`
    /// - `PAPERFEED_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let category = std::env::var("PAPERFEED_CATEGORY")
            .map_err(|_| HarvestError::Config("PAPERFEED_CATEGORY not set".to_string()))?;

        let mut config = Self::new(category);

        if let Some(start_index) = env_parse("PAPERFEED_START_INDEX")? {
            config.start_index = start_index;
        }
        if let Some(page_size) = env_parse("PAPERFEED_PAGE_SIZE")? {
            config.page_size = page_size;
        }
        if let Some(policy) = env_parse("PAPERFEED_REPLACE_POLICY")? {
            config.replace_policy = policy;
        }
        if let Some(max_retries) = env_parse("PAPERFEED_MAX_RETRIES")? {
            config.max_retries = max_retries;
        }
        if let Ok(base_url) = std::env::var("PAPERFEED_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(timeout) = env_parse("PAPERFEED_TIMEOUT")? {
            config.timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_start_index(mut self, start_index: u64) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.replace_policy = policy;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.category.trim().is_empty() {
            return Err(HarvestError::Config("Category cannot be empty".to_string()));
        }

        if self.page_size == 0 {
            return Err(HarvestError::Config(
                "Page size must be greater than 0".to_string(),
            ));
        }

        if self.base_url.is_empty() {
            return Err(HarvestError::Config("Base URL cannot be empty".to_string()));
        }

        if self.timeout_secs == 0 {
            return Err(HarvestError::Config(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| HarvestError::Config(format!("{}: {}", key, e))),
        Err(_) => Ok(None),
    }
}
