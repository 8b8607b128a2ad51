//! Error taxonomy for a harvest run
//!
//! Only transport and parse failures abort a run. Short or empty pages are
//! not errors: the backoff governor absorbs them, and exhausting its retries
//! ends the run normally.

use paperfeed_common::PaperfeedError;

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Remote feed returned {status} for {url}")]
    Transport {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed entry '{entry}': {source}")]
    Parse {
        entry: String,
        #[source]
        source: PaperfeedError,
    },

    #[error("Malformed feed page: {0}")]
    Feed(#[from] quick_xml::DeError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HarvestError {
    /// The remote could not be reached or answered with a non-success status
    pub fn is_transport(&self) -> bool {
        matches!(self, HarvestError::Transport { .. } | HarvestError::Http(_))
    }

    /// A page or one of its entries could not be turned into records
    pub fn is_parse(&self) -> bool {
        matches!(self, HarvestError::Parse { .. } | HarvestError::Feed(_))
    }

    pub(crate) fn parse(entry: impl Into<String>, source: PaperfeedError) -> Self {
        HarvestError::Parse {
            entry: entry.into(),
            source,
        }
    }
}

/// Locator, version and timestamp failures come from feed content and are
/// parse errors labelled with the offending value; a bad policy is a
/// configuration error.
impl From<PaperfeedError> for HarvestError {
    fn from(err: PaperfeedError) -> Self {
        let entry = match &err {
            PaperfeedError::InvalidLocator(_) => "locator".to_string(),
            PaperfeedError::InvalidVersion { locator, .. } => locator.clone(),
            PaperfeedError::InvalidTimestamp { value, .. } => value.clone(),
            PaperfeedError::InvalidPolicy(_) => return HarvestError::Config(err.to_string()),
        };
        HarvestError::parse(entry, err)
    }
}
