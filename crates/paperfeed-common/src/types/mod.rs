//! Common types used across paperfeed

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{PaperfeedError, Result};

/// Timestamp layout used by the remote feed for `published` and `updated`
pub const FEED_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// One harvested bibliographic record.
///
/// `identifier` is stable across revisions; `version` grows every time the
/// remote source republishes the item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier, e.g. `2101.00001`
    pub identifier: String,

    /// Positive revision number taken from the locator suffix
    pub version: u32,

    pub title: String,

    pub summary: String,

    /// Authors in listing order
    pub authors: Vec<String>,

    /// Category terms
    pub tags: BTreeSet<String>,

    /// Remote locator the identifier and version were split from
    pub source_link: String,

    pub published_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// The `(identifier, version)` pair that makes a record unique within a run
    pub fn key(&self) -> (&str, u32) {
        (self.identifier.as_str(), self.version)
    }
}

/// A row of the `metadata` collection: last known version of an identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub identifier: String,
    pub version: u32,
}

impl LedgerEntry {
    pub fn new(identifier: impl Into<String>, version: u32) -> Self {
        Self {
            identifier: identifier.into(),
            version,
        }
    }
}

/// Whether an identifier that is already known may be ingested again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplacePolicy {
    /// Presence of the identifier in the ledger suppresses the record,
    /// whatever its version
    Conservative,
    /// Every record is kept and overwrites the stored version
    #[default]
    Permissive,
}

impl std::str::FromStr for ReplacePolicy {
    type Err = PaperfeedError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" | "keep" => Ok(ReplacePolicy::Conservative),
            "permissive" | "replace" => Ok(ReplacePolicy::Permissive),
            _ => Err(PaperfeedError::InvalidPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for ReplacePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplacePolicy::Conservative => write!(f, "conservative"),
            ReplacePolicy::Permissive => write!(f, "permissive"),
        }
    }
}

/// Identifier and version split out of a remote locator.
///
/// The version is the numeric suffix after the last `v` of the final path
/// segment: `http://arxiv.org/pdf/2101.00001v2` is `2101.00001`, version 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    pub identifier: String,
    pub version: u32,
}

impl SourceLocator {
    pub fn parse(link: &str) -> Result<Self> {
        let trimmed = link.trim().trim_end_matches('/');
        let segment = trimmed.rsplit('/').next().unwrap_or(trimmed);

        let (identifier, suffix) = segment.rsplit_once('v').ok_or_else(|| {
            PaperfeedError::InvalidLocator(format!("no version marker in '{}'", link))
        })?;

        if identifier.is_empty() {
            return Err(PaperfeedError::InvalidLocator(format!(
                "empty identifier in '{}'",
                link
            )));
        }

        let version: u32 = suffix.parse().map_err(|e: std::num::ParseIntError| {
            PaperfeedError::InvalidVersion {
                locator: link.to_string(),
                reason: e.to_string(),
            }
        })?;

        if version == 0 {
            return Err(PaperfeedError::InvalidVersion {
                locator: link.to_string(),
                reason: "version must be positive".to_string(),
            });
        }

        Ok(Self {
            identifier: identifier.to_string(),
            version,
        })
    }
}

/// Parse a feed timestamp such as `2021-01-05T12:00:00Z`.
///
/// `field` only names the value in the error.
pub fn parse_feed_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), FEED_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| PaperfeedError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
