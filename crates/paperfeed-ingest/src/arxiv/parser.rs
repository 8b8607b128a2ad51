//! Atom feed page parser
//!
//! Turns one raw page returned by the query API into [`Record`]s. Parsing is
//! a pure function of the page text: the same page always yields the same
//! records in the same order.
//!
//! Any malformed entry (missing link, bad version suffix, bad timestamp)
//! fails the whole page; no partial records are produced.

use paperfeed_common::types::{parse_feed_timestamp, SourceLocator};
use paperfeed_common::{PaperfeedError, Record};
use serde::Deserialize;

use crate::error::{HarvestError, Result};

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: String,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: String,
}

/// Parse one feed page into records.
///
/// A page without entries is not an error and yields an empty vector.
pub fn parse_page(raw: &str) -> Result<Vec<Record>> {
    let feed: AtomFeed = quick_xml::de::from_str(raw)?;

    feed.entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| entry.into_record(index))
        .collect()
}

impl AtomEntry {
    fn label(&self, index: usize) -> String {
        let id = self.id.trim();
        if id.is_empty() {
            format!("#{}", index)
        } else {
            id.to_string()
        }
    }

    fn into_record(self, index: usize) -> Result<Record> {
        let label = self.label(index);

        // The last listed link is the locator the version is read from
        let source_link = self
            .links
            .last()
            .map(|link| link.href.trim().to_string())
            .ok_or_else(|| {
                HarvestError::parse(
                    &label,
                    PaperfeedError::InvalidLocator("entry has no link".to_string()),
                )
            })?;

        let locator =
            SourceLocator::parse(&source_link).map_err(|e| HarvestError::parse(&label, e))?;

        let published_at = parse_feed_timestamp("published", self.published.as_deref().unwrap_or(""))
            .map_err(|e| HarvestError::parse(&label, e))?;
        let updated_at = parse_feed_timestamp("updated", self.updated.as_deref().unwrap_or(""))
            .map_err(|e| HarvestError::parse(&label, e))?;

        Ok(Record {
            identifier: locator.identifier,
            version: locator.version,
            title: collapse_whitespace(&self.title),
            summary: collapse_whitespace(&self.summary),
            authors: self
                .authors
                .iter()
                .map(|author| collapse_whitespace(&author.name))
                .collect(),
            tags: self
                .categories
                .into_iter()
                .map(|category| category.term.trim().to_string())
                .filter(|term| !term.is_empty())
                .collect(),
            source_link,
            published_at,
            updated_at,
        })
    }
}

/// Feed text wraps long titles and abstracts across lines
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
