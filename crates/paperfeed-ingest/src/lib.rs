//! Paperfeed Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental harvesting of bibliographic records from paginated feed APIs.
//!
//! # Supported Data Sources
//!
//! - **arXiv**: the Atom query API, one category per run
//!
//! # Example
//!
//! ```no_run
//! use paperfeed_ingest::arxiv::{self, ArxivClient, CountdownPacer, HarvestConfig, JsonlStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = HarvestConfig::new("cs.CV").with_page_size(500);
//!     let client = ArxivClient::new(&config)?;
//!     let store = JsonlStore::open("./data/arxiv").await?;
//!
//!     let summary = arxiv::harvest(config, &client, &CountdownPacer::new(), store).await?;
//!     println!("stored {} records", summary.records_written);
//!     Ok(())
//! }
//! ```

pub mod arxiv;
pub mod error;

pub use error::{HarvestError, Result};
