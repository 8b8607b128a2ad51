//! Paperfeed Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the paperfeed workspace.
//!
//! # Overview
//!
//! - **Types**: harvested [`Record`]s, ledger entries and the replace policy
//! - **Error Handling**: [`PaperfeedError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use paperfeed_common::types::SourceLocator;
//!
//! fn main() -> paperfeed_common::Result<()> {
//!     let locator = SourceLocator::parse("http://arxiv.org/pdf/2101.00001v2")?;
//!     assert_eq!(locator.identifier, "2101.00001");
//!     assert_eq!(locator.version, 2);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PaperfeedError, Result};
pub use types::{LedgerEntry, Record, ReplacePolicy, SourceLocator};
