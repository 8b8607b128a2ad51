//! arXiv incremental harvest
//!
//! Pages through the query API for one category, sorted by last update,
//! and persists only records whose identifiers the version ledger lets
//! through.
//!
//! Architecture:
//! - Config: run options and defaults
//! - Client: HTTP transport returning raw Atom pages
//! - Parser: Atom page -> records
//! - Ledger / Governor: dedup and throttling state machines
//! - Pipeline: controller loop and store lifecycle
//! - Storage: `metadata` and `records` collections

pub mod client;
pub mod config;
pub mod governor;
pub mod ledger;
pub mod pacer;
pub mod parser;
pub mod pipeline;
pub mod storage;

// Re-export main types
pub use client::{ArxivClient, FeedSource};
pub use config::HarvestConfig;
pub use governor::{BackoffGovernor, CursorMove, Verdict};
pub use ledger::VersionLedger;
pub use pacer::{CountdownPacer, Pacer};
pub use parser::parse_page;
pub use pipeline::{
    harvest, HarvestContext, HarvestSummary, IngestionController, RunReport, Termination,
};
#[cfg(feature = "database")]
pub use storage::PgStore;
pub use storage::{flush_ledger, flush_records, JsonlStore, RecordStore};
