//! Paperfeed Ingest - incremental feed harvester

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use paperfeed_common::logging::{init_logging, LogConfig, LogLevel};
use paperfeed_common::ReplacePolicy;
use paperfeed_ingest::arxiv::{
    self,
    config::{DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_PAGE_SIZE},
    ArxivClient, CountdownPacer, HarvestConfig, JsonlStore, RecordStore, VersionLedger,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "paperfeed-ingest")]
#[command(author, version, about = "Incremental arXiv feed harvester")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StoreKind {
    /// metadata.jsonl and records.jsonl under --data-dir
    Jsonl,
    /// Postgres at DATABASE_URL
    Postgres,
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Store backend
    #[arg(long, value_enum, default_value = "jsonl", env = "PAPERFEED_STORE")]
    store: StoreKind,

    /// Directory of the JSON-lines store
    #[arg(long, default_value = "./data/arxiv", env = "PAPERFEED_DATA_DIR")]
    data_dir: PathBuf,

    /// Postgres connection string for `--store postgres`
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest one category into the store
    Harvest {
        /// Category to harvest, e.g. cs.CV
        #[arg(short, long, env = "PAPERFEED_CATEGORY")]
        category: String,

        /// Offset of the first page
        #[arg(long, default_value_t = 0, env = "PAPERFEED_START_INDEX")]
        start_index: u64,

        /// Records requested per page
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE, env = "PAPERFEED_PAGE_SIZE")]
        page_size: u32,

        /// conservative keeps stored identifiers untouched, permissive stores new versions
        #[arg(long, default_value = "permissive", env = "PAPERFEED_REPLACE_POLICY")]
        replace_policy: ReplacePolicy,

        /// Pauses allowed before giving up; also the first pause in minutes
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, env = "PAPERFEED_MAX_RETRIES")]
        max_retries: u32,

        /// Query endpoint
        #[arg(long, default_value = DEFAULT_BASE_URL, env = "PAPERFEED_BASE_URL")]
        base_url: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Report the identifiers known to the store
    Ledger {
        #[command(flatten)]
        store: StoreArgs,
    },
}

async fn open_store(args: &StoreArgs) -> Result<Box<dyn RecordStore>> {
    match args.store {
        StoreKind::Jsonl => Ok(Box::new(JsonlStore::open(&args.data_dir).await?)),
        StoreKind::Postgres => open_postgres(args.database_url.as_deref()).await,
    }
}

#[cfg(feature = "database")]
async fn open_postgres(database_url: Option<&str>) -> Result<Box<dyn RecordStore>> {
    let Some(url) = database_url else {
        bail!("--store postgres requires DATABASE_URL");
    };
    Ok(Box::new(arxiv::PgStore::connect(url).await?))
}

#[cfg(not(feature = "database"))]
async fn open_postgres(_database_url: Option<&str>) -> Result<Box<dyn RecordStore>> {
    bail!("paperfeed-ingest was built without the `database` feature")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("paperfeed-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Harvest {
            category,
            start_index,
            page_size,
            replace_policy,
            max_retries,
            base_url,
            store,
        } => {
            let config = HarvestConfig::new(category)
                .with_start_index(start_index)
                .with_page_size(page_size)
                .with_replace_policy(replace_policy)
                .with_max_retries(max_retries)
                .with_base_url(base_url);

            let client = ArxivClient::new(&config)?;
            let store = open_store(&store).await?;

            let summary = arxiv::harvest(config, &client, &CountdownPacer::new(), store).await?;

            info!(
                pages = summary.report.pages_fetched,
                pauses = summary.report.pauses,
                kept = summary.report.records_kept(),
                skipped = summary.report.records_skipped,
                written = summary.records_written,
                ledger_rows = summary.ledger_rows_written,
                next_offset = summary.report.next_offset,
                termination = ?summary.report.termination,
                "Harvest complete"
            );
        },
        Command::Ledger { store } => {
            let store = open_store(&store).await?;
            let loaded = store.load_versions().await;
            store.close().await?;

            let ledger = VersionLedger::load(loaded?);
            info!(known = ledger.len(), "Loaded version ledger");
            println!("{}", ledger.len());
        },
    }

    Ok(())
}
