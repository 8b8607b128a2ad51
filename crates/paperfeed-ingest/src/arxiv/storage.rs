//! Persistence of harvested records and ledger entries
//!
//! Two logical collections are involved:
//!
//! - `metadata`: `{identifier, version}` rows, read in bulk before a run and
//!   appended in bulk after it
//! - `records`: harvested [`Record`]s, appended in bulk after a run
//!
//! Both are insert-only from the harvester's point of view. Backends:
//! [`JsonlStore`] (a directory of JSON-lines files) and, with the `database`
//! feature, [`PgStore`].

use async_trait::async_trait;
use paperfeed_common::{LedgerEntry, Record};
use std::path::{Path, PathBuf};
use tracing::info;

use super::ledger::VersionLedger;
use crate::error::{HarvestError, Result};

/// Metadata file name inside a [`JsonlStore`] directory
pub const METADATA_FILE: &str = "metadata.jsonl";

/// Records file name inside a [`JsonlStore`] directory
pub const RECORDS_FILE: &str = "records.jsonl";

/// Backend holding the `metadata` and `records` collections
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every persisted `{identifier, version}` row
    async fn load_versions(&self) -> Result<Vec<LedgerEntry>>;

    /// Append records, returning how many were written
    async fn append_records(&self, records: &[Record]) -> Result<usize>;

    /// Append ledger rows, returning how many were written
    async fn append_versions(&self, entries: &[LedgerEntry]) -> Result<usize>;

    /// Release the underlying connection
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T> RecordStore for Box<T>
where
    T: RecordStore + ?Sized,
{
    async fn load_versions(&self) -> Result<Vec<LedgerEntry>> {
        (**self).load_versions().await
    }

    async fn append_records(&self, records: &[Record]) -> Result<usize> {
        (**self).append_records(records).await
    }

    async fn append_versions(&self, entries: &[LedgerEntry]) -> Result<usize> {
        (**self).append_versions(entries).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// Bulk-append the accumulated records. No-op when there are none.
pub async fn flush_records(store: &dyn RecordStore, records: &[Record]) -> Result<usize> {
    if records.is_empty() {
        info!("No new records to store");
        return Ok(0);
    }

    let written = store.append_records(records).await?;
    info!(written, "Stored harvested records");
    Ok(written)
}

/// Bulk-append the full ledger mapping, not a delta. No-op when empty.
pub async fn flush_ledger(store: &dyn RecordStore, ledger: &VersionLedger) -> Result<usize> {
    if ledger.is_empty() {
        return Ok(0);
    }

    let written = store.append_versions(&ledger.entries()).await?;
    info!(written, "Stored ledger snapshot");
    Ok(written)
}

/// Store kept in a directory as `metadata.jsonl` and `records.jsonl`
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Open (creating if needed) a store directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        info!(dir = %dir.display(), "Opened JSON-lines store");
        Ok(Self { dir })
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn records_path(&self) -> PathBuf {
        self.dir.join(RECORDS_FILE)
    }

    /// Read every record row; used by tooling and tests
    pub async fn load_records(&self) -> Result<Vec<Record>> {
        read_lines(self.records_path()).await
    }
}

async fn read_lines<T>(path: PathBuf) -> Result<Vec<T>>
where
    T: serde::de::DeserializeOwned + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<Vec<T>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let rows = serde_jsonlines::json_lines(&path)?.collect::<std::io::Result<Vec<T>>>()?;
        Ok(rows)
    })
    .await
    .map_err(|e| HarvestError::Store(format!("reader task failed: {}", e)))?
}

async fn append_lines<T>(path: PathBuf, rows: Vec<T>) -> Result<usize>
where
    T: serde::Serialize + Send + 'static,
{
    let count = rows.len();
    tokio::task::spawn_blocking(move || serde_jsonlines::append_json_lines(&path, rows))
        .await
        .map_err(|e| HarvestError::Store(format!("writer task failed: {}", e)))??;
    Ok(count)
}

#[async_trait]
impl RecordStore for JsonlStore {
    async fn load_versions(&self) -> Result<Vec<LedgerEntry>> {
        read_lines(self.metadata_path()).await
    }

    async fn append_records(&self, records: &[Record]) -> Result<usize> {
        append_lines(self.records_path(), records.to_vec()).await
    }

    async fn append_versions(&self, entries: &[LedgerEntry]) -> Result<usize> {
        append_lines(self.metadata_path(), entries.to_vec()).await
    }

    async fn close(&self) -> Result<()> {
        info!(dir = %self.dir.display(), "Closed JSON-lines store");
        Ok(())
    }
}

#[cfg(feature = "database")]
pub use pg::PgStore;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use sqlx::postgres::{PgPool, PgPoolOptions};
    use sqlx::{Postgres, QueryBuilder};
    use std::time::Duration;

    /// Rows per INSERT statement, well below the bind-parameter limit
    const INSERT_CHUNK: usize = 1000;

    /// Postgres-backed store; the pool is opened once per run
    pub struct PgStore {
        pool: PgPool,
    }

    impl PgStore {
        /// Connect and apply the embedded migrations
        pub async fn connect(database_url: &str) -> Result<Self> {
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(30))
                .connect(database_url)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Connected to Postgres store");
            Ok(Self { pool })
        }
    }

    #[async_trait]
    impl RecordStore for PgStore {
        async fn load_versions(&self) -> Result<Vec<LedgerEntry>> {
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT identifier, version FROM metadata ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?;

            rows.into_iter()
                .map(|(identifier, version)| {
                    u32::try_from(version)
                        .map(|version| LedgerEntry::new(identifier.clone(), version))
                        .map_err(|_| {
                            HarvestError::Store(format!(
                                "metadata row for '{}' has version {}",
                                identifier, version
                            ))
                        })
                })
                .collect()
        }

        async fn append_records(&self, records: &[Record]) -> Result<usize> {
            let mut tx = self.pool.begin().await?;

            for chunk in records.chunks(INSERT_CHUNK) {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                    "INSERT INTO records (identifier, version, title, summary, authors, tags, \
                     source_link, published_at, updated_at) ",
                );
                builder.push_values(chunk, |mut row, record| {
                    row.push_bind(record.identifier.clone())
                        .push_bind(i64::from(record.version))
                        .push_bind(record.title.clone())
                        .push_bind(record.summary.clone())
                        .push_bind(record.authors.clone())
                        .push_bind(record.tags.iter().cloned().collect::<Vec<String>>())
                        .push_bind(record.source_link.clone())
                        .push_bind(record.published_at)
                        .push_bind(record.updated_at);
                });
                builder.build().execute(&mut *tx).await?;
            }

            tx.commit().await?;
            Ok(records.len())
        }

        async fn append_versions(&self, entries: &[LedgerEntry]) -> Result<usize> {
            let mut tx = self.pool.begin().await?;

            for chunk in entries.chunks(INSERT_CHUNK) {
                let mut builder: QueryBuilder<Postgres> =
                    QueryBuilder::new("INSERT INTO metadata (identifier, version) ");
                builder.push_values(chunk, |mut row, entry| {
                    row.push_bind(entry.identifier.clone())
                        .push_bind(i64::from(entry.version));
                });
                builder.build().execute(&mut *tx).await?;
            }

            tx.commit().await?;
            Ok(entries.len())
        }

        async fn close(&self) -> Result<()> {
            self.pool.close().await;
            info!("Closed Postgres store");
            Ok(())
        }
    }
}
