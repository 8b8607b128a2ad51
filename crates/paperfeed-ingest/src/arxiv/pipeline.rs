//! Incremental harvest pipeline
//!
//! [`IngestionController`] drives the fetch → parse → dedup → accumulate
//! loop for one run:
//!
//! 1. fetch the page at the cursor
//! 2. parse it (a malformed page aborts the run)
//! 3. keep records the ledger lets through and record their versions
//! 4. ask the [`BackoffGovernor`] what to do next: advance, pause, or stop
//!
//! Transport and parse failures propagate to the caller untouched. Running
//! out of retries is a normal end of run and yields a [`RunReport`].
//!
//! [`harvest`] wraps a run with the store lifecycle: load the ledger, run,
//! flush, and close the store on every exit path.

use paperfeed_common::Record;
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use super::client::FeedSource;
use super::config::HarvestConfig;
use super::governor::{BackoffGovernor, CursorMove, Verdict};
use super::ledger::VersionLedger;
use super::pacer::Pacer;
use super::parser::parse_page;
use super::storage::{flush_ledger, flush_records, RecordStore};
use crate::error::Result;

/// Everything a run owns besides its collaborators
#[derive(Debug, Clone)]
pub struct HarvestContext {
    pub config: HarvestConfig,
    pub ledger: VersionLedger,
}

impl HarvestContext {
    pub fn new(config: HarvestConfig, ledger: VersionLedger) -> Self {
        Self { config, ledger }
    }
}

/// Why a run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The last page was empty and no retries were left
    ExhaustedOnEmptyPage,
    /// The last page was short and no retries were left
    ExhaustedOnShortPage,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Kept records in acceptance order
    pub records: Vec<Record>,
    pub pages_fetched: usize,
    pub pauses: usize,
    pub records_skipped: usize,
    /// Cursor position when the run stopped
    pub next_offset: u64,
    pub termination: Termination,
}

impl RunReport {
    pub fn records_kept(&self) -> usize {
        self.records.len()
    }
}

struct RunState {
    next_offset: u64,
    accumulated: Vec<Record>,
    accepted: HashSet<(String, u32)>,
    pages_fetched: usize,
    pauses: usize,
    skipped: usize,
}

impl RunState {
    fn new(start_offset: u64) -> Self {
        Self {
            next_offset: start_offset,
            accumulated: Vec::new(),
            accepted: HashSet::new(),
            pages_fetched: 0,
            pauses: 0,
            skipped: 0,
        }
    }

    fn finish(self, termination: Termination) -> RunReport {
        RunReport {
            records: self.accumulated,
            pages_fetched: self.pages_fetched,
            pauses: self.pauses,
            records_skipped: self.skipped,
            next_offset: self.next_offset,
            termination,
        }
    }
}

pub struct IngestionController<'a> {
    source: &'a dyn FeedSource,
    pacer: &'a dyn Pacer,
    context: HarvestContext,
    governor: BackoffGovernor,
}

impl<'a> IngestionController<'a> {
    pub fn new(context: HarvestContext, source: &'a dyn FeedSource, pacer: &'a dyn Pacer) -> Self {
        let governor = BackoffGovernor::new(context.config.max_retries);
        Self {
            source,
            pacer,
            context,
            governor,
        }
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.context.ledger
    }

    pub fn governor(&self) -> &BackoffGovernor {
        &self.governor
    }

    pub fn into_context(self) -> HarvestContext {
        self.context
    }

    /// Run until the governor stops or a fetch/parse fails
    #[instrument(skip_all, fields(category = %self.context.config.category))]
    pub async fn run(&mut self) -> Result<RunReport> {
        let requested = self.context.config.page_size;
        let mut state = RunState::new(self.context.config.start_index);

        info!(
            start = state.next_offset,
            page_size = requested,
            policy = %self.context.config.replace_policy,
            known = self.context.ledger.len(),
            "Starting harvest"
        );

        loop {
            let raw = self.source.fetch_page(state.next_offset, requested).await?;
            state.pages_fetched += 1;

            let page = parse_page(&raw)?;
            let fetched = page.len();
            let kept = self.absorb(&mut state, page);
            info!(offset = state.next_offset, fetched, kept, "Fetched page");

            match self.governor.assess(fetched, requested) {
                Verdict::Continue => {
                    state.next_offset += u64::from(requested);
                }
                Verdict::Pause { wait, cursor } => {
                    warn!(
                        fetched,
                        requested,
                        remaining = self.governor.remaining(),
                        "Got less than a full page, pausing"
                    );
                    state.pauses += 1;
                    self.pacer.pause(wait).await;
                    if cursor == CursorMove::Advance {
                        state.next_offset += u64::from(requested);
                    }
                }
                Verdict::Stop => {
                    let termination = if fetched == 0 {
                        info!("Max attempts reached, stopping");
                        Termination::ExhaustedOnEmptyPage
                    } else {
                        info!("No more records to fetch, stopping");
                        Termination::ExhaustedOnShortPage
                    };
                    let report = state.finish(termination);
                    info!(
                        pages = report.pages_fetched,
                        kept = report.records_kept(),
                        skipped = report.records_skipped,
                        "Harvest finished"
                    );
                    return Ok(report);
                }
            }
        }
    }

    /// Filter one page through the ledger and accumulate survivors
    fn absorb(&mut self, state: &mut RunState, page: Vec<Record>) -> usize {
        let policy = self.context.config.replace_policy;
        let mut kept = 0;

        for record in page {
            if state
                .accepted
                .contains(&(record.identifier.clone(), record.version))
            {
                debug!(identifier = %record.identifier, version = record.version, "Already kept in this run");
                state.skipped += 1;
                continue;
            }

            if !self.context.ledger.should_keep(&record, policy) {
                debug!(identifier = %record.identifier, version = record.version, "Known identifier, skipping");
                state.skipped += 1;
                continue;
            }

            self.context.ledger.record_accepted(&record);
            state
                .accepted
                .insert((record.identifier.clone(), record.version));
            state.accumulated.push(record);
            kept += 1;
        }

        kept
    }
}

/// Outcome of [`harvest`]
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub report: RunReport,
    pub records_written: usize,
    pub ledger_rows_written: usize,
}

/// Run one harvest against an open store.
///
/// The store is consumed and closed before returning, whether the run
/// succeeded or failed. Nothing is flushed when the run fails.
pub async fn harvest<S>(
    config: HarvestConfig,
    source: &dyn FeedSource,
    pacer: &dyn Pacer,
    store: S,
) -> Result<HarvestSummary>
where
    S: RecordStore,
{
    let outcome = run_with_store(config, source, pacer, &store).await;
    let closed = store.close().await;

    match (outcome, closed) {
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close store after aborted run");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(e)) => Err(e),
        (Ok(summary), Ok(())) => Ok(summary),
    }
}

async fn run_with_store(
    config: HarvestConfig,
    source: &dyn FeedSource,
    pacer: &dyn Pacer,
    store: &dyn RecordStore,
) -> Result<HarvestSummary> {
    config.validate()?;

    let ledger = VersionLedger::load(store.load_versions().await?);
    info!(known = ledger.len(), "Loaded version ledger");

    let mut controller = IngestionController::new(HarvestContext::new(config, ledger), source, pacer);
    let report = controller.run().await?;
    let context = controller.into_context();

    let records_written = flush_records(store, &report.records).await?;
    let ledger_rows_written = flush_ledger(store, &context.ledger).await?;

    Ok(HarvestSummary {
        report,
        records_written,
        ledger_rows_written,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use crate::arxiv::pacer::tests::RecordingPacer;
    use crate::arxiv::parser::tests::feed_xml;
    use crate::error::HarvestError;
    use async_trait::async_trait;
    use paperfeed_common::{LedgerEntry, ReplacePolicy};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    /// Serves queued responses, then empty pages forever
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        responses: Mutex<VecDeque<Result<String>>>,
        offsets: Mutex<Vec<u64>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(pages: Vec<Vec<(&str, u32)>>) -> Self {
            let source = Self::default();
            for page in pages {
                source.push(Ok(feed_xml(&page)));
            }
            source
        }

        pub(crate) fn push(&self, response: Result<String>) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub(crate) fn offsets(&self) -> Vec<u64> {
            self.offsets.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch_page(&self, offset: u64, _page_size: u32) -> Result<String> {
            self.offsets.lock().unwrap().push(offset);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(feed_xml(&[])))
        }
    }

    fn config(page_size: u32, max_retries: u32, policy: ReplacePolicy) -> HarvestConfig {
        HarvestConfig::new("cs.CV")
            .with_page_size(page_size)
            .with_max_retries(max_retries)
            .with_replace_policy(policy)
    }

    fn ids(records: &[Record]) -> Vec<(&str, u32)> {
        records.iter().map(|r| r.key()).collect()
    }

    #[tokio::test]
    async fn test_full_then_short_then_empty_pages() {
        let source = ScriptedSource::new(vec![
            vec![("A", 1), ("B", 1)],
            vec![("C", 1)],
            vec![],
        ]);
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(2, 10, ReplacePolicy::Permissive),
            VersionLedger::default(),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let report = controller.run().await.unwrap();

        assert_eq!(ids(&report.records), vec![("A", 1), ("B", 1), ("C", 1)]);
        // Short page holds the cursor at 2, the empty retry moves past it
        assert_eq!(&source.offsets()[..4], &[0, 2, 2, 4]);
        assert_eq!(pacer.minutes(), vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(report.pages_fetched, 12);
        assert_eq!(report.pauses, 10);
        assert_eq!(report.termination, Termination::ExhaustedOnEmptyPage);
        assert_eq!(controller.governor().remaining(), 0);
    }

    #[tokio::test]
    async fn test_only_empty_pages_take_n_plus_one_fetches() {
        for max_retries in [0u32, 1, 3, 10] {
            let source = ScriptedSource::default();
            let pacer = RecordingPacer::default();
            let context = HarvestContext::new(
                config(100, max_retries, ReplacePolicy::Permissive),
                VersionLedger::default(),
            );
            let mut controller = IngestionController::new(context, &source, &pacer);

            let report = controller.run().await.unwrap();

            assert_eq!(source.offsets().len(), max_retries as usize + 1);
            assert_eq!(report.pages_fetched, max_retries as usize + 1);
            assert!(report.records.is_empty());
            assert_eq!(report.termination, Termination::ExhaustedOnEmptyPage);
        }
    }

    #[tokio::test]
    async fn test_full_page_refills_retry_budget() {
        let source = ScriptedSource::new(vec![
            vec![],
            vec![],
            vec![("A", 1), ("B", 1)],
        ]);
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(2, 3, ReplacePolicy::Permissive),
            VersionLedger::default(),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let report = controller.run().await.unwrap();

        // 2, 1 before the full page; 2, 1, 0 after it
        assert_eq!(pacer.minutes(), vec![2, 1, 2, 1, 0]);
        assert_eq!(ids(&report.records), vec![("A", 1), ("B", 1)]);
        assert_eq!(source.offsets(), vec![0, 2, 4, 6, 8, 10, 12]);
    }

    #[tokio::test]
    async fn test_short_page_is_kept_when_retries_are_exhausted() {
        let source = ScriptedSource::new(vec![vec![("A", 1), ("B", 2)]]);
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(5, 0, ReplacePolicy::Permissive),
            VersionLedger::default(),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let report = controller.run().await.unwrap();

        assert_eq!(ids(&report.records), vec![("A", 1), ("B", 2)]);
        assert_eq!(report.termination, Termination::ExhaustedOnShortPage);
        assert!(pacer.minutes().is_empty());
        assert_eq!(report.next_offset, 0);
    }

    #[tokio::test]
    async fn test_conservative_policy_drops_known_identifier() {
        let source = ScriptedSource::new(vec![vec![("X", 2), ("Y", 1)]]);
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(5, 0, ReplacePolicy::Conservative),
            VersionLedger::load(vec![LedgerEntry::new("X", 1)]),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let report = controller.run().await.unwrap();

        assert_eq!(ids(&report.records), vec![("Y", 1)]);
        assert_eq!(report.records_skipped, 1);
        assert_eq!(controller.ledger().version_of("X"), Some(1));
        assert_eq!(controller.ledger().version_of("Y"), Some(1));
    }

    #[tokio::test]
    async fn test_permissive_policy_replaces_known_version() {
        let source = ScriptedSource::new(vec![vec![("X", 2)]]);
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(5, 0, ReplacePolicy::Permissive),
            VersionLedger::load(vec![LedgerEntry::new("X", 1)]),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let report = controller.run().await.unwrap();

        assert_eq!(ids(&report.records), vec![("X", 2)]);
        assert_eq!(controller.ledger().version_of("X"), Some(2));
    }

    #[tokio::test]
    async fn test_permissive_policy_stores_lower_incoming_version() {
        let source = ScriptedSource::new(vec![vec![("X", 2)]]);
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(5, 0, ReplacePolicy::Permissive),
            VersionLedger::load(vec![LedgerEntry::new("X", 3)]),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let report = controller.run().await.unwrap();

        // records and ledger agree on the version that was kept
        assert_eq!(ids(&report.records), vec![("X", 2)]);
        assert_eq!(controller.ledger().version_of("X"), Some(2));
    }

    #[tokio::test]
    async fn test_retried_short_page_is_not_accumulated_twice() {
        for policy in [ReplacePolicy::Permissive, ReplacePolicy::Conservative] {
            let source = ScriptedSource::new(vec![
                vec![("A", 1)],
                vec![("A", 1), ("B", 1)],
            ]);
            let pacer = RecordingPacer::default();
            let context =
                HarvestContext::new(config(5, 1, policy), VersionLedger::default());
            let mut controller = IngestionController::new(context, &source, &pacer);

            let report = controller.run().await.unwrap();

            assert_eq!(ids(&report.records), vec![("A", 1), ("B", 1)], "{policy}");
            assert_eq!(report.records_skipped, 1);
            assert_eq!(source.offsets(), vec![0, 0]);
        }
    }

    #[tokio::test]
    async fn test_parse_error_aborts_run() {
        let source = ScriptedSource::new(vec![vec![("A", 1), ("B", 1)]]);
        source.push(Ok(feed_xml(&[("C", 1)]).replace("2021-01-01T00:00:00Z", "yesterday")));
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(2, 10, ReplacePolicy::Permissive),
            VersionLedger::default(),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let err = controller.run().await.unwrap_err();
        assert!(err.is_parse());
        assert_eq!(source.offsets(), vec![0, 2]);
        assert!(pacer.minutes().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let source = ScriptedSource::default();
        source.push(Err(HarvestError::Transport {
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            url: "http://example.test/api/query".to_string(),
        }));
        let pacer = RecordingPacer::default();
        let context = HarvestContext::new(
            config(2, 10, ReplacePolicy::Permissive),
            VersionLedger::default(),
        );
        let mut controller = IngestionController::new(context, &source, &pacer);

        let err = controller.run().await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(source.offsets(), vec![0]);
    }

    /// In-memory store that remembers whether it was closed
    #[derive(Default, Clone)]
    pub(crate) struct MemoryStore {
        pub(crate) versions: Arc<Mutex<Vec<LedgerEntry>>>,
        pub(crate) records: Arc<Mutex<Vec<Record>>>,
        pub(crate) closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn load_versions(&self) -> Result<Vec<LedgerEntry>> {
            Ok(self.versions.lock().unwrap().clone())
        }

        async fn append_records(&self, records: &[Record]) -> Result<usize> {
            self.records.lock().unwrap().extend_from_slice(records);
            Ok(records.len())
        }

        async fn append_versions(&self, entries: &[LedgerEntry]) -> Result<usize> {
            self.versions.lock().unwrap().extend_from_slice(entries);
            Ok(entries.len())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_harvest_flushes_and_closes() {
        let store = MemoryStore::default();
        store
            .versions
            .lock()
            .unwrap()
            .push(LedgerEntry::new("X", 1));

        let source = ScriptedSource::new(vec![vec![("X", 2), ("Y", 1)]]);
        let pacer = RecordingPacer::default();

        let summary = harvest(
            config(5, 0, ReplacePolicy::Conservative),
            &source,
            &pacer,
            store.clone(),
        )
        .await
        .unwrap();

        assert_eq!(summary.records_written, 1);
        assert_eq!(summary.ledger_rows_written, 2);
        assert_eq!(ids(&store.records.lock().unwrap()), vec![("Y", 1)]);
        assert_eq!(store.versions.lock().unwrap().len(), 3);
        assert!(store.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_harvest_flushes_ledger_without_new_records() {
        let store = MemoryStore::default();
        store
            .versions
            .lock()
            .unwrap()
            .push(LedgerEntry::new("X", 1));

        let source = ScriptedSource::default();
        let pacer = RecordingPacer::default();

        let summary = harvest(
            config(5, 0, ReplacePolicy::Permissive),
            &source,
            &pacer,
            store.clone(),
        )
        .await
        .unwrap();

        assert_eq!(summary.records_written, 0);
        assert_eq!(summary.ledger_rows_written, 1);
        assert!(store.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_harvest_closes_store_after_failure() {
        let store = MemoryStore::default();
        let source = ScriptedSource::default();
        source.push(Ok("<feed><entry><title>cut".to_string()));
        let pacer = RecordingPacer::default();

        let err = harvest(
            config(5, 3, ReplacePolicy::Permissive),
            &source,
            &pacer,
            store.clone(),
        )
        .await
        .unwrap_err();

        assert!(err.is_parse());
        assert!(store.closed.load(Ordering::SeqCst));
        assert!(store.records.lock().unwrap().is_empty());
        assert!(store.versions.lock().unwrap().is_empty());
    }
}
