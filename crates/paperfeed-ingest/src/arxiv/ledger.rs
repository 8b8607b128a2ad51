//! Version ledger
//!
//! In-memory map from identifier to the last version seen, seeded once from
//! the `metadata` collection before any page is fetched. Entries are never
//! removed; a kept record always overwrites the stored version.

use paperfeed_common::{LedgerEntry, Record, ReplacePolicy};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    versions: HashMap<String, u32>,
}

impl VersionLedger {
    /// Build the ledger from persisted rows.
    ///
    /// The metadata collection is insert-only, so one identifier may appear
    /// several times; rows are read in insertion order and the last one wins.
    pub fn load<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = LedgerEntry>,
    {
        let versions = entries
            .into_iter()
            .map(|entry| (entry.identifier, entry.version))
            .collect();
        Self { versions }
    }

    /// Whether `record` should enter the accumulation buffer.
    ///
    /// Under [`ReplacePolicy::Conservative`] presence alone suppresses the
    /// record; versions are not compared, so a revised record is dropped too.
    pub fn should_keep(&self, record: &Record, policy: ReplacePolicy) -> bool {
        match policy {
            ReplacePolicy::Conservative => !self.contains(&record.identifier),
            ReplacePolicy::Permissive => true,
        }
    }

    /// Upsert the version of a kept record, replacing any stored version
    pub fn record_accepted(&mut self, record: &Record) {
        self.versions.insert(record.identifier.clone(), record.version);
    }

    pub fn version_of(&self, identifier: &str) -> Option<u32> {
        self.versions.get(identifier).copied()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.versions.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Full snapshot of the mapping, sorted by identifier
    pub fn entries(&self) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = self
            .versions
            .iter()
            .map(|(identifier, version)| LedgerEntry::new(identifier.clone(), *version))
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        entries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn record(identifier: &str, version: u32) -> Record {
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        Record {
            identifier: identifier.to_string(),
            version,
            title: format!("Title {identifier}"),
            summary: String::new(),
            authors: vec!["Ada Lovelace".to_string()],
            tags: ["cs.CV".to_string()].into_iter().collect(),
            source_link: format!("http://arxiv.org/pdf/{identifier}v{version}"),
            published_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_load_keeps_last_row_per_identifier() {
        let ledger = VersionLedger::load(vec![
            LedgerEntry::new("a", 1),
            LedgerEntry::new("a", 3),
            LedgerEntry::new("a", 2),
            LedgerEntry::new("b", 1),
        ]);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.version_of("a"), Some(2));
        assert_eq!(ledger.version_of("b"), Some(1));
        assert_eq!(ledger.version_of("c"), None);
    }

    #[test]
    fn test_conservative_policy_ignores_version() {
        let ledger = VersionLedger::load(vec![LedgerEntry::new("X", 1)]);
        assert!(!ledger.should_keep(&record("X", 1), ReplacePolicy::Conservative));
        assert!(!ledger.should_keep(&record("X", 2), ReplacePolicy::Conservative));
        assert!(ledger.should_keep(&record("Y", 1), ReplacePolicy::Conservative));
    }

    #[test]
    fn test_permissive_policy_keeps_everything() {
        let ledger = VersionLedger::load(vec![LedgerEntry::new("X", 1)]);
        assert!(ledger.should_keep(&record("X", 1), ReplacePolicy::Permissive));
        assert!(ledger.should_keep(&record("X", 2), ReplacePolicy::Permissive));
        assert!(ledger.should_keep(&record("Y", 1), ReplacePolicy::Permissive));
    }

    #[test]
    fn test_record_accepted_upserts() {
        let mut ledger = VersionLedger::load(vec![LedgerEntry::new("X", 1)]);
        ledger.record_accepted(&record("X", 2));
        ledger.record_accepted(&record("Y", 5));
        assert_eq!(ledger.version_of("X"), Some(2));
        assert_eq!(ledger.version_of("Y"), Some(5));
    }

    #[test]
    fn test_record_accepted_overwrites_a_higher_version() {
        let mut ledger = VersionLedger::load(vec![LedgerEntry::new("X", 3)]);
        let incoming = record("X", 2);
        assert!(ledger.should_keep(&incoming, ReplacePolicy::Permissive));

        ledger.record_accepted(&incoming);
        assert_eq!(ledger.version_of("X"), Some(2));
        assert_eq!(ledger.entries(), vec![LedgerEntry::new("X", 2)]);
    }

    #[test]
    fn test_contains_tracks_accepted_identifiers() {
        let mut ledger = VersionLedger::default();
        assert!(!ledger.contains("X"));
        ledger.record_accepted(&record("X", 1));
        assert!(ledger.contains("X"));
        assert!(!ledger.should_keep(&record("X", 7), ReplacePolicy::Conservative));
    }

    #[test]
    fn test_entries_snapshot_is_sorted() {
        let mut ledger = VersionLedger::load(vec![LedgerEntry::new("b", 1)]);
        ledger.record_accepted(&record("a", 2));
        assert_eq!(
            ledger.entries(),
            vec![LedgerEntry::new("a", 2), LedgerEntry::new("b", 1)]
        );
    }
}
