//! Deduplicating merge of a fresh scrape into the published dataset.
//!
//! Every MLS number appears exactly once in the result. Published records
//! keep their position; records new to the dataset are appended in scrape
//! order, so identical input always produces identical output.

use crate::models::{ConflictPolicy, MlsNumber, Transaction};
use std::collections::HashMap;
use tracing::debug;

/// Result of merging a scrape into the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The merged dataset.
    pub records: Vec<Transaction>,
    /// Records whose MLS number was not in the snapshot.
    pub added: usize,
    /// Snapshot records replaced by a differing scraped record.
    pub updated: usize,
    /// Scraped records identical to what was already published.
    pub unchanged: usize,
    /// Differing scraped records ignored because the snapshot wins.
    pub conflicts_kept: usize,
    /// Duplicate MLS numbers collapsed within a single input.
    pub duplicates_collapsed: usize,
}

impl MergeOutcome {
    /// Whether the merge brought in records that were not published before.
    pub fn has_new_records(&self) -> bool {
        self.added > 0
    }
}

/// Merge `incoming` into `existing` by MLS number.
pub fn merge(
    existing: Vec<Transaction>,
    incoming: Vec<Transaction>,
    policy: ConflictPolicy,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    // The snapshot should already be unique; if not, its first row stands.
    let (mut records, collapsed) = dedup(existing, ConflictPolicy::PreferExisting);
    outcome.duplicates_collapsed += collapsed;

    let (batch, collapsed) = dedup(incoming, policy);
    outcome.duplicates_collapsed += collapsed;

    let mut index: HashMap<MlsNumber, usize> = records
        .iter()
        .enumerate()
        .map(|(pos, record)| (record.mls.clone(), pos))
        .collect();

    for record in batch {
        match index.get(&record.mls) {
            None => {
                index.insert(record.mls.clone(), records.len());
                records.push(record);
                outcome.added += 1;
            }
            Some(&pos) if records[pos] == record => {
                outcome.unchanged += 1;
            }
            Some(&pos) => match policy {
                ConflictPolicy::PreferNew => {
                    debug!("MLS {}: replacing published record", record.mls);
                    records[pos] = record;
                    outcome.updated += 1;
                }
                ConflictPolicy::PreferExisting => {
                    debug!("MLS {}: keeping published record", record.mls);
                    outcome.conflicts_kept += 1;
                }
            },
        }
    }

    outcome.records = records;
    outcome
}

/// Collapse duplicate MLS numbers within one input.
///
/// The surviving record sits at the position of the key's first occurrence.
/// Under `PreferNew` its contents are those of the last occurrence.
fn dedup(records: Vec<Transaction>, policy: ConflictPolicy) -> (Vec<Transaction>, usize) {
    let mut index: HashMap<MlsNumber, usize> = HashMap::with_capacity(records.len());
    let mut unique: Vec<Transaction> = Vec::with_capacity(records.len());
    let mut collapsed = 0;

    for record in records {
        match index.get(&record.mls) {
            Some(&pos) => {
                collapsed += 1;
                if policy == ConflictPolicy::PreferNew {
                    unique[pos] = record;
                }
            }
            None => {
                index.insert(record.mls.clone(), unique.len());
                unique.push(record);
            }
        }
    }

    if collapsed > 0 {
        debug!("Collapsed {} duplicate MLS numbers", collapsed);
    }

    (unique, collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cents;
    use chrono::NaiveDate;
    use std::collections::{BTreeMap, HashSet};

    fn txn(mls: &str, agent: &str, dollars: u64) -> Transaction {
        Transaction {
            mls: MlsNumber::new(mls).unwrap(),
            agent: agent.to_string(),
            agent_email: None,
            company: None,
            selling_agent: None,
            selling_agent_email: None,
            selling_company: None,
            price: Some(Cents::from_dollars(dollars)),
            price_raw: dollars.to_string(),
            close_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            city: None,
            zip: None,
            days_on_market: None,
            extra: BTreeMap::new(),
        }
    }

    fn keys(records: &[Transaction]) -> Vec<&str> {
        records.iter().map(|r| r.mls.as_str()).collect()
    }

    #[test]
    fn test_prefer_new_scenario() {
        let existing = vec![txn("100", "A", 200_000)];
        let incoming = vec![txn("100", "A", 250_000), txn("200", "B", 300_000)];

        let outcome = merge(existing, incoming, ConflictPolicy::PreferNew);

        assert_eq!(keys(&outcome.records), vec!["100", "200"]);
        assert_eq!(outcome.records[0].price, Some(Cents::from_dollars(250_000)));
        assert_eq!(outcome.records[1].price, Some(Cents::from_dollars(300_000)));
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.updated, 1);
        assert!(outcome.has_new_records());
    }

    #[test]
    fn test_prefer_existing_keeps_snapshot() {
        let existing = vec![txn("100", "A", 200_000)];
        let incoming = vec![txn("100", "A", 250_000), txn("200", "B", 300_000)];

        let outcome = merge(existing, incoming, ConflictPolicy::PreferExisting);

        assert_eq!(outcome.records[0].price, Some(Cents::from_dollars(200_000)));
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.conflicts_kept, 1);
    }

    #[test]
    fn test_every_key_exactly_once() {
        let existing = vec![txn("1", "A", 1), txn("2", "A", 2), txn("3", "B", 3)];
        let incoming = vec![
            txn("3", "B", 30),
            txn("4", "C", 4),
            txn("4", "C", 40),
            txn("5", "D", 5),
            txn("1", "A", 1),
        ];

        let expected: HashSet<&str> = ["1", "2", "3", "4", "5"].into_iter().collect();

        for policy in [ConflictPolicy::PreferNew, ConflictPolicy::PreferExisting] {
            let outcome = merge(existing.clone(), incoming.clone(), policy);
            let merged = keys(&outcome.records);
            let unique: HashSet<&str> = merged.iter().copied().collect();

            assert_eq!(merged.len(), unique.len(), "duplicates under {}", policy);
            assert_eq!(unique, expected, "lost keys under {}", policy);
        }
    }

    #[test]
    fn test_identity_laws() {
        let records = vec![txn("1", "A", 1), txn("2", "B", 2)];

        let with_empty_scrape = merge(records.clone(), Vec::new(), ConflictPolicy::PreferNew);
        assert_eq!(with_empty_scrape.records, records);
        assert!(!with_empty_scrape.has_new_records());

        let from_empty_snapshot = merge(Vec::new(), records.clone(), ConflictPolicy::PreferNew);
        assert_eq!(from_empty_snapshot.records, records);
        assert_eq!(from_empty_snapshot.added, 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = vec![txn("100", "A", 200_000), txn("150", "C", 90_000)];
        let incoming = vec![
            txn("100", "A", 250_000),
            txn("200", "B", 300_000),
            txn("200", "B", 310_000),
        ];

        for policy in [ConflictPolicy::PreferNew, ConflictPolicy::PreferExisting] {
            let once = merge(existing.clone(), incoming.clone(), policy);
            let twice = merge(once.records.clone(), incoming.clone(), policy);

            assert_eq!(twice.records, once.records);
            assert_eq!(twice.added, 0);
            assert_eq!(twice.updated, 0);
        }
    }

    #[test]
    fn test_duplicates_within_scrape() {
        let incoming = vec![
            txn("7", "A", 100),
            txn("8", "B", 200),
            txn("7", "A", 150),
        ];

        let newest = merge(Vec::new(), incoming.clone(), ConflictPolicy::PreferNew);
        assert_eq!(keys(&newest.records), vec!["7", "8"]);
        assert_eq!(newest.records[0].price, Some(Cents::from_dollars(150)));
        assert_eq!(newest.duplicates_collapsed, 1);

        let first = merge(Vec::new(), incoming, ConflictPolicy::PreferExisting);
        assert_eq!(first.records[0].price, Some(Cents::from_dollars(100)));
    }

    #[test]
    fn test_identical_record_is_unchanged() {
        let outcome = merge(
            vec![txn("1", "A", 10)],
            vec![txn("1", "A", 10)],
            ConflictPolicy::PreferNew,
        );

        assert_eq!(outcome.unchanged, 1);
        assert_eq!(outcome.updated, 0);
        assert!(!outcome.has_new_records());
    }
}
