//! Merging freshly captured records into a persisted dataset.

use std::collections::HashSet;

use crate::identifier::Identifier;
use crate::record::Record;

/// Which side keeps its row when both hold the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// Fresh captures replace persisted rows. Used by backfill so refreshed
    /// years overwrite stale data.
    FreshWins,
    /// Persisted rows are kept; only unseen identifiers are added. Used by
    /// incremental and explicit collection.
    ExistingWins,
}

/// Result of a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    /// Unique by identifier, ascending.
    pub merged: Vec<Record>,
    /// Fresh records whose identifier was not persisted before.
    pub added: usize,
    /// Persisted rows replaced by a fresh capture (`FreshWins` only).
    pub replaced: usize,
    /// The fresh records that ended up in `merged`, ascending. Under
    /// `ExistingWins` these are exactly the rows to append.
    pub kept_fresh: Vec<Record>,
}

impl Reconciled {
    /// Highest identifier in the merged dataset; the next resume watermark.
    pub fn max_identifier(&self) -> Option<Identifier> {
        self.merged.last().map(|r| r.identifier)
    }
}

/// Concatenates both sides in precedence order, keeps the first row seen
/// for each identifier, and sorts ascending. Duplicates within one side
/// also resolve to their first occurrence.
pub fn reconcile(fresh: Vec<Record>, existing: Vec<Record>, precedence: Precedence) -> Reconciled {
    let existing_ids: HashSet<Identifier> = existing.iter().map(|r| r.identifier).collect();
    let fresh_first = precedence == Precedence::FreshWins;

    let (first, second) = if fresh_first {
        (fresh, existing)
    } else {
        (existing, fresh)
    };

    let mut seen = HashSet::with_capacity(first.len() + second.len());
    let mut merged = Vec::with_capacity(first.len() + second.len());
    let mut kept_fresh = Vec::new();
    let mut added = 0;
    let mut replaced = 0;

    for (is_fresh, record) in first
        .into_iter()
        .map(|r| (fresh_first, r))
        .chain(second.into_iter().map(|r| (!fresh_first, r)))
    {
        if !seen.insert(record.identifier) {
            continue;
        }
        if is_fresh {
            if existing_ids.contains(&record.identifier) {
                replaced += 1;
            } else {
                added += 1;
            }
            kept_fresh.push(record.clone());
        }
        merged.push(record);
    }

    merged.sort_by_key(|r| r.identifier);
    kept_fresh.sort_by_key(|r| r.identifier);

    Reconciled {
        merged,
        added,
        replaced,
        kept_fresh,
    }
}

/// Merges several datasets in order; the first dataset holding an
/// identifier keeps it. Output is ascending.
pub fn merge_datasets(datasets: Vec<Vec<Record>>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Record> = datasets
        .into_iter()
        .flatten()
        .filter(|r| seen.insert(r.identifier))
        .collect();
    merged.sort_by_key(|r| r.identifier);
    merged
}
