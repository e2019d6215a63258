//! Holes in the persisted identifier sequence.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::identifier::Identifier;

/// A run of missing identifiers strictly between two present ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub start: Identifier,
    pub end: Identifier,
    pub count: u64,
}

impl Gap {
    pub fn identifiers(&self) -> impl Iterator<Item = Identifier> {
        (self.start.get()..=self.end.get()).map(Identifier::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSummary {
    pub year: u32,
    pub count: usize,
    pub min: Identifier,
    pub max: Identifier,
    /// `max - min + 1`: identifiers the year would hold with no holes.
    pub expected_span: u64,
    pub missing: u64,
    pub gaps: Vec<Gap>,
}

/// Gaps in ascending order.
pub fn find_gaps<I>(identifiers: I) -> Vec<Gap>
where
    I: IntoIterator<Item = Identifier>,
{
    let sorted: BTreeSet<Identifier> = identifiers.into_iter().collect();
    sorted
        .iter()
        .zip(sorted.iter().skip(1))
        .filter_map(|(lo, hi)| {
            let distance = hi.get() - lo.get();
            (distance > 1).then(|| Gap {
                start: lo.next(),
                end: Identifier::new(hi.get() - 1),
                count: distance - 1,
            })
        })
        .collect()
}

/// Largest gaps first; ties keep ascending order.
pub fn largest_first(mut gaps: Vec<Gap>) -> Vec<Gap> {
    gaps.sort_by(|a, b| b.count.cmp(&a.count));
    gaps
}

/// One summary per year present, ascending. Gaps never cross a year.
pub fn year_summaries<I>(identifiers: I) -> Vec<YearSummary>
where
    I: IntoIterator<Item = Identifier>,
{
    let mut by_year: BTreeMap<u32, BTreeSet<Identifier>> = BTreeMap::new();
    for id in identifiers {
        by_year.entry(id.year()).or_default().insert(id);
    }

    by_year
        .into_iter()
        .filter_map(|(year, ids)| {
            let min = *ids.first()?;
            let max = *ids.last()?;
            let expected_span = max.get() - min.get() + 1;
            let count = ids.len();
            Some(YearSummary {
                year,
                count,
                min,
                max,
                expected_span,
                missing: expected_span - count as u64,
                gaps: find_gaps(ids),
            })
        })
        .collect()
}

/// Every identifier missing inside the listed years' gaps, ascending. An
/// empty `years` means every year present.
pub fn missing_identifiers(summaries: &[YearSummary], years: &BTreeSet<u32>) -> Vec<Identifier> {
    summaries
        .iter()
        .filter(|s| years.is_empty() || years.contains(&s.year))
        .flat_map(|s| s.gaps.iter().flat_map(Gap::identifiers))
        .collect()
}
