//! Single-key ordering of query results.

use oddb_core::{compare, legacy_less, sort_by_less, CompareMode, Record, Sort, SortOrder, Value};

/// Orders records by one field path.
///
/// Sort keys are extracted once per record before sorting. In
/// [`CompareMode::Strict`] the sort is stable and `Descending` reverses the
/// comparison, so equal keys keep their base order in both directions. In
/// [`CompareMode::Legacy`] `Descending` negates the legacy `less` predicate.
#[derive(Debug, Clone)]
pub struct RecordSorter {
    sort: Sort,
    mode: CompareMode,
}

impl RecordSorter {
    #[must_use]
    pub fn new(sort: Sort, mode: CompareMode) -> Self {
        Self { sort, mode }
    }

    /// Sorts `records`, consuming and returning them.
    #[must_use]
    pub fn sort(&self, records: Vec<Record>) -> Vec<Record> {
        let descending = self.sort.order == SortOrder::Descending;
        let keyed: Vec<(Value, Record)> = records
            .into_iter()
            .map(|record| (record.get_owned(&self.sort.key_path), record))
            .collect();

        let sorted = match self.mode {
            CompareMode::Strict => {
                let mut keyed = keyed;
                keyed.sort_by(|(a, _), (b, _)| {
                    let ordering = compare(a, b);
                    if descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
                keyed
            }
            CompareMode::Legacy => {
                let mut less = |(a, _): &(Value, Record), (b, _): &(Value, Record)| {
                    legacy_less(a, b) != descending
                };
                sort_by_less(keyed, &mut less)
            }
        };

        sorted.into_iter().map(|(_, record)| record).collect()
    }
}
