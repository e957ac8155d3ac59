//! Query execution pipeline shared by all drivers.
//!
//! Drivers supply candidates through [`RecordScanner`]; the
//! [`QueryExecutor`] validates the query, filters candidates in-process,
//! applies the optional sort, and wraps the result in a [`Rows`] cursor.

use oddb_core::{CompareMode, Query, Record};
use tracing::debug;

use super::rows::Rows;
use super::sorter::RecordSorter;
use crate::error::{StoreError, StoreResult};

/// Enumerates decoded candidate records for a record type.
///
/// Implementations may pre-select cheaply (e.g. by a text prefix) and may
/// return records of other types; the executor re-checks the type on the
/// decoded record. A storage scope that does not exist yet yields an empty
/// `Vec`, not an error.
pub trait RecordScanner {
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if any candidate fails to decode, or
    /// [`StoreError::Io`] if the storage scope cannot be read.
    fn scan(&self, record_type: &str) -> StoreResult<Vec<Record>>;
}

/// Runs queries against a [`RecordScanner`].
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryExecutor {
    mode: CompareMode,
}

impl QueryExecutor {
    #[must_use]
    pub fn new(mode: CompareMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn compare_mode(&self) -> CompareMode {
        self.mode
    }

    /// Executes `query` and returns a cursor over the ordered result set.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Unsupported`] if more than one sort is requested;
    ///   storage is not touched in that case.
    /// - Any scanner error. No partial result set is returned.
    pub fn execute(&self, query: &Query, scanner: &dyn RecordScanner) -> StoreResult<Rows> {
        if query.sorts.len() > 1 {
            return Err(StoreError::Unsupported(format!(
                "multiple sort orders are not supported (got {})",
                query.sorts.len()
            )));
        }

        metrics::counter!("oddb_queries_total").increment(1);

        let mut records: Vec<Record> = scanner
            .scan(&query.record_type)?
            .into_iter()
            .filter(|record| query.selects(record))
            .collect();

        if let Some(sort) = query.sorts.first() {
            records = RecordSorter::new(sort.clone(), self.mode).sort(records);
        }

        debug!(
            record_type = %query.record_type,
            matched = records.len(),
            sorted = !query.sorts.is_empty(),
            "query executed"
        );
        Ok(Rows::from_records(records))
    }
}
