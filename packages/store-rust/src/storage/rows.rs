//! Forward-only result cursor returned by [`Database::query`](super::Database::query).
//!
//! [`Rows`] wraps a pluggable [`RowIter`] source and enforces the cursor
//! lifecycle: `Open` until the source reports end-of-stream (or the caller
//! closes it), then `Exhausted` for good. Already-yielded records are owned
//! values and stay valid after the cursor is closed or dropped.

use std::fmt;

use oddb_core::Record;

use crate::error::StoreResult;

/// Source of rows behind a [`Rows`] cursor.
///
/// Implementations may stream from storage; [`MemoryRows`] serves a result
/// set that was fully materialized by the query executor.
pub trait RowIter: Send {
    /// Advance and return the next record, or `None` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying source fails to produce a row.
    fn next_row(&mut self) -> StoreResult<Option<Record>>;

    /// Release any held resources. Called at most once by [`Rows`].
    ///
    /// # Errors
    ///
    /// Returns an error if releasing resources fails.
    fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// Row source over an in-memory, already ordered result set.
#[derive(Debug)]
pub struct MemoryRows {
    records: std::vec::IntoIter<Record>,
}

impl MemoryRows {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl RowIter for MemoryRows {
    fn next_row(&mut self) -> StoreResult<Option<Record>> {
        Ok(self.records.next())
    }

    fn close(&mut self) -> StoreResult<()> {
        // Drop unread records.
        self.records = Vec::new().into_iter();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    Exhausted,
}

/// Single-owner, single-pass cursor over query results.
///
/// Iterating yields `StoreResult<Record>`; once `None` is returned the cursor
/// is exhausted and stays so. [`Rows::close`] is idempotent and safe at any
/// point.
pub struct Rows {
    source: Box<dyn RowIter>,
    state: CursorState,
}

impl Rows {
    /// Wraps an arbitrary row source.
    #[must_use]
    pub fn new(source: Box<dyn RowIter>) -> Self {
        Self {
            source,
            state: CursorState::Open,
        }
    }

    /// Cursor over an already ordered result set.
    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self::new(Box::new(MemoryRows::new(records)))
    }

    /// Cursor over zero records.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_records(Vec::new())
    }

    /// Whether the cursor has reached its terminal state.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Releases the underlying source. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns the source's error if releasing resources fails on the first
    /// call.
    pub fn close(&mut self) -> StoreResult<()> {
        if self.state == CursorState::Exhausted {
            return Ok(());
        }
        self.state = CursorState::Exhausted;
        self.source.close()
    }

    /// Drains the remaining records into a `Vec` and closes the cursor.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by the source.
    pub fn collect_records(mut self) -> StoreResult<Vec<Record>> {
        let records = self.by_ref().collect::<StoreResult<Vec<_>>>()?;
        self.close()?;
        Ok(records)
    }
}

impl Iterator for Rows {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == CursorState::Exhausted {
            return None;
        }
        match self.source.next_row() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => self.close().err().map(Err),
            Err(err) => {
                self.state = CursorState::Exhausted;
                let _ = self.source.close();
                Some(Err(err))
            }
        }
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows").field("state", &self.state).finish_non_exhaustive()
    }
}
