//! Query parameters: record type, placeholder predicate, and sort order.

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Sort direction for query ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Short alias for [`SortOrder::Ascending`].
    pub const ASC: Self = Self::Ascending;
    /// Short alias for [`SortOrder::Descending`].
    pub const DESC: Self = Self::Descending;
}

/// Field and direction to order query results by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    /// Field path looked up on each record via [`Record::get_owned`].
    pub key_path: String,
    pub order: SortOrder,
}

impl Sort {
    #[must_use]
    pub fn asc(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            order: SortOrder::Ascending,
        }
    }

    #[must_use]
    pub fn desc(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Row-level condition attached to a query.
///
/// Placeholder: only the unconditional predicate exists. New variants slot
/// in here together with their arm in [`Predicate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum Predicate {
    /// Matches every record.
    #[default]
    Always,
}

impl Predicate {
    /// Whether `record` satisfies this predicate.
    #[must_use]
    pub fn evaluate(&self, _record: &Record) -> bool {
        match self {
            Self::Always => true,
        }
    }

    #[must_use]
    pub fn is_always(&self) -> bool {
        matches!(self, Self::Always)
    }
}

/// Query over the records of one type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Selects records whose discriminator equals this value.
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Predicate::is_always")]
    pub predicate: Predicate,
    /// At most one entry is supported by the executor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<Sort>,
}

impl Query {
    /// Creates an unsorted query for `record_type`.
    #[must_use]
    pub fn new(record_type: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            predicate: Predicate::Always,
            sorts: Vec::new(),
        }
    }

    /// Appends a sort entry.
    #[must_use]
    pub fn sort_by(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Whether `record` is selected by this query (type and predicate).
    #[must_use]
    pub fn selects(&self, record: &Record) -> bool {
        record.record_type == self.record_type && self.predicate.evaluate(record)
    }
}
