use serde::{Deserialize, Serialize};

use crate::query::Query;

/// Registered interest in records selected by `query`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Unique key within the owning database.
    pub key: String,
    /// Matching criteria. Only `query.record_type` and `query.predicate`
    /// take part in matching; sorts are ignored.
    pub query: Query,
}

impl Subscription {
    #[must_use]
    pub fn new(key: impl Into<String>, query: Query) -> Self {
        Self {
            key: key.into(),
            query,
        }
    }
}
