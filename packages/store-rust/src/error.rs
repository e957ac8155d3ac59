//! Error taxonomy for database operations.

use std::path::PathBuf;

use oddb_core::RecordError;

/// Errors returned synchronously by [`Database`](crate::storage::Database)
/// and [`SubscriptionStore`](crate::storage::SubscriptionStore) operations.
///
/// Hook failures never appear here; they go to the dispatcher's
/// [`HookErrorSink`](crate::storage::HookErrorSink).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{key:?} not found in database {database}")]
    NotFound { database: String, key: String },
    #[error("unsupported query: {0}")]
    Unsupported(String),
    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },
}

impl StoreError {
    pub(crate) fn not_found(database: &str, key: &str) -> Self {
        Self::NotFound {
            database: database.to_string(),
            key: key.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this is a [`StoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias used across the store.
pub type StoreResult<T> = Result<T, StoreError>;
