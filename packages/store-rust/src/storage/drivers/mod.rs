//! [`Driver`] implementations.
//!
//! - [`FileDriver`] (`fs`): one JSON file per record
//! - [`MemoryDriver`] (`memory`): `DashMap`-backed, for tests and ephemeral data

mod fs;
mod memory;

use std::sync::Arc;

pub use fs::{FileConnection, FileDatabase, FileDriver, FileSubscriptionStore};
pub use memory::{MemoryConnection, MemoryDatabase, MemoryDriver, MemorySubscriptionStore};

use super::database::Driver;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Names accepted by [`driver_by_name`].
pub const DRIVER_NAMES: [&str; 2] = ["fs", "memory"];

/// Looks up a driver by its registered name.
///
/// # Errors
///
/// Returns [`StoreError::Unsupported`] for an unknown name.
pub fn driver_by_name(name: &str, config: StoreConfig) -> StoreResult<Arc<dyn Driver>> {
    match name {
        "fs" => Ok(Arc::new(FileDriver::new(config))),
        "memory" => Ok(Arc::new(MemoryDriver::new(config))),
        other => Err(StoreError::Unsupported(format!(
            "unknown driver {other:?} (expected one of {})",
            DRIVER_NAMES.join(", ")
        ))),
    }
}

/// Checks that `name` can name a namespace or user scope.
///
/// Scopes become directory names in the `fs` backend, so path separators and
/// NUL are rejected. Names starting with `.` are used for temporary files and
/// names starting with `_` are reserved for internal scopes. Record and
/// subscription keys are not subject to these rules.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] describing the first violated rule.
pub fn validate_scope(name: &str) -> StoreResult<()> {
    let reason = if name.is_empty() {
        "key is empty"
    } else if name.contains(['/', '\\', '\0']) {
        "key contains a path separator or NUL"
    } else if name.starts_with('.') {
        "key starts with '.'"
    } else if name.starts_with('_') {
        "key starts with reserved prefix '_'"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidKey {
        key: name.to_string(),
        reason,
    })
}

/// Subscription keys may be any non-empty string.
pub(crate) fn validate_subscription_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey {
            key: String::new(),
            reason: "key is empty",
        });
    }
    Ok(())
}
