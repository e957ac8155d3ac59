//! Backend-neutral database, connection, and driver contracts.
//!
//! - [`Database`]: a named record scope with get/save/delete/query
//! - [`Connection`]: one open namespace, handing out its public database and
//!   per-user private databases
//! - [`Driver`]: opens connections for one backend (`fs`, `memory`)
//!
//! All storage operations are synchronous. The only asynchronous work is
//! hook dispatch, which a database hands to its [`HookDispatcher`] after a
//! successful mutation.

use std::path::Path;
use std::sync::Arc;

use oddb_core::{Query, Record};

use super::dispatcher::HookDispatcher;
use super::hooks::RecordHook;
use super::rows::Rows;
use super::subscription::SubscriptionStore;
use crate::error::StoreResult;

/// Identifier of a connection's shared database.
pub const PUBLIC_DB_ID: &str = "_public";

/// Identifier reported by every per-user database.
pub const PRIVATE_DB_ID: &str = "_private";

/// Directory (or scope) name holding a database's subscriptions.
pub const SUBSCRIPTION_DIR: &str = "_subscription";

/// A named scope of records.
///
/// Used as `Arc<dyn Database>`; hook events carry such a handle back to the
/// database that produced them.
pub trait Database: Send + Sync {
    /// The database identifier, e.g. [`PUBLIC_DB_ID`].
    fn id(&self) -> &str;

    /// Fetches the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// key is absent, or a decode/storage error.
    fn get(&self, key: &str) -> StoreResult<Record>;

    /// Inserts or fully replaces `record` under its key, creating the backing
    /// scope on first use, then dispatches `Created` or `Updated` hooks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRecord`](crate::StoreError::InvalidRecord)
    /// for bad input, or an encode/storage error. Any non-empty key is
    /// accepted. Hooks are not dispatched on error.
    fn save(&self, record: &Record) -> StoreResult<()>;

    /// Removes the record under `key` and dispatches `Deleted` hooks with the
    /// record as it was.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if the
    /// key is absent, or a storage error.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Runs `query` and returns a cursor over the results.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unsupported`](crate::StoreError::Unsupported)
    /// for more than one sort, or a decode/storage error.
    fn query(&self, query: &Query) -> StoreResult<Rows>;

    /// Subscriptions registered against this database.
    fn subscription_store(&self) -> &dyn SubscriptionStore;
}

/// An open namespace.
///
/// Used as `Arc<dyn Connection>`.
pub trait Connection: Send + Sync {
    /// Namespace this connection was opened for.
    fn namespace(&self) -> &str;

    /// The shared database of this namespace.
    fn public_db(&self) -> Arc<dyn Database>;

    /// The private database of `user_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`](crate::StoreError::InvalidKey) if
    /// `user_key` cannot name a storage scope.
    fn private_db(&self, user_key: &str) -> StoreResult<Arc<dyn Database>>;

    /// Registers a hook for every database of this connection.
    fn add_record_hook(&self, hook: Arc<dyn RecordHook>);

    /// Releases backend resources. Already-handed-out databases stay usable
    /// for as long as their backend allows.
    ///
    /// # Errors
    ///
    /// Returns a storage error if releasing resources fails.
    fn close(&self) -> StoreResult<()>;
}

/// Storage backend factory.
///
/// Used as `Arc<dyn Driver>`.
pub trait Driver: Send + Sync {
    /// Registered backend name.
    fn name(&self) -> &'static str;

    /// Opens `namespace` under `root`. Hooks registered on the returned
    /// connection go to `dispatcher`'s registry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`](crate::StoreError::InvalidKey) for
    /// an unusable namespace, or a storage error.
    fn open(
        &self,
        namespace: &str,
        root: &Path,
        dispatcher: HookDispatcher,
    ) -> StoreResult<Arc<dyn Connection>>;
}
