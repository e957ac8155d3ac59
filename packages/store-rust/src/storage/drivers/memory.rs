//! In-memory backend (`memory`) backed by [`DashMap`].
//!
//! Data lives as long as the connection that created it. Suitable for tests
//! and ephemeral data; follows the same key and scope rules as the `fs`
//! backend so code can switch drivers without behavior changes.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use oddb_core::{Query, Record, Subscription};
use tracing::debug;

use super::{validate_scope, validate_subscription_key};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::storage::database::{
    Connection, Database, Driver, PRIVATE_DB_ID, PUBLIC_DB_ID, SUBSCRIPTION_DIR,
};
use crate::storage::dispatcher::HookDispatcher;
use crate::storage::executor::{QueryExecutor, RecordScanner};
use crate::storage::hooks::{RecordEvent, RecordHook};
use crate::storage::rows::Rows;
use crate::storage::subscription::SubscriptionStore;

/// Subscriptions held in a [`DashMap`] keyed by subscription key.
#[derive(Debug)]
pub struct MemorySubscriptionStore {
    scope: String,
    entries: DashMap<String, Subscription>,
}

impl MemorySubscriptionStore {
    #[must_use]
    pub fn new(database_id: &str) -> Self {
        Self {
            scope: format!("{database_id}/{SUBSCRIPTION_DIR}"),
            entries: DashMap::new(),
        }
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn get_subscription(&self, key: &str) -> StoreResult<Subscription> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found(&self.scope, key))
    }

    fn save_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        validate_subscription_key(&subscription.key)?;
        self.entries
            .insert(subscription.key.clone(), subscription.clone());
        Ok(())
    }

    fn delete_subscription(&self, key: &str) -> StoreResult<()> {
        self.entries
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(&self.scope, key))
    }

    fn all_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        let mut all: Vec<Subscription> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }
}

struct MemoryDatabaseInner {
    id: String,
    entries: DashMap<String, Record>,
    executor: QueryExecutor,
    dispatcher: HookDispatcher,
    subscriptions: MemorySubscriptionStore,
}

impl RecordScanner for MemoryDatabaseInner {
    fn scan(&self, record_type: &str) -> StoreResult<Vec<Record>> {
        let mut records: Vec<Record> = self
            .entries
            .iter()
            .filter(|entry| entry.value().record_type == record_type)
            .map(|entry| entry.value().clone())
            .collect();
        // Key order, matching the fs backend's directory listing.
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }
}

/// A database held entirely in memory.
///
/// Cheap to clone; clones share the same entries and dispatcher.
#[derive(Clone)]
pub struct MemoryDatabase {
    inner: Arc<MemoryDatabaseInner>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(id: impl Into<String>, config: &StoreConfig, dispatcher: HookDispatcher) -> Self {
        let id = id.into();
        let subscriptions = MemorySubscriptionStore::new(&id);
        Self {
            inner: Arc::new(MemoryDatabaseInner {
                id,
                entries: DashMap::new(),
                executor: QueryExecutor::new(config.compare_mode),
                dispatcher,
                subscriptions,
            }),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    fn handle(&self) -> Arc<dyn Database> {
        Arc::new(self.clone())
    }
}

impl std::fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("id", &self.inner.id)
            .field("records", &self.inner.entries.len())
            .finish_non_exhaustive()
    }
}

impl Database for MemoryDatabase {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn get(&self, key: &str) -> StoreResult<Record> {
        self.inner
            .entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::not_found(&self.inner.id, key))
    }

    fn save(&self, record: &Record) -> StoreResult<()> {
        record.validate()?;

        let previous = self.inner.entries.insert(record.key.clone(), record.clone());
        let event = if previous.is_some() {
            RecordEvent::Updated
        } else {
            RecordEvent::Created
        };
        debug!(db = %self.inner.id, key = %record.key, event = %event, "record saved");
        self.inner.dispatcher.dispatch(self.handle(), record.clone(), event);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let (_, record) = self
            .inner
            .entries
            .remove(key)
            .ok_or_else(|| StoreError::not_found(&self.inner.id, key))?;

        debug!(db = %self.inner.id, key, event = %RecordEvent::Deleted, "record deleted");
        self.inner
            .dispatcher
            .dispatch(self.handle(), record, RecordEvent::Deleted);
        Ok(())
    }

    fn query(&self, query: &Query) -> StoreResult<Rows> {
        self.inner.executor.execute(query, self.inner.as_ref())
    }

    fn subscription_store(&self) -> &dyn SubscriptionStore {
        &self.inner.subscriptions
    }
}

/// An in-memory namespace. Private databases are created on first use and
/// kept for the lifetime of the connection.
pub struct MemoryConnection {
    namespace: String,
    config: StoreConfig,
    dispatcher: HookDispatcher,
    public: MemoryDatabase,
    private: DashMap<String, MemoryDatabase>,
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("namespace", &self.namespace)
            .field("private_dbs", &self.private.len())
            .finish_non_exhaustive()
    }
}

impl Connection for MemoryConnection {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn public_db(&self) -> Arc<dyn Database> {
        Arc::new(self.public.clone())
    }

    fn private_db(&self, user_key: &str) -> StoreResult<Arc<dyn Database>> {
        validate_scope(user_key)?;
        let db = self
            .private
            .entry(user_key.to_string())
            .or_insert_with(|| {
                MemoryDatabase::new(PRIVATE_DB_ID, &self.config, self.dispatcher.clone())
            })
            .clone();
        Ok(Arc::new(db))
    }

    fn add_record_hook(&self, hook: Arc<dyn RecordHook>) {
        self.dispatcher.register(hook);
    }

    fn close(&self) -> StoreResult<()> {
        debug!(namespace = %self.namespace, "memory connection closed");
        Ok(())
    }
}

/// Driver for the `memory` backend. The root path is ignored.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    config: StoreConfig,
}

impl MemoryDriver {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

impl Driver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(
        &self,
        namespace: &str,
        _root: &Path,
        dispatcher: HookDispatcher,
    ) -> StoreResult<Arc<dyn Connection>> {
        validate_scope(namespace)?;
        debug!(namespace, "memory connection opened");
        Ok(Arc::new(MemoryConnection {
            namespace: namespace.to_string(),
            public: MemoryDatabase::new(PUBLIC_DB_ID, &self.config, dispatcher.clone()),
            config: self.config.clone(),
            dispatcher,
            private: DashMap::new(),
        }))
    }
}
