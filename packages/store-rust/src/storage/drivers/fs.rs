//! File-per-record backend (`fs`).
//!
//! Layout under the driver root:
//!
//! ```text
//! <root>/<namespace>/_public/<key>          public database records
//! <root>/<namespace>/<user_key>/<key>       private database records
//! <db-dir>/_subscription/<key>              subscriptions of that database
//! ```
//!
//! Each record file holds compact JSON whose first member is the `_type`
//! discriminator. Queries compare that byte prefix before decoding, so files
//! of other types are skipped without being parsed. Writes land in a
//! dot-prefixed temp file that is renamed over the target.
//!
//! Record and subscription keys are stored as file names through a reversible
//! percent-encoding (`encode_key`), so any non-empty key round-trips.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use oddb_core::{Query, Record, Subscription};
use serde::Serialize;
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

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

/// File name for `key`.
///
/// `%`, path separators, and NUL become `%XX` escapes of their bytes, as does
/// a leading `.` or `_`, so encoded names never collide with temp files or
/// internal directories.
pub(crate) fn encode_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for (i, c) in key.char_indices() {
        let escape = matches!(c, '%' | '/' | '\\' | '\0') || (i == 0 && matches!(c, '.' | '_'));
        if escape {
            name.push_str(&format!("%{:02X}", u32::from(c)));
        } else {
            name.push(c);
        }
    }
    name
}

/// Key stored under file name `name`, or `None` if `name` is not the
/// canonical encoding of any key.
pub(crate) fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    let key = String::from_utf8(out).ok()?;
    (!key.is_empty() && encode_key(&key) == name).then_some(key)
}

/// Data files in `dir` as `(key, path)` pairs, sorted by key.
///
/// A missing directory has no entries. Subdirectories, temp files (`.`),
/// internal names (`_`), non-UTF-8 names, and names that are not a key
/// encoding are skipped.
fn list_entries(dir: &Path) -> StoreResult<Vec<(String, PathBuf)>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::io(dir, err)),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|err| StoreError::io(dir, err))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        let Some(key) = decode_key(&name) else {
            continue;
        };
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => entries.push((key, entry.path())),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io(entry.path(), err)),
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// File contents, or `None` if the file does not exist.
fn read_file(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

/// Removes a file. Returns `false` if it did not exist.
fn remove_file(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(StoreError::io(path, err)),
    }
}

/// Serializes `value` to `<dir>/<name>` through a temp file and rename,
/// creating `dir` if needed.
fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T, what: &str) -> StoreResult<()> {
    let mut bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        what: what.to_string(),
        source,
    })?;
    bytes.push(b'\n');

    fs::create_dir_all(dir).map_err(|err| StoreError::io(dir, err))?;

    let tmp = dir.join(format!(
        ".{name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp, &bytes).map_err(|err| StoreError::io(&tmp, err))?;

    let target = dir.join(name);
    if let Err(err) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(target, err));
    }
    Ok(())
}

fn decode_record(key: &str, bytes: &[u8]) -> StoreResult<Record> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
        what: format!("record {key:?}"),
        source,
    })
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Subscriptions stored one JSON file each under `<db-dir>/_subscription`.
#[derive(Debug, Clone)]
pub struct FileSubscriptionStore {
    scope: String,
    dir: PathBuf,
}

impl FileSubscriptionStore {
    /// Store for the database `database_id` rooted at `db_dir`.
    #[must_use]
    pub fn new(database_id: &str, db_dir: &Path) -> Self {
        Self {
            scope: format!("{database_id}/{SUBSCRIPTION_DIR}"),
            dir: db_dir.join(SUBSCRIPTION_DIR),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }

    fn decode(key: &str, bytes: &[u8]) -> StoreResult<Subscription> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
            what: format!("subscription {key:?}"),
            source,
        })
    }
}

impl SubscriptionStore for FileSubscriptionStore {
    fn get_subscription(&self, key: &str) -> StoreResult<Subscription> {
        if key.is_empty() {
            return Err(StoreError::not_found(&self.scope, key));
        }
        let bytes = read_file(&self.path(key))?
            .ok_or_else(|| StoreError::not_found(&self.scope, key))?;
        Self::decode(key, &bytes)
    }

    fn save_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        validate_subscription_key(&subscription.key)?;
        write_json(
            &self.dir,
            &encode_key(&subscription.key),
            subscription,
            &format!("subscription {:?}", subscription.key),
        )?;
        debug!(scope = %self.scope, key = %subscription.key, "subscription saved");
        Ok(())
    }

    fn delete_subscription(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || !remove_file(&self.path(key))? {
            return Err(StoreError::not_found(&self.scope, key));
        }
        debug!(scope = %self.scope, key, "subscription deleted");
        Ok(())
    }

    fn all_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        let mut subscriptions = Vec::new();
        for (key, path) in list_entries(&self.dir)? {
            if let Some(bytes) = read_file(&path)? {
                subscriptions.push(Self::decode(&key, &bytes)?);
            }
        }
        Ok(subscriptions)
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

struct FileDatabaseInner {
    id: String,
    dir: PathBuf,
    executor: QueryExecutor,
    dispatcher: HookDispatcher,
    subscriptions: FileSubscriptionStore,
}

impl RecordScanner for FileDatabaseInner {
    fn scan(&self, record_type: &str) -> StoreResult<Vec<Record>> {
        let prefix = Record::type_prefix(record_type);
        let mut records = Vec::new();
        for (key, path) in list_entries(&self.dir)? {
            // Removed between listing and reading.
            let Some(bytes) = read_file(&path)? else {
                continue;
            };
            if bytes.starts_with(prefix.as_bytes()) {
                records.push(decode_record(&key, &bytes)?);
            }
        }
        Ok(records)
    }
}

/// A database stored as one directory of record files.
///
/// Cheap to clone; clones share the same directory and dispatcher.
#[derive(Clone)]
pub struct FileDatabase {
    inner: Arc<FileDatabaseInner>,
}

impl FileDatabase {
    /// Database `id` backed by `dir`. The directory is created by the first
    /// save.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        dir: impl Into<PathBuf>,
        config: &StoreConfig,
        dispatcher: HookDispatcher,
    ) -> Self {
        let id = id.into();
        let dir = dir.into();
        let subscriptions = FileSubscriptionStore::new(&id, &dir);
        Self {
            inner: Arc::new(FileDatabaseInner {
                id,
                dir,
                executor: QueryExecutor::new(config.compare_mode),
                dispatcher,
                subscriptions,
            }),
        }
    }

    /// Directory holding this database's record files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn handle(&self) -> Arc<dyn Database> {
        Arc::new(self.clone())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.inner.dir.join(encode_key(key))
    }
}

impl std::fmt::Debug for FileDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileDatabase")
            .field("id", &self.inner.id)
            .field("dir", &self.inner.dir)
            .finish_non_exhaustive()
    }
}

impl Database for FileDatabase {
    fn id(&self) -> &str {
        &self.inner.id
    }

    fn get(&self, key: &str) -> StoreResult<Record> {
        if key.is_empty() {
            return Err(StoreError::not_found(&self.inner.id, key));
        }
        let bytes = read_file(&self.path(key))?
            .ok_or_else(|| StoreError::not_found(&self.inner.id, key))?;
        decode_record(key, &bytes)
    }

    fn save(&self, record: &Record) -> StoreResult<()> {
        record.validate()?;

        let path = self.path(&record.key);
        let existed = path
            .try_exists()
            .map_err(|err| StoreError::io(&path, err))?;
        write_json(
            &self.inner.dir,
            &encode_key(&record.key),
            record,
            &format!("record {:?}", record.key),
        )?;

        let event = if existed {
            RecordEvent::Updated
        } else {
            RecordEvent::Created
        };
        debug!(db = %self.inner.id, key = %record.key, event = %event, "record saved");
        self.inner.dispatcher.dispatch(self.handle(), record.clone(), event);
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let record = self.get(key)?;
        if !remove_file(&self.path(key))? {
            return Err(StoreError::not_found(&self.inner.id, key));
        }

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

// ---------------------------------------------------------------------------
// Connection and driver
// ---------------------------------------------------------------------------

/// An open namespace directory.
pub struct FileConnection {
    namespace: String,
    dir: PathBuf,
    config: StoreConfig,
    dispatcher: HookDispatcher,
    public: FileDatabase,
}

impl FileConnection {
    fn new(namespace: &str, dir: PathBuf, config: StoreConfig, dispatcher: HookDispatcher) -> Self {
        let public = FileDatabase::new(
            PUBLIC_DB_ID,
            dir.join(PUBLIC_DB_ID),
            &config,
            dispatcher.clone(),
        );
        Self {
            namespace: namespace.to_string(),
            dir,
            config,
            dispatcher,
            public,
        }
    }

    /// Namespace directory, `<root>/<namespace>`.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for FileConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConnection")
            .field("namespace", &self.namespace)
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl Connection for FileConnection {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn public_db(&self) -> Arc<dyn Database> {
        Arc::new(self.public.clone())
    }

    fn private_db(&self, user_key: &str) -> StoreResult<Arc<dyn Database>> {
        validate_scope(user_key)?;
        Ok(Arc::new(FileDatabase::new(
            PRIVATE_DB_ID,
            self.dir.join(user_key),
            &self.config,
            self.dispatcher.clone(),
        )))
    }

    fn add_record_hook(&self, hook: Arc<dyn RecordHook>) {
        self.dispatcher.register(hook);
    }

    fn close(&self) -> StoreResult<()> {
        debug!(namespace = %self.namespace, "fs connection closed");
        Ok(())
    }
}

/// Driver for the `fs` backend.
#[derive(Debug, Clone, Default)]
pub struct FileDriver {
    config: StoreConfig,
}

impl FileDriver {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }
}

impl Driver for FileDriver {
    fn name(&self) -> &'static str {
        "fs"
    }

    fn open(
        &self,
        namespace: &str,
        root: &Path,
        dispatcher: HookDispatcher,
    ) -> StoreResult<Arc<dyn Connection>> {
        validate_scope(namespace)?;
        let dir = root.join(namespace);
        debug!(namespace, dir = %dir.display(), "fs connection opened");
        Ok(Arc::new(FileConnection::new(
            namespace,
            dir,
            self.config.clone(),
            dispatcher,
        )))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
