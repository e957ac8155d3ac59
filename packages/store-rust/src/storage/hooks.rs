//! Record hook trait and the registry that owns registered hooks.
//!
//! A [`RecordHook`] is notified after every successful save or delete. Hooks
//! are held by a [`HookRegistry`], which is injected into databases through
//! the [`HookDispatcher`](super::HookDispatcher) rather than living in global
//! state, so independent stores (and tests) never share listeners.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use oddb_core::Record;
use parking_lot::RwLock;

use super::database::Database;

/// Kind of mutation that triggered a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordEvent {
    /// The key did not exist immediately before the save.
    Created,
    /// The key existed immediately before the save.
    Updated,
    /// The record was removed.
    Deleted,
}

impl fmt::Display for RecordEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        })
    }
}

/// Payload handed to each hook invocation.
#[derive(Clone)]
pub struct HookEvent {
    /// Database the mutation happened in.
    pub database: Arc<dyn Database>,
    /// The saved record, or the record as it was before deletion.
    pub record: Arc<Record>,
    pub kind: RecordEvent,
}

impl fmt::Debug for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookEvent")
            .field("database", &self.database.id())
            .field("record", &self.record)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Listener invoked asynchronously after a successful mutation.
///
/// Runs on the dispatcher's worker pool. Errors and panics are reported to
/// the dispatcher's error sink and never reach the writer.
///
/// Used as `Arc<dyn RecordHook>`.
#[async_trait]
pub trait RecordHook: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handle one mutation event.
    async fn on_event(&self, event: &HookEvent) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into a [`RecordHook`].
pub struct FnHook<F> {
    name: String,
    func: F,
}

impl<F> FnHook<F>
where
    F: Fn(&HookEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> RecordHook for FnHook<F>
where
    F: Fn(&HookEvent) -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: &HookEvent) -> anyhow::Result<()> {
        (self.func)(event)
    }
}

/// Append-only list of hooks.
///
/// No de-duplication and no unregistration: registering the same hook twice
/// makes it run twice per event.
#[derive(Default)]
pub struct HookRegistry {
    hooks: RwLock<Vec<Arc<dyn RecordHook>>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook.
    pub fn register(&self, hook: Arc<dyn RecordHook>) {
        self.hooks.write().push(hook);
    }

    /// Point-in-time copy of the registered hooks, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn RecordHook>> {
        self.hooks.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self
            .hooks
            .read()
            .iter()
            .map(|hook| hook.name().to_string())
            .collect();
        f.debug_struct("HookRegistry").field("hooks", &names).finish()
    }
}
