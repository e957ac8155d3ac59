//! Supervised, bounded-concurrency execution of record hooks.
//!
//! Every successful save or delete hands its event to [`HookDispatcher::dispatch`],
//! which returns immediately. Each hook invocation becomes its own tokio task:
//!
//! 1. Work beyond `max_pending` queued-or-running invocations is shed.
//! 2. A semaphore caps concurrently running invocations at `max_concurrent`.
//! 3. The hook body runs in a nested task so a panic is caught as a
//!    `JoinError` instead of tearing down the worker.
//! 4. Errors, panics, and shed work are reported to a [`HookErrorSink`].
//!
//! There is no ordering between invocations, and the writer never observes
//! their outcome.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use oddb_core::Record;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::database::Database;
use super::hooks::{HookEvent, HookRegistry, RecordEvent, RecordHook};
use crate::config::HookConfig;

// ---------------------------------------------------------------------------
// Failure reporting
// ---------------------------------------------------------------------------

/// Why a hook invocation did not complete successfully.
#[derive(Debug)]
pub enum HookFailureCause {
    /// The hook returned an error.
    Failed(anyhow::Error),
    /// The hook panicked; carries the panic message when it was a string.
    Panicked(String),
    /// The invocation was dropped because too much work was pending.
    Shed,
}

impl fmt::Display for HookFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => write!(f, "hook returned error: {err:#}"),
            Self::Panicked(msg) => write!(f, "hook panicked: {msg}"),
            Self::Shed => f.write_str("hook dropped: too many pending invocations"),
        }
    }
}

/// A failed hook invocation, as reported to a [`HookErrorSink`].
#[derive(Debug)]
pub struct HookFailure {
    pub hook: String,
    pub database: String,
    pub key: String,
    pub event: RecordEvent,
    pub cause: HookFailureCause,
}

/// Destination for hook failures.
///
/// Used as `Arc<dyn HookErrorSink>`.
pub trait HookErrorSink: Send + Sync {
    fn report(&self, failure: HookFailure);
}

/// Default sink: logs shed work at `warn` level and other failures at
/// `error` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl HookErrorSink for TracingErrorSink {
    fn report(&self, failure: HookFailure) {
        if matches!(failure.cause, HookFailureCause::Shed) {
            warn!(
                hook = %failure.hook,
                db = %failure.database,
                key = %failure.key,
                event = %failure.event,
                "record hook shed"
            );
            return;
        }
        error!(
            hook = %failure.hook,
            db = %failure.database,
            key = %failure.key,
            event = %failure.event,
            cause = %failure.cause,
            "record hook failed"
        );
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Counters describing dispatcher activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Invocations handed to the dispatcher (including shed ones).
    pub dispatched: u64,
    /// Invocations whose hook returned `Ok`.
    pub completed: u64,
    /// Invocations that returned an error or panicked.
    pub failed: u64,
    /// Invocations dropped because `max_pending` was reached.
    pub shed: u64,
}

struct DispatcherInner {
    registry: Arc<HookRegistry>,
    sink: Arc<dyn HookErrorSink>,
    handle: Handle,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    drain_lock: Mutex<()>,
    pending: AtomicUsize,
    max_pending: usize,
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    shed: AtomicU64,
}

/// Cloneable handle to a hook worker pool and its [`HookRegistry`].
///
/// All clones share the same registry, limits, and counters.
#[derive(Clone)]
pub struct HookDispatcher {
    inner: Arc<DispatcherInner>,
}

impl HookDispatcher {
    /// Creates a dispatcher that spawns onto `handle`.
    ///
    /// A `max_concurrent` of 0 is treated as 1.
    #[must_use]
    pub fn new(
        handle: Handle,
        config: &HookConfig,
        registry: Arc<HookRegistry>,
        sink: Arc<dyn HookErrorSink>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                sink,
                handle,
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                tracker: TaskTracker::new(),
                drain_lock: Mutex::new(()),
                pending: AtomicUsize::new(0),
                max_pending: config.max_pending,
                dispatched: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                shed: AtomicU64::new(0),
            }),
        }
    }

    /// Dispatcher with a fresh registry and the [`TracingErrorSink`].
    #[must_use]
    pub fn with_defaults(handle: Handle, config: &HookConfig) -> Self {
        Self::new(
            handle,
            config,
            Arc::new(HookRegistry::new()),
            Arc::new(TracingErrorSink),
        )
    }

    /// The registry consulted on every dispatch.
    #[must_use]
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.inner.registry
    }

    /// Shorthand for `registry().register(hook)`.
    pub fn register(&self, hook: Arc<dyn RecordHook>) {
        self.inner.registry.register(hook);
    }

    /// Schedules every registered hook for `record` and returns immediately.
    pub fn dispatch(&self, database: Arc<dyn Database>, record: Record, kind: RecordEvent) {
        let hooks = self.inner.registry.snapshot();
        if hooks.is_empty() {
            return;
        }

        let event = HookEvent {
            database,
            record: Arc::new(record),
            kind,
        };
        debug!(
            db = %event.database.id(),
            key = %event.record.key,
            event = %kind,
            hooks = hooks.len(),
            "dispatching record hooks"
        );

        for hook in hooks {
            self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("oddb_hooks_dispatched_total").increment(1);

            if self.inner.pending.fetch_add(1, Ordering::AcqRel) >= self.inner.max_pending {
                self.inner.pending.fetch_sub(1, Ordering::AcqRel);
                self.inner.shed.fetch_add(1, Ordering::Relaxed);
                self.inner.report(hook.name(), &event, HookFailureCause::Shed);
                continue;
            }

            let inner = Arc::clone(&self.inner);
            let event = event.clone();
            self.inner
                .tracker
                .spawn_on(inner.run(hook, event), &self.inner.handle);
        }
    }

    /// Waits until every invocation dispatched so far has finished.
    ///
    /// Invocations dispatched while draining are waited for as well.
    /// Concurrent callers drain one at a time, so none of them can reopen
    /// the tracker while another is still waiting on it.
    pub async fn drain(&self) {
        let _guard = self.inner.drain_lock.lock().await;
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        self.inner.tracker.reopen();
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            completed: self.inner.completed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            shed: self.inner.shed.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher")
            .field("registry", &self.inner.registry)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl DispatcherInner {
    async fn run(self: Arc<Self>, hook: Arc<dyn RecordHook>, event: HookEvent) {
        // The semaphore is never closed.
        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return;
        };

        let task_hook = Arc::clone(&hook);
        let task_event = event.clone();
        let outcome = self
            .handle
            .spawn(async move { task_hook.on_event(&task_event).await })
            .await;
        self.pending.fetch_sub(1, Ordering::AcqRel);

        match outcome {
            Ok(Ok(())) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.report(hook.name(), &event, HookFailureCause::Failed(err));
            }
            Err(join_err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let message = if join_err.is_panic() {
                    panic_message(join_err.into_panic())
                } else {
                    "task cancelled".to_string()
                };
                self.report(hook.name(), &event, HookFailureCause::Panicked(message));
            }
        }
    }

    fn report(&self, hook: &str, event: &HookEvent, cause: HookFailureCause) {
        metrics::counter!("oddb_hook_failures_total").increment(1);
        self.sink.report(HookFailure {
            hook: hook.to_string(),
            database: event.database.id().to_string(),
            key: event.record.key.clone(),
            event: event.kind,
            cause,
        });
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::storage::drivers::MemoryDatabase;
    use crate::storage::hooks::FnHook;

    /// Sink that keeps every failure for inspection.
    #[derive(Default)]
    struct CollectingSink {
        failures: Mutex<Vec<HookFailure>>,
    }

    impl HookErrorSink for CollectingSink {
        fn report(&self, failure: HookFailure) {
            self.failures.lock().push(failure);
        }
    }

    /// Hook that sleeps and tracks the peak number of concurrent runs.
    struct SlowHook {
        running: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl RecordHook for SlowHook {
        fn name(&self) -> &str {
            "slow"
        }

        async fn on_event(&self, _event: &HookEvent) -> anyhow::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn dispatcher(config: &HookConfig) -> (HookDispatcher, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = HookDispatcher::new(
            Handle::current(),
            config,
            Arc::new(HookRegistry::new()),
            Arc::clone(&sink) as Arc<dyn HookErrorSink>,
        );
        (dispatcher, sink)
    }

    fn database(dispatcher: &HookDispatcher) -> Arc<dyn Database> {
        Arc::new(MemoryDatabase::new("_public", &crate::StoreConfig::default(), dispatcher.clone()))
    }

    #[tokio::test]
    async fn no_hooks_dispatches_nothing() {
        let (dispatcher, sink) = dispatcher(&HookConfig::default());
        dispatcher.dispatch(database(&dispatcher), Record::new("k", "t"), RecordEvent::Created);
        dispatcher.drain().await;
        assert_eq!(dispatcher.stats(), DispatchStats::default());
        assert!(sink.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn every_hook_receives_the_event() {
        let (dispatcher, _sink) = dispatcher(&HookConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b"] {
            let seen = Arc::clone(&seen);
            dispatcher.register(Arc::new(FnHook::new(name, move |event: &HookEvent| {
                seen.lock().push((event.record.key.clone(), event.kind));
                Ok(())
            })));
        }

        dispatcher.dispatch(database(&dispatcher), Record::new("k1", "t"), RecordEvent::Updated);
        dispatcher.drain().await;

        let seen = seen.lock().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|(k, e)| k == "k1" && *e == RecordEvent::Updated));
        assert_eq!(dispatcher.stats().completed, 2);
    }

    #[tokio::test]
    async fn errors_and_panics_reach_the_sink() {
        let (dispatcher, sink) = dispatcher(&HookConfig::default());
        dispatcher.register(Arc::new(FnHook::new("failing", |_: &HookEvent| {
            anyhow::bail!("push gateway unreachable")
        })));
        dispatcher.register(Arc::new(FnHook::new(
            "panicking",
            |_: &HookEvent| -> anyhow::Result<()> { panic!("boom") },
        )));
        dispatcher.register(Arc::new(FnHook::new("fine", |_: &HookEvent| Ok(()))));

        dispatcher.dispatch(database(&dispatcher), Record::new("k", "t"), RecordEvent::Deleted);
        dispatcher.drain().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 2);

        let failures = sink.failures.lock();
        assert_eq!(failures.len(), 2);
        let failed = failures.iter().find(|f| f.hook == "failing").unwrap();
        assert!(matches!(failed.cause, HookFailureCause::Failed(_)));
        assert!(failed.cause.to_string().contains("push gateway unreachable"));
        assert_eq!(failed.database, "_public");
        assert_eq!(failed.key, "k");
        assert_eq!(failed.event, RecordEvent::Deleted);

        let panicked = failures.iter().find(|f| f.hook == "panicking").unwrap();
        assert!(matches!(&panicked.cause, HookFailureCause::Panicked(msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let config = HookConfig {
            max_concurrent: 2,
            max_pending: 100,
        };
        let (dispatcher, _sink) = dispatcher(&config);
        let hook = Arc::new(SlowHook {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
        });
        dispatcher.register(Arc::clone(&hook) as Arc<dyn RecordHook>);

        let db = database(&dispatcher);
        for i in 0..8 {
            let record = Record::new(format!("k{i}"), "t");
            dispatcher.dispatch(Arc::clone(&db), record, RecordEvent::Created);
        }
        dispatcher.drain().await;

        assert_eq!(dispatcher.stats().completed, 8);
        assert!(hook.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn excess_pending_work_is_shed_and_reported() {
        let config = HookConfig {
            max_concurrent: 1,
            max_pending: 2,
        };
        let (dispatcher, sink) = dispatcher(&config);
        dispatcher.register(Arc::new(SlowHook {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        }));

        let db = database(&dispatcher);
        // Nothing runs until the test yields, so all five land in the queue.
        for i in 0..5 {
            let record = Record::new(format!("k{i}"), "t");
            dispatcher.dispatch(Arc::clone(&db), record, RecordEvent::Created);
        }
        dispatcher.drain().await;

        let stats = dispatcher.stats();
        assert_eq!(stats.dispatched, 5);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.shed, 3);
        let failures = sink.failures.lock();
        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|f| matches!(f.cause, HookFailureCause::Shed)));
    }

    #[tokio::test]
    async fn drain_can_be_called_repeatedly() {
        let (dispatcher, _sink) = dispatcher(&HookConfig::default());
        dispatcher.register(Arc::new(FnHook::new("count", |_: &HookEvent| Ok(()))));
        let db = database(&dispatcher);

        dispatcher.dispatch(Arc::clone(&db), Record::new("a", "t"), RecordEvent::Created);
        dispatcher.drain().await;
        dispatcher.dispatch(db, Record::new("b", "t"), RecordEvent::Created);
        dispatcher.drain().await;

        assert_eq!(dispatcher.stats().completed, 2);
    }

    #[tokio::test]
    async fn overlapping_drains_all_return() {
        let (dispatcher, _sink) = dispatcher(&HookConfig::default());
        dispatcher.register(Arc::new(SlowHook {
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        }));
        let db = database(&dispatcher);

        dispatcher.dispatch(Arc::clone(&db), Record::new("a", "t"), RecordEvent::Created);
        let first = dispatcher.clone();
        let second = dispatcher.clone();
        let late = dispatcher.clone();
        let drains = async move {
            tokio::join!(first.drain(), second.drain(), async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                late.dispatch(db, Record::new("b", "t"), RecordEvent::Created);
                late.drain().await;
            });
        };

        tokio::time::timeout(Duration::from_secs(5), drains)
            .await
            .expect("every drain returns");
        assert_eq!(dispatcher.stats().completed, 2);
    }

    #[test]
    fn panic_message_extracts_strings() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }
}
