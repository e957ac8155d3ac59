//! Behavior every driver must share, run against each backend.

use std::sync::Arc;

use async_trait::async_trait;
use oddb_core::{Query, Record, Sort, Subscription, Value};
use oddb_store::{
    driver_by_name, Connection, Database, FnHook, HookConfig, HookDispatcher, HookEvent,
    RecordEvent, RecordHook, StoreConfig, StoreError,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::runtime::Handle;

/// Hook that records `(key, event)` pairs.
#[derive(Default)]
struct RecordingHook {
    seen: Mutex<Vec<(String, RecordEvent)>>,
}

#[async_trait]
impl RecordHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_event(&self, event: &HookEvent) -> anyhow::Result<()> {
        self.seen.lock().push((event.record.key.clone(), event.kind));
        Ok(())
    }
}

struct Harness {
    _tmp: TempDir,
    conn: Arc<dyn Connection>,
    db: Arc<dyn Database>,
    dispatcher: HookDispatcher,
    hook: Arc<RecordingHook>,
}

impl Harness {
    /// Opens namespace `app` with `driver` under a fresh temp directory.
    /// Must be called inside a tokio runtime.
    fn open(driver: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let dispatcher =
            HookDispatcher::with_defaults(Handle::current(), &HookConfig::default());
        let conn = driver_by_name(driver, StoreConfig::default())
            .unwrap()
            .open("app", tmp.path(), dispatcher.clone())
            .unwrap();
        let hook = Arc::new(RecordingHook::default());
        conn.add_record_hook(Arc::clone(&hook) as Arc<dyn RecordHook>);
        let db = conn.public_db();
        Self {
            _tmp: tmp,
            conn,
            db,
            dispatcher,
            hook,
        }
    }

    /// Waits for in-flight hooks, then returns everything recorded so far.
    async fn events(&self) -> Vec<(String, RecordEvent)> {
        self.dispatcher.drain().await;
        self.hook.seen.lock().clone()
    }

    fn keys(&self, query: &Query) -> Vec<String> {
        self.db
            .query(query)
            .unwrap()
            .map(|row| row.unwrap().key)
            .collect()
    }
}

fn note(key: &str, title: &str) -> Record {
    Record::new(key, "note").with("title", title)
}

fn scored(key: &str, score: impl Into<Value>) -> Record {
    Record::new(key, "x").with("score", score)
}

async fn round_trip(h: Harness) {
    let record = Record::new("r1", "note")
        .with("title", "hello")
        .with("score", 2.5)
        .with("count", 7)
        .with("done", false)
        .with("parent", Value::Null);
    h.db.save(&record).unwrap();
    assert_eq!(h.db.get("r1").unwrap(), record);
}

async fn absent_keys_are_not_found(h: Harness) {
    let store = h.db.subscription_store();
    for key in ["missing", "_draft", ".x", "a/b", ""] {
        let err = h.db.get(key).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }), "get {key:?}: {err}");
        let err = h.db.delete(key).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }), "delete {key:?}: {err}");
        assert!(store.get_subscription(key).unwrap_err().is_not_found(), "{key:?}");
        assert!(store.delete_subscription(key).unwrap_err().is_not_found(), "{key:?}");
    }
    assert!(h.events().await.is_empty());
}

async fn any_non_empty_key_round_trips(h: Harness) {
    let keys = ["_draft", ".x", "..", "a/b", "a\\b", "50%", "%41"];
    for key in keys {
        h.db.save(&note(key, key)).unwrap();
        h.db
            .subscription_store()
            .save_subscription(&Subscription::new(key, Query::new("note")))
            .unwrap();
    }

    for key in keys {
        assert_eq!(h.db.get(key).unwrap(), note(key, key));
        let sub = h.db.subscription_store().get_subscription(key).unwrap();
        assert_eq!(sub.key, key);
    }
    let mut found = h.keys(&Query::new("note"));
    found.sort();
    let mut expected: Vec<String> = keys.iter().map(ToString::to_string).collect();
    expected.sort();
    assert_eq!(found, expected);
    assert_eq!(h.db.subscription_store().all_subscriptions().unwrap().len(), keys.len());

    for key in keys {
        h.db.delete(key).unwrap();
        h.db.subscription_store().delete_subscription(key).unwrap();
    }
    assert!(h.keys(&Query::new("note")).is_empty());
    assert!(h.db.get("A").unwrap_err().is_not_found());
}

async fn save_is_idempotent(h: Harness) {
    h.db.save(&note("r1", "first")).unwrap();
    h.db.save(&note("r1", "second")).unwrap();
    h.db.save(&note("r1", "second")).unwrap();

    let records = h.db.query(&Query::new("note")).unwrap().collect_records().unwrap();
    assert_eq!(records, vec![note("r1", "second")]);
}

async fn query_returns_live_records_of_the_type(h: Harness) {
    h.db.save(&note("n1", "a")).unwrap();
    h.db.save(&note("n2", "b")).unwrap();
    h.db.save(&note("n3", "c")).unwrap();
    h.db.save(&Record::new("t1", "task")).unwrap();
    h.db.delete("n2").unwrap();

    let mut keys = h.keys(&Query::new("note"));
    keys.sort();
    assert_eq!(keys, vec!["n1", "n3"]);
    assert_eq!(h.keys(&Query::new("task")), vec!["t1"]);
    assert!(h.keys(&Query::new("nothing")).is_empty());
}

async fn ascending_sort_puts_nulls_first(h: Harness) {
    h.db.save(&scored("a", 10)).unwrap();
    h.db.save(&scored("b", -1.5)).unwrap();
    h.db.save(&Record::new("c", "x")).unwrap();
    h.db.save(&scored("d", 3)).unwrap();
    h.db.save(&scored("e", Value::Null)).unwrap();

    let records = h
        .db
        .query(&Query::new("x").sort_by(Sort::asc("score")))
        .unwrap()
        .collect_records()
        .unwrap();
    let scores: Vec<Value> = records.iter().map(|r| r.get_owned("score")).collect();
    assert!(scores[0].is_null() && scores[1].is_null());
    let numbers: Vec<f64> = scores[2..].iter().map(|v| v.as_f64().unwrap()).collect();
    assert_eq!(numbers, vec![-1.5, 3.0, 10.0]);
}

async fn descending_sort_reverses(h: Harness) {
    for (key, score) in [("r1", 3), ("r2", 1), ("r3", 2)] {
        h.db.save(&scored(key, score)).unwrap();
    }
    assert_eq!(
        h.keys(&Query::new("x").sort_by(Sort::desc("score"))),
        vec!["r1", "r3", "r2"]
    );
}

async fn multiple_sorts_are_unsupported(h: Harness) {
    h.db.save(&scored("r1", 1)).unwrap();
    let query = Query::new("x")
        .sort_by(Sort::asc("score"))
        .sort_by(Sort::asc("_id"));
    let err = h.db.query(&query).unwrap_err();
    assert!(matches!(err, StoreError::Unsupported(_)));
}

async fn scenario_save_get_query_delete(h: Harness) {
    let r1 = note("r1", "a");
    h.db.save(&r1).unwrap();
    assert_eq!(h.db.get("r1").unwrap(), r1);
    assert_eq!(h.keys(&Query::new("note")), vec!["r1"]);

    h.db.delete("r1").unwrap();
    assert!(h.keys(&Query::new("note")).is_empty());
    assert!(h.db.get("r1").unwrap_err().is_not_found());
}

async fn scenario_sorted_scores(h: Harness) {
    h.db.save(&scored("r1", 3)).unwrap();
    h.db.save(&scored("r2", 1)).unwrap();
    h.db.save(&scored("r3", 2)).unwrap();
    assert_eq!(
        h.keys(&Query::new("x").sort_by(Sort::asc("score"))),
        vec!["r2", "r3", "r1"]
    );
}

async fn save_dispatches_created_then_updated(h: Harness) {
    // A second registration of the same hook runs it twice per event.
    h.conn
        .add_record_hook(Arc::clone(&h.hook) as Arc<dyn RecordHook>);

    h.db.save(&note("r1", "a")).unwrap();
    let mut events = h.events().await;
    assert_eq!(
        events,
        vec![
            ("r1".to_string(), RecordEvent::Created),
            ("r1".to_string(), RecordEvent::Created),
        ]
    );

    h.db.save(&note("r1", "b")).unwrap();
    h.db.delete("r1").unwrap();
    events = h.events().await;
    let updated = events.iter().filter(|(_, e)| *e == RecordEvent::Updated).count();
    let deleted = events.iter().filter(|(_, e)| *e == RecordEvent::Deleted).count();
    assert_eq!((events.len(), updated, deleted), (6, 2, 2));
}

async fn failing_hooks_do_not_affect_writes(h: Harness) {
    h.conn.add_record_hook(Arc::new(FnHook::new("failing", |_: &HookEvent| {
        anyhow::bail!("downstream unavailable")
    })));
    h.conn.add_record_hook(Arc::new(FnHook::new(
        "panicking",
        |_: &HookEvent| -> anyhow::Result<()> { panic!("hook bug") },
    )));

    h.db.save(&note("r1", "a")).unwrap();
    let events = h.events().await;

    assert_eq!(events, vec![("r1".to_string(), RecordEvent::Created)]);
    assert_eq!(h.db.get("r1").unwrap(), note("r1", "a"));
    let stats = h.dispatcher.stats();
    assert_eq!((stats.completed, stats.failed), (1, 2));
}

async fn subscriptions_match_by_type(h: Harness) {
    let store = h.db.subscription_store();
    store
        .save_subscription(&Subscription::new("notes", Query::new("note")))
        .unwrap();
    store
        .save_subscription(&Subscription::new("tasks", Query::new("task")))
        .unwrap();
    store
        .save_subscription(&Subscription::new("more-notes", Query::new("note")))
        .unwrap();

    let mut keys: Vec<String> = store
        .matching_subscriptions(&note("r1", "a"))
        .unwrap()
        .into_iter()
        .map(|s| s.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["more-notes", "notes"]);
    assert!(store
        .matching_subscriptions(&Record::new("e1", "event"))
        .unwrap()
        .is_empty());

    assert_eq!(
        store.get_subscription("tasks").unwrap(),
        Subscription::new("tasks", Query::new("task"))
    );
    store.delete_subscription("tasks").unwrap();
    assert_eq!(store.all_subscriptions().unwrap().len(), 2);
}

async fn private_databases_are_isolated(h: Harness) {
    let alice = h.conn.private_db("alice").unwrap();
    let bob = h.conn.private_db("bob").unwrap();
    assert_eq!(alice.id(), "_private");
    assert_eq!(h.db.id(), "_public");

    alice.save(&note("r1", "alice")).unwrap();
    h.db.save(&note("r1", "public")).unwrap();

    assert_eq!(alice.get("r1").unwrap(), note("r1", "alice"));
    assert_eq!(h.db.get("r1").unwrap(), note("r1", "public"));
    assert!(bob.get("r1").unwrap_err().is_not_found());
    assert_eq!(h.conn.private_db("alice").unwrap().get("r1").unwrap(), note("r1", "alice"));

    // Hooks registered on the connection see private writes too.
    let events = h.events().await;
    assert_eq!(events.len(), 2);
    h.conn.close().unwrap();
}

macro_rules! database_contract {
    ($module:ident, $driver:literal) => {
        mod $module {
            use super::*;

            macro_rules! contract_test {
                ($name:ident) => {
                    #[tokio::test]
                    async fn $name() {
                        super::$name(Harness::open($driver)).await;
                    }
                };
            }

            contract_test!(round_trip);
            contract_test!(absent_keys_are_not_found);
            contract_test!(any_non_empty_key_round_trips);
            contract_test!(save_is_idempotent);
            contract_test!(query_returns_live_records_of_the_type);
            contract_test!(ascending_sort_puts_nulls_first);
            contract_test!(descending_sort_reverses);
            contract_test!(multiple_sorts_are_unsupported);
            contract_test!(scenario_save_get_query_delete);
            contract_test!(scenario_sorted_scores);
            contract_test!(save_dispatches_created_then_updated);
            contract_test!(failing_hooks_do_not_affect_writes);
            contract_test!(subscriptions_match_by_type);
            contract_test!(private_databases_are_isolated);
        }
    };
}

database_contract!(fs_driver, "fs");
database_contract!(memory_driver, "memory");
