//! oddb store: record databases with sorted queries, record hooks, and
//! subscriptions over pluggable `fs` and `memory` backends.

pub mod config;
pub mod error;
pub mod storage;

pub use config::{HookConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use storage::drivers::{driver_by_name, validate_scope, FileDriver, MemoryDriver};
pub use storage::{
    Connection, Database, Driver, FnHook, HookDispatcher, HookEvent, RecordEvent, RecordHook,
    Rows, SubscriptionMatcher, SubscriptionStore,
};
