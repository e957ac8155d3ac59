//! `oddb` core: record values, queries, subscriptions, and value ordering.

pub mod compare;
pub mod query;
pub mod record;
pub mod subscription;
pub mod types;

pub use compare::{compare, legacy_less, sort_by_less, CompareMode};
pub use query::{Predicate, Query, Sort, SortOrder};
pub use record::{Record, RecordError, KEY_FIELD, TYPE_FIELD};
pub use subscription::Subscription;
pub use types::{Value, ValueKind};
