//! Subscription matching and per-database subscription storage.
//!
//! A [`SubscriptionMatcher`] decides which stored subscriptions a record
//! notifies. It evaluates an ordered list of [`MatchCondition`]s that must
//! all hold; the default list is record type equality followed by the
//! subscription query's predicate.

use std::fmt;
use std::sync::Arc;

use oddb_core::{Record, Subscription};

use crate::error::StoreResult;

/// One necessary condition for a subscription to match a record.
///
/// Used as `Arc<dyn MatchCondition>`.
pub trait MatchCondition: Send + Sync {
    /// Short identifier, used in debug output.
    fn name(&self) -> &'static str;

    fn matches(&self, subscription: &Subscription, record: &Record) -> bool;
}

/// Holds when the subscription's query targets the record's type.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeCondition;

impl MatchCondition for TypeCondition {
    fn name(&self) -> &'static str {
        "type"
    }

    fn matches(&self, subscription: &Subscription, record: &Record) -> bool {
        subscription.query.record_type == record.record_type
    }
}

/// Holds when the subscription query's predicate accepts the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct PredicateCondition;

impl MatchCondition for PredicateCondition {
    fn name(&self) -> &'static str {
        "predicate"
    }

    fn matches(&self, subscription: &Subscription, record: &Record) -> bool {
        subscription.query.predicate.evaluate(record)
    }
}

/// Selects the subscriptions a record notifies.
#[derive(Clone)]
pub struct SubscriptionMatcher {
    conditions: Vec<Arc<dyn MatchCondition>>,
}

impl Default for SubscriptionMatcher {
    fn default() -> Self {
        Self::new(vec![Arc::new(TypeCondition), Arc::new(PredicateCondition)])
    }
}

impl SubscriptionMatcher {
    /// Matcher with exactly `conditions`. An empty list matches everything.
    #[must_use]
    pub fn new(conditions: Vec<Arc<dyn MatchCondition>>) -> Self {
        Self { conditions }
    }

    /// Appends an extra condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Arc<dyn MatchCondition>) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Whether every condition holds for `subscription` and `record`.
    #[must_use]
    pub fn is_match(&self, subscription: &Subscription, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.matches(subscription, record))
    }

    /// Every subscription in `subscriptions` that `record` matches, in input
    /// order.
    #[must_use]
    pub fn matches(&self, record: &Record, subscriptions: &[Subscription]) -> Vec<Subscription> {
        subscriptions
            .iter()
            .filter(|subscription| self.is_match(subscription, record))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for SubscriptionMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.conditions.iter().map(|c| c.name()).collect();
        f.debug_struct("SubscriptionMatcher")
            .field("conditions", &names)
            .finish()
    }
}

/// Keyed subscription storage owned by a database.
///
/// Used as `&dyn SubscriptionStore` through
/// [`Database::subscription_store`](super::Database::subscription_store).
pub trait SubscriptionStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if no
    /// subscription is stored under `key`.
    fn get_subscription(&self, key: &str) -> StoreResult<Subscription>;

    /// Inserts or replaces the subscription under its key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidKey`](crate::StoreError::InvalidKey) for
    /// an empty key, or a storage error.
    fn save_subscription(&self, subscription: &Subscription) -> StoreResult<()>;

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if no
    /// subscription is stored under `key`.
    fn delete_subscription(&self, key: &str) -> StoreResult<()>;

    /// All stored subscriptions, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns a storage or decode error.
    fn all_subscriptions(&self) -> StoreResult<Vec<Subscription>>;

    /// Stored subscriptions that `record` matches under the default matcher.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`SubscriptionStore::all_subscriptions`].
    fn matching_subscriptions(&self, record: &Record) -> StoreResult<Vec<Subscription>> {
        let all = self.all_subscriptions()?;
        Ok(SubscriptionMatcher::default().matches(record, &all))
    }
}
