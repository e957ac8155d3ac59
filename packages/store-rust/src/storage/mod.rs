//! Record storage for oddb.
//!
//! Provides the backend-neutral contracts and the shared machinery every
//! backend reuses:
//!
//! - **Contracts** ([`Database`], [`Connection`], [`Driver`])
//! - **Querying** ([`QueryExecutor`] over a driver's [`RecordScanner`],
//!   ordering by [`RecordSorter`], results through a [`Rows`] cursor)
//! - **Hooks** ([`HookRegistry`] of [`RecordHook`]s, run by the
//!   [`HookDispatcher`] worker pool)
//! - **Subscriptions** ([`SubscriptionMatcher`], [`SubscriptionStore`])
//!
//! Concrete backends live in [`drivers`].

pub mod database;
pub mod dispatcher;
pub mod drivers;
pub mod executor;
pub mod hooks;
pub mod rows;
pub mod sorter;
pub mod subscription;

pub use database::*;
pub use dispatcher::*;
pub use executor::*;
pub use hooks::*;
pub use rows::*;
pub use sorter::*;
pub use subscription::*;
