//! Persistence for users, subscriptions and usage
//!
//! [`EntitlementStore`] is the seam between the metering logic and storage.
//! Two implementations ship with the crate:
//!
//! - [`SqliteEntitlementStore`]: durable, shared across processes
//! - [`MemoryEntitlementStore`]: in-process, for tests and dry runs
//!
//! Every implementation must make [`EntitlementStore::consume_run`] a single
//! atomic check-and-decrement: two concurrent callers against a subscription
//! with one run left must see exactly one grant.

mod memory;
mod sqlite;

pub use memory::MemoryEntitlementStore;
pub use sqlite::SqliteEntitlementStore;

use crate::error::Result;
use crate::model::{
    AdminOverview, ConsumedRun, Replacement, Subscription, UsageRecord, User, UserActivity,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Storage operations needed by accounts, the gate and the admin view
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Insert a new user; fails with `DuplicateUser` if the username or email is taken
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Insert a new user together with their first active subscription
    ///
    /// Either both are stored or neither is.
    async fn create_user_with_subscription(
        &self,
        user: &User,
        subscription: Subscription,
    ) -> Result<Subscription>;

    async fn find_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn update_credentials(&self, user_id: &str, credential_hash: &str) -> Result<()>;

    async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Delete a user together with their subscriptions and usage
    ///
    /// Returns `false` when the user did not exist.
    async fn delete_user(&self, user_id: &str) -> Result<bool>;

    async fn list_users(&self) -> Result<Vec<User>>;

    /// The user's active subscription, whether or not it is still usable
    async fn active_subscription(&self, user_id: &str) -> Result<Option<Subscription>>;

    /// The user's most recently created subscription, active or not
    async fn latest_subscription(&self, user_id: &str) -> Result<Option<Subscription>>;

    /// Deactivate the current subscription (if any) and activate `new` in one step
    ///
    /// With `carry_over`, runs left on an unexpired previous subscription are
    /// added to `new` before it is stored. Fails with `PaymentAlreadySettled`,
    /// leaving the current subscription active, when `new.payment_id` has
    /// already activated a subscription.
    async fn replace_active_subscription(
        &self,
        new: Subscription,
        carry_over: bool,
        now: DateTime<Utc>,
    ) -> Result<Replacement>;

    /// Atomically take one run from the user's usable subscription
    ///
    /// Returns `None` without changing anything when no run can be granted.
    async fn consume_run(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<ConsumedRun>>;

    /// Deactivate one subscription; `false` when it was missing or already inactive
    async fn deactivate_subscription(&self, subscription_id: &str) -> Result<bool>;

    /// Grant `runs` extra runs on a subscription
    ///
    /// An inactive subscription is re-activated in the same step unless its
    /// user already has another active one. Returns `None` for an unknown id.
    async fn add_runs(&self, subscription_id: &str, runs: u32) -> Result<Option<Subscription>>;

    async fn record_usage(&self, record: &UsageRecord) -> Result<()>;

    /// Most recent usage first
    async fn usage_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<UsageRecord>>;

    async fn usage_count(&self, user_id: &str) -> Result<u64>;

    /// All subscriptions, newest first
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    async fn admin_overview(&self) -> Result<AdminOverview>;

    /// Users with the most recorded runs, busiest first
    async fn top_users(&self, limit: u32) -> Result<Vec<UserActivity>>;

    /// Recorded runs per UTC calendar day
    async fn usage_by_day(&self) -> Result<BTreeMap<NaiveDate, u64>>;
}
