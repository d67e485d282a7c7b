//! Operator view over all accounts
//!
//! Callers authenticate with [`AdminService::authenticate`] before anything
//! else; the service itself holds no session.

use crate::config::BillingConfig;
use crate::credentials::verify_password;
use crate::error::{BillingError, Result};
use crate::model::{AdminOverview, Plan, Replacement, Subscription, User, UserActivity};
use crate::store::EntitlementStore;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Runs an operator may add to a subscription in one top-up
pub const TOP_UP_RANGE: RangeInclusive<u32> = 1..=100;

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn EntitlementStore>,
    config: BillingConfig,
}

impl AdminService {
    pub fn new(store: Arc<dyn EntitlementStore>, config: BillingConfig) -> Self {
        Self { store, config }
    }

    /// Check operator credentials against the configured admin hash
    ///
    /// Always fails when no admin password hash is configured.
    #[instrument(skip(self, password))]
    pub fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let Some(hash) = self.config.admin_credential_hash.as_deref() else {
            warn!("Admin login refused: no admin password configured");
            return Err(BillingError::InvalidCredentials);
        };
        if username.trim() != self.config.admin_username || !verify_password(password, hash) {
            warn!("Failed admin login attempt");
            return Err(BillingError::InvalidCredentials);
        }
        Ok(())
    }

    pub async fn overview(&self) -> Result<AdminOverview> {
        self.store.admin_overview().await
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.store.list_users().await
    }

    pub async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        self.store.list_subscriptions().await
    }

    /// Remove a user and everything recorded for them
    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let deleted = self.store.delete_user(user_id).await?;
        if deleted {
            info!("Deleted user");
        }
        Ok(deleted)
    }

    /// Returns `false` when the subscription was already inactive or missing
    #[instrument(skip(self))]
    pub async fn deactivate_subscription(&self, subscription_id: &str) -> Result<bool> {
        let changed = self.store.deactivate_subscription(subscription_id).await?;
        if changed {
            info!("Deactivated subscription");
        }
        Ok(changed)
    }

    /// Top up a subscription by `runs`
    ///
    /// An inactive subscription becomes active again unless its user already
    /// has another active one.
    #[instrument(skip(self))]
    pub async fn add_runs(&self, subscription_id: &str, runs: u32) -> Result<Subscription> {
        if !TOP_UP_RANGE.contains(&runs) {
            return Err(BillingError::Validation(format!(
                "runs to add must be between {} and {}, got {runs}",
                TOP_UP_RANGE.start(),
                TOP_UP_RANGE.end()
            )));
        }
        let subscription = self
            .store
            .add_runs(subscription_id, runs)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))?;
        info!(
            remaining = subscription.runs_remaining,
            active = subscription.active,
            "Added {} runs",
            runs
        );
        Ok(subscription)
    }

    /// Replace the user's active subscription with a fresh trial
    pub async fn grant_trial(&self, user_id: &str) -> Result<Replacement> {
        self.grant_trial_at(user_id, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn grant_trial_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<Replacement> {
        if self.store.find_user(user_id).await?.is_none() {
            return Err(BillingError::UserNotFound(user_id.to_string()));
        }
        let trial = Subscription::activate(user_id, self.config.plan_spec(Plan::Trial), None, now);
        let replacement = self.store.replace_active_subscription(trial, false, now).await?;
        info!(subscription_id = %replacement.current.id, "Granted trial");
        Ok(replacement)
    }

    /// Users with the most recorded runs, busiest first
    pub async fn top_users(&self, limit: u32) -> Result<Vec<UserActivity>> {
        self.store.top_users(limit).await
    }

    /// Runs recorded per calendar day (UTC)
    pub async fn usage_by_day(&self) -> Result<BTreeMap<NaiveDate, u64>> {
        self.store.usage_by_day().await
    }
}
