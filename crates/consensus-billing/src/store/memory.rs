//! In-process entitlement store

use super::EntitlementStore;
use crate::error::{BillingError, Result};
use crate::model::{
    AdminOverview, ConsumedRun, Replacement, Subscription, UsageRecord, User, UserActivity,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    users: Vec<User>,
    /// Insertion order; later entries are newer
    subscriptions: Vec<Subscription>,
    usage: Vec<UsageRecord>,
}

impl State {
    fn user_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == user_id)
    }

    fn active_mut(&mut self, user_id: &str) -> Option<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|s| s.user_id == user_id && s.active)
    }

    fn check_new_user(&self, user: &User) -> Result<()> {
        if self
            .users
            .iter()
            .any(|u| u.id == user.id || u.username == user.username || u.email == user.email)
        {
            return Err(BillingError::DuplicateUser(user.username.clone()));
        }
        Ok(())
    }
}

/// Entitlement store held in memory behind a single mutex
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryEntitlementStore {
    state: Arc<Mutex<State>>,
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_new_user(user)?;
        state.users.push(user.clone());
        Ok(())
    }

    async fn create_user_with_subscription(
        &self,
        user: &User,
        mut subscription: Subscription,
    ) -> Result<Subscription> {
        let mut state = self.state.lock().await;
        state.check_new_user(user)?;
        subscription.active = true;
        state.users.push(user.clone());
        state.subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn update_credentials(&self, user_id: &str, credential_hash: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .user_mut(user_id)
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))?;
        user.credential_hash = credential_hash.to_string();
        Ok(())
    }

    async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.user_mut(user_id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let before = state.users.len();
        state.users.retain(|u| u.id != user_id);
        state.subscriptions.retain(|s| s.user_id != user_id);
        state.usage.retain(|r| r.user_id != user_id);
        Ok(state.users.len() < before)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.state.lock().await.users.clone())
    }

    async fn active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.active)
            .cloned())
    }

    async fn latest_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .iter()
            .rev()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn replace_active_subscription(
        &self,
        mut new: Subscription,
        carry_over: bool,
        now: DateTime<Utc>,
    ) -> Result<Replacement> {
        let mut state = self.state.lock().await;

        if let Some(payment_id) = &new.payment_id {
            if state
                .subscriptions
                .iter()
                .any(|s| s.payment_id.as_ref() == Some(payment_id))
            {
                return Err(BillingError::PaymentAlreadySettled(payment_id.clone()));
            }
        }

        let previous = state.active_mut(&new.user_id).map(|prev| {
            prev.active = false;
            prev.clone()
        });

        let carried_over = match &previous {
            Some(prev) if carry_over && prev.runs_remaining > 0 && !prev.is_expired_at(now) => {
                prev.runs_remaining
            }
            _ => 0,
        };

        new.runs_allowed += carried_over;
        new.runs_remaining += carried_over;
        new.active = true;
        state.subscriptions.push(new.clone());

        Ok(Replacement {
            previous,
            current: new,
            carried_over,
        })
    }

    async fn consume_run(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<ConsumedRun>> {
        let mut state = self.state.lock().await;
        let Some(sub) = state.active_mut(user_id) else {
            return Ok(None);
        };
        if !sub.is_usable_at(now) {
            return Ok(None);
        }

        sub.runs_remaining -= 1;
        if sub.runs_remaining == 0 {
            sub.active = false;
        }

        Ok(Some(ConsumedRun {
            subscription_id: sub.id.clone(),
            plan: sub.plan,
            remaining: sub.runs_remaining,
        }))
    }

    async fn deactivate_subscription(&self, subscription_id: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .subscriptions
            .iter_mut()
            .find(|s| s.id == subscription_id && s.active)
        {
            Some(sub) => {
                sub.active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_runs(&self, subscription_id: &str, runs: u32) -> Result<Option<Subscription>> {
        let mut state = self.state.lock().await;
        let Some(index) = state.subscriptions.iter().position(|s| s.id == subscription_id) else {
            return Ok(None);
        };

        let user_id = state.subscriptions[index].user_id.clone();
        let other_active = state
            .subscriptions
            .iter()
            .any(|s| s.user_id == user_id && s.active && s.id != subscription_id);

        let sub = &mut state.subscriptions[index];
        sub.runs_allowed += runs;
        sub.runs_remaining += runs;
        if !other_active {
            sub.active = true;
        }
        Ok(Some(sub.clone()))
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        self.state.lock().await.usage.push(record.clone());
        Ok(())
    }

    async fn usage_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<UsageRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<UsageRecord> = state
            .usage
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.at.cmp(&a.at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn usage_count(&self, user_id: &str) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.usage.iter().filter(|r| r.user_id == user_id).count() as u64)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let state = self.state.lock().await;
        Ok(state.subscriptions.iter().rev().cloned().collect())
    }

    async fn admin_overview(&self) -> Result<AdminOverview> {
        let state = self.state.lock().await;
        let mut overview = AdminOverview {
            total_users: state.users.len() as u64,
            total_runs: state.usage.len() as u64,
            ..AdminOverview::default()
        };

        for sub in state.subscriptions.iter().filter(|s| s.active) {
            overview.active_subscriptions += 1;
            *overview.subscriptions_by_plan.entry(sub.plan).or_default() += 1;
        }

        let plan_of: HashMap<&str, _> = state
            .subscriptions
            .iter()
            .map(|s| (s.id.as_str(), s.plan))
            .collect();
        for record in &state.usage {
            *overview.runs_by_symbol.entry(record.symbol.clone()).or_default() += 1;
            if let Some(plan) = plan_of.get(record.subscription_id.as_str()) {
                *overview.runs_by_plan.entry(*plan).or_default() += 1;
            }
        }

        Ok(overview)
    }

    async fn top_users(&self, limit: u32) -> Result<Vec<UserActivity>> {
        let state = self.state.lock().await;
        let mut runs: HashMap<&str, u64> = HashMap::new();
        for record in &state.usage {
            *runs.entry(record.user_id.as_str()).or_default() += 1;
        }

        let mut ranked: Vec<UserActivity> = state
            .users
            .iter()
            .filter_map(|u| {
                runs.get(u.id.as_str()).map(|&n| UserActivity {
                    user_id: u.id.clone(),
                    username: u.username.clone(),
                    runs: n,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.runs.cmp(&a.runs).then_with(|| a.username.cmp(&b.username)));
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    async fn usage_by_day(&self) -> Result<BTreeMap<NaiveDate, u64>> {
        let state = self.state.lock().await;
        let mut days: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for record in &state.usage {
            *days.entry(record.at.date_naive()).or_default() += 1;
        }
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Plan;
    use crate::store::conformance;

    #[tokio::test]
    async fn test_users_round_trip() {
        conformance::users_round_trip(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_consume_until_exhausted() {
        conformance::consume_until_exhausted(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_expired_is_not_consumed() {
        conformance::expired_is_not_consumed(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_replacement() {
        conformance::replacement_with_and_without_carry_over(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_expired_runs_never_carry_over() {
        conformance::expired_runs_never_carry_over(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_usage_and_overview() {
        conformance::usage_and_overview(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_user_and_trial_stored_together() {
        conformance::user_and_trial_stored_together(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_settled_payment_cannot_be_reused() {
        conformance::settled_payment_cannot_be_reused(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_deactivate_and_add_runs() {
        conformance::deactivate_and_add_runs(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test]
    async fn test_usage_analytics() {
        conformance::usage_analytics(&MemoryEntitlementStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_last_run_granted_once() {
        let store = MemoryEntitlementStore::new();
        let user = conformance::user("ivy");
        store.insert_user(&user).await.unwrap();
        let sub = Subscription::activate(
            &user.id,
            conformance::spec(Plan::Trial, 1, Some(3)),
            None,
            conformance::t0(),
        );
        store
            .replace_active_subscription(sub, false, conformance::t0())
            .await
            .unwrap();

        let attempts = (0..16).map(|_| {
            let store = store.clone();
            let user_id = user.id.clone();
            tokio::spawn(async move { store.consume_run(&user_id, conformance::t0()).await })
        });
        let granted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(Ok(Some(_)))))
            .count();

        assert_eq!(granted, 1);
        let latest = store.latest_subscription(&user.id).await.unwrap().unwrap();
        assert_eq!(latest.runs_remaining, 0);
        assert!(!latest.active);
    }
}
