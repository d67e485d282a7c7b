//! Registration, login and plan activation

use crate::config::BillingConfig;
use crate::credentials::{hash_password, verify_password};
use crate::error::{BillingError, Result};
use crate::model::{Plan, Replacement, Subscription, UsageRecord, UsageStats, User};
use crate::payment::{CardDetails, CheckoutRequest, PaymentGateway, PaymentOutcome};
use crate::store::EntitlementStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of a purchase attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Paid and active
    Activated(Replacement),
    /// Waiting on the customer at a hosted checkout page
    Pending { session_id: String, checkout_url: String },
    Declined { reason: String },
}

/// User-facing account operations
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn EntitlementStore>,
    config: BillingConfig,
}

impl AccountService {
    pub fn new(store: Arc<dyn EntitlementStore>, config: BillingConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn EntitlementStore> {
        &self.store
    }

    /// Create an account with a fresh trial
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        self.register_at(username, email, password, Utc::now()).await
    }

    #[instrument(skip(self, password))]
    pub async fn register_at(
        &self,
        username: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<User> {
        let username = username.trim();
        let email = email.trim().to_lowercase();
        if username.is_empty() {
            return Err(BillingError::Validation("username must not be empty".to_string()));
        }
        if !email.contains('@') {
            return Err(BillingError::Validation(format!("invalid email '{email}'")));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email,
            credential_hash: hash_password(password, self.config.password_rounds)?,
            created_at: now,
            last_login: None,
        };
        let trial = Subscription::activate(&user.id, self.config.plan_spec(Plan::Trial), None, now);
        self.store.create_user_with_subscription(&user, trial).await?;

        info!(user_id = %user.id, "Registered user with trial");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let Some(mut user) = self.store.find_user_by_username(username.trim()).await? else {
            return Err(BillingError::InvalidCredentials);
        };
        if !verify_password(password, &user.credential_hash) {
            warn!("Failed login attempt");
            return Err(BillingError::InvalidCredentials);
        }

        let now = Utc::now();
        self.store.touch_login(&user.id, now).await?;
        user.last_login = Some(now);
        Ok(user)
    }

    pub async fn change_password(&self, user_id: &str, current: &str, new_password: &str) -> Result<()> {
        let user = self.require_user(user_id).await?;
        if !verify_password(current, &user.credential_hash) {
            return Err(BillingError::InvalidCredentials);
        }
        let hash = hash_password(new_password, self.config.password_rounds)?;
        self.store.update_credentials(user_id, &hash).await
    }

    /// Replace the user's active subscription with `plan`
    pub async fn activate_plan(
        &self,
        user_id: &str,
        plan: Plan,
        payment_id: Option<String>,
    ) -> Result<Replacement> {
        self.activate_plan_at(user_id, plan, payment_id, Utc::now()).await
    }

    /// Runs left on an unexpired previous subscription are carried over only
    /// when `rollover_unused_runs` is set.
    #[instrument(skip(self, payment_id))]
    pub async fn activate_plan_at(
        &self,
        user_id: &str,
        plan: Plan,
        payment_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Replacement> {
        if plan == Plan::Trial {
            return Err(BillingError::InvalidPlan(
                "trial is granted at registration and cannot be purchased".to_string(),
            ));
        }
        self.require_user(user_id).await?;

        let subscription = Subscription::activate(user_id, self.config.plan_spec(plan), payment_id, now);
        let replacement = self
            .store
            .replace_active_subscription(subscription, self.config.rollover_unused_runs, now)
            .await?;

        info!(
            runs = replacement.current.runs_remaining,
            carried_over = replacement.carried_over,
            "Activated {} plan",
            plan
        );
        Ok(replacement)
    }

    /// Charge for `plan` through `gateway` and activate it once paid
    pub async fn purchase(
        &self,
        user_id: &str,
        plan: Plan,
        gateway: &dyn PaymentGateway,
        card: Option<CardDetails>,
    ) -> Result<PurchaseOutcome> {
        if !Plan::PURCHASABLE.contains(&plan) {
            return Err(BillingError::InvalidPlan(format!("{plan} cannot be purchased")));
        }
        let user = self.require_user(user_id).await?;

        let request = CheckoutRequest {
            user_id: user.id.clone(),
            email: user.email.clone(),
            plan,
            amount_cents: self.config.plan_spec(plan).price_cents,
            card,
        };
        let outcome = gateway.checkout(&request).await?;
        self.settle(user_id, plan, outcome).await
    }

    /// Re-check a pending hosted checkout and activate on payment
    ///
    /// The paid session must name `user_id` and `plan`, and its payment must
    /// not have activated a subscription before.
    pub async fn complete_checkout(
        &self,
        user_id: &str,
        plan: Plan,
        gateway: &dyn PaymentGateway,
        session_id: &str,
    ) -> Result<PurchaseOutcome> {
        let outcome = gateway.confirm(session_id).await?;
        self.settle(user_id, plan, outcome).await
    }

    async fn settle(&self, user_id: &str, plan: Plan, outcome: PaymentOutcome) -> Result<PurchaseOutcome> {
        Ok(match outcome {
            PaymentOutcome::Completed {
                payment_id,
                user_id: paid_user,
                plan: paid_plan,
            } => {
                if paid_user != user_id {
                    warn!(payment_id = %payment_id, "Payment belongs to another user");
                    return Err(BillingError::PaymentMismatch(format!(
                        "payment {payment_id} was made by another account"
                    )));
                }
                if paid_plan != plan {
                    warn!(payment_id = %payment_id, "Payment made for a different plan");
                    return Err(BillingError::PaymentMismatch(format!(
                        "payment {payment_id} was for the {paid_plan} plan, not {plan}"
                    )));
                }
                PurchaseOutcome::Activated(self.activate_plan(user_id, plan, Some(payment_id)).await?)
            }
            PaymentOutcome::Pending {
                session_id,
                checkout_url,
            } => PurchaseOutcome::Pending {
                session_id,
                checkout_url,
            },
            PaymentOutcome::Declined { reason } => PurchaseOutcome::Declined { reason },
        })
    }

    /// Append a usage record for a granted run
    pub async fn record_run(&self, user_id: &str, subscription_id: &str, symbol: &str) -> Result<UsageRecord> {
        let record = UsageRecord::new(user_id, subscription_id, symbol, Utc::now());
        self.store.record_usage(&record).await?;
        Ok(record)
    }

    pub async fn usage_stats(&self, user_id: &str) -> Result<UsageStats> {
        self.require_user(user_id).await?;
        Ok(UsageStats {
            user_id: user_id.to_string(),
            subscription: self.store.active_subscription(user_id).await?,
            total_runs: self.store.usage_count(user_id).await?,
            recent: self
                .store
                .usage_for_user(user_id, self.config.recent_usage_limit)
                .await?,
        })
    }

    async fn require_user(&self, user_id: &str) -> Result<User> {
        self.store
            .find_user(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.to_string()))
    }
}
