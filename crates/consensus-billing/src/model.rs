//! Users, plans, subscriptions and usage records

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Trial,
    Basic,
    Premium,
}

impl Plan {
    /// Plans a user can pay for
    pub const PURCHASABLE: [Plan; 2] = [Plan::Basic, Plan::Premium];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trial" | "free_trial" => Ok(Self::Trial),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            other => Err(format!("unknown plan '{other}'")),
        }
    }
}

/// What a plan grants and costs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSpec {
    pub plan: Plan,
    /// Runs granted on activation
    pub runs: u32,
    /// Validity window; `None` never expires
    pub duration_days: Option<u32>,
    /// Price in cents (zero for the trial)
    pub price_cents: u64,
}

impl PlanSpec {
    /// Expiry for a subscription activated at `start`
    pub fn expires_at(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration_days
            .map(|days| start + Duration::days(i64::from(days)))
    }
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Run allowance attached to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub plan: Plan,
    /// Runs granted at activation, including any carried-over runs
    pub runs_allowed: u32,
    pub runs_remaining: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// New active subscription for `spec`, starting at `now`
    pub fn activate(
        user_id: impl Into<String>,
        spec: PlanSpec,
        payment_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            plan: spec.plan,
            runs_allowed: spec.runs,
            runs_remaining: spec.runs,
            expires_at: spec.expires_at(now),
            active: true,
            payment_id,
            created_at: now,
        }
    }

    /// Whether the validity window has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Whether a run could be granted at `now`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.runs_remaining > 0 && !self.is_expired_at(now)
    }

    pub fn runs_used(&self) -> u32 {
        self.runs_allowed.saturating_sub(self.runs_remaining)
    }
}

/// One granted run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: String,
    pub user_id: String,
    pub subscription_id: String,
    pub symbol: String,
    pub at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(
        user_id: impl Into<String>,
        subscription_id: impl Into<String>,
        symbol: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            subscription_id: subscription_id.into(),
            symbol: symbol.into(),
            at,
        }
    }
}

/// Result of a successful atomic decrement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRun {
    pub subscription_id: String,
    pub plan: Plan,
    pub remaining: u32,
}

/// Outcome of replacing a user's active subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Subscription that was active before, now deactivated
    pub previous: Option<Subscription>,
    /// Newly active subscription
    pub current: Subscription,
    /// Runs moved from `previous` into `current`
    pub carried_over: u32,
}

/// Aggregate numbers for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminOverview {
    pub total_users: u64,
    pub active_subscriptions: u64,
    pub total_runs: u64,
    pub subscriptions_by_plan: BTreeMap<Plan, u64>,
    pub runs_by_plan: BTreeMap<Plan, u64>,
    pub runs_by_symbol: BTreeMap<String, u64>,
}

/// Runs recorded for one user, for the admin leaderboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub username: String,
    pub runs: u64,
}

/// Per-user usage report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub user_id: String,
    pub subscription: Option<Subscription>,
    pub total_runs: u64,
    pub recent: Vec<UsageRecord>,
}
