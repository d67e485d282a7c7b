//! Run metering
//!
//! The gate is the only place runs are taken from a subscription. A grant is
//! a single atomic decrement in the store; a denial never mutates state.

use crate::error::Result;
use crate::model::Plan;
use crate::store::EntitlementStore;
use chrono::{DateTime, Utc};
use consensus_core::ConsensusError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Why a run was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NoActiveSubscription,
    Expired,
    Exhausted,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoActiveSubscription => "no active subscription",
            Self::Expired => "subscription expired",
            Self::Exhausted => "no runs remaining",
        })
    }
}

/// Outcome of one metering attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub granted: bool,
    /// Runs left after this attempt
    pub remaining: u32,
    pub subscription_id: Option<String>,
    pub plan: Option<Plan>,
    pub denial: Option<DenialReason>,
}

impl GateDecision {
    fn denied(reason: DenialReason, remaining: u32, plan: Option<Plan>) -> Self {
        Self {
            granted: false,
            remaining,
            subscription_id: None,
            plan,
            denial: Some(reason),
        }
    }

    /// Turn a denial into `ConsensusError::EntitlementDenied`
    pub fn require(self, user_id: &str) -> std::result::Result<Self, ConsensusError> {
        if self.granted {
            return Ok(self);
        }
        let reason = self
            .denial
            .map_or_else(|| "denied".to_string(), |d| d.to_string());
        Err(ConsensusError::EntitlementDenied {
            user_id: user_id.to_string(),
            reason,
        })
    }
}

/// Grants or refuses analysis runs against a user's subscription
#[derive(Clone)]
pub struct EntitlementGate {
    store: Arc<dyn EntitlementStore>,
}

impl EntitlementGate {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntitlementStore> {
        &self.store
    }

    /// Take one run using the wall clock
    pub async fn try_consume_run(&self, user_id: &str) -> Result<GateDecision> {
        self.try_consume_run_at(user_id, Utc::now()).await
    }

    /// Take one run as of `now`
    ///
    /// Expiry is evaluated against `now`; expired subscriptions are reported
    /// with zero runs remaining but are not rewritten.
    #[instrument(skip(self))]
    pub async fn try_consume_run_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<GateDecision> {
        if let Some(run) = self.store.consume_run(user_id, now).await? {
            info!(remaining = run.remaining, plan = %run.plan, "Run granted");
            return Ok(GateDecision {
                granted: true,
                remaining: run.remaining,
                subscription_id: Some(run.subscription_id),
                plan: Some(run.plan),
                denial: None,
            });
        }

        let decision = self.diagnose(user_id, now).await?;
        warn!(reason = ?decision.denial, "Run denied");
        Ok(decision)
    }

    /// Read-only explanation of why no run could be taken
    async fn diagnose(&self, user_id: &str, now: DateTime<Utc>) -> Result<GateDecision> {
        if let Some(active) = self.store.active_subscription(user_id).await? {
            return Ok(if active.is_expired_at(now) {
                GateDecision::denied(DenialReason::Expired, 0, Some(active.plan))
            } else {
                GateDecision::denied(DenialReason::Exhausted, active.runs_remaining, Some(active.plan))
            });
        }

        Ok(match self.store.latest_subscription(user_id).await? {
            Some(latest) if latest.runs_remaining == 0 => {
                GateDecision::denied(DenialReason::Exhausted, 0, Some(latest.plan))
            }
            _ => GateDecision::denied(DenialReason::NoActiveSubscription, 0, None),
        })
    }
}
