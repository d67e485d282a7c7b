//! Accounts, subscriptions and run metering for futures-consensus
//!
//! Every analysis run must first pass the [`EntitlementGate`], which takes
//! exactly one run from the user's single active subscription or refuses
//! without changing anything.
//!
//! # Example
//!
//! ```rust,no_run
//! use consensus_billing::{AccountService, BillingConfig, EntitlementGate, SqliteEntitlementStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> consensus_billing::Result<()> {
//! let config = BillingConfig::from_env()?;
//! let store = Arc::new(SqliteEntitlementStore::connect(&config.database_url).await?);
//! let accounts = AccountService::new(store.clone(), config);
//! let user = accounts.register("alice", "alice@example.com", "correct horse").await?;
//!
//! let gate = EntitlementGate::new(store);
//! let decision = gate.try_consume_run(&user.id).await?;
//! assert!(decision.granted);
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod admin;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod model;
pub mod payment;
pub mod store;

pub use accounts::{AccountService, PurchaseOutcome};
pub use admin::{AdminService, TOP_UP_RANGE};
pub use config::{BillingConfig, BillingConfigBuilder, PaymentMode};
pub use credentials::{hash_password, verify_password};
pub use error::{BillingError, Result};
pub use gate::{DenialReason, EntitlementGate, GateDecision};
pub use model::{
    AdminOverview, ConsumedRun, Plan, PlanSpec, Replacement, Subscription, UsageRecord,
    UsageStats, User, UserActivity,
};
pub use payment::{
    CardDetails, CheckoutRequest, HostedCheckoutConfig, HostedCheckoutGateway, PaymentGateway,
    PaymentOutcome, SimulatedGateway,
};
pub use store::{EntitlementStore, MemoryEntitlementStore, SqliteEntitlementStore};

/// Build the gateway selected by `mode`
pub fn gateway_for(mode: PaymentMode) -> Result<Box<dyn PaymentGateway>> {
    Ok(match mode {
        PaymentMode::Simulated => Box::new(SimulatedGateway::new()),
        PaymentMode::HostedCheckout => Box::new(HostedCheckoutGateway::from_env()?),
    })
}
