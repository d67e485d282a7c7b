//! Configuration for metering, plans and payments

use crate::credentials::{DEFAULT_ROUNDS, MIN_ROUNDS};
use crate::error::{BillingError, Result};
use crate::model::{Plan, PlanSpec};
use consensus_utils::{env_bool, env_parse, env_var};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which payment gateway handles purchases
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Local simulation with test-card rules
    #[default]
    Simulated,
    /// Redirect to a hosted checkout page
    HostedCheckout,
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simulated" | "simulation" | "sim" => Ok(Self::Simulated),
            "hosted" | "hosted_checkout" | "stripe" => Ok(Self::HostedCheckout),
            other => Err(format!("unknown payment mode '{other}'")),
        }
    }
}

/// Configuration for billing operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// SQLite connection string
    pub database_url: String,

    /// Runs granted to a new user's trial
    pub trial_runs: u32,

    /// Trial validity in days
    pub trial_days: u32,

    /// Basic plan terms
    pub basic: PlanSpec,

    /// Premium plan terms
    pub premium: PlanSpec,

    /// Carry unused, unexpired runs into a newly purchased subscription
    pub rollover_unused_runs: bool,

    /// Payment gateway selection
    pub payment_mode: PaymentMode,

    /// Number of recent usage records in a user's stats
    pub recent_usage_limit: u32,

    /// PBKDF2 iterations for newly stored password hashes
    pub password_rounds: u32,

    /// Operator login name for admin commands
    pub admin_username: String,

    /// Stored hash of the operator password; admin commands are refused while unset
    #[serde(skip_serializing, default)]
    pub admin_credential_hash: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/futures_consensus.db".to_string(),
            trial_runs: 3,
            trial_days: 3,
            basic: PlanSpec {
                plan: Plan::Basic,
                runs: 10,
                duration_days: None,
                price_cents: 10_000,
            },
            premium: PlanSpec {
                plan: Plan::Premium,
                runs: 100,
                duration_days: Some(30),
                price_cents: 50_000,
            },
            rollover_unused_runs: false,
            payment_mode: PaymentMode::Simulated,
            recent_usage_limit: 10,
            password_rounds: DEFAULT_ROUNDS,
            admin_username: "admin".to_string(),
            admin_credential_hash: None,
        }
    }
}

impl BillingConfig {
    /// Create a new configuration builder
    pub fn builder() -> BillingConfigBuilder {
        BillingConfigBuilder::default()
    }

    /// Load from `FC_*` environment variables over the defaults
    ///
    /// The admin password is read as a hash from `FC_ADMIN_PASSWORD_HASH`;
    /// `futures-consensus hash-password` produces one.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            database_url: env_var("FC_DATABASE_URL").unwrap_or(defaults.database_url),
            trial_runs: env_parse("FC_TRIAL_RUNS", defaults.trial_runs)?,
            trial_days: env_parse("FC_TRIAL_DAYS", defaults.trial_days)?,
            basic: defaults.basic,
            premium: defaults.premium,
            rollover_unused_runs: env_bool("FC_ROLLOVER_UNUSED_RUNS", defaults.rollover_unused_runs)?,
            payment_mode: env_parse("FC_PAYMENT_MODE", defaults.payment_mode)?,
            recent_usage_limit: defaults.recent_usage_limit,
            password_rounds: env_parse("FC_PASSWORD_ROUNDS", defaults.password_rounds)?,
            admin_username: env_var("FC_ADMIN_USERNAME").unwrap_or(defaults.admin_username),
            admin_credential_hash: env_var("FC_ADMIN_PASSWORD_HASH"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Terms for `plan`
    pub fn plan_spec(&self, plan: Plan) -> PlanSpec {
        match plan {
            Plan::Trial => PlanSpec {
                plan: Plan::Trial,
                runs: self.trial_runs,
                duration_days: Some(self.trial_days),
                price_cents: 0,
            },
            Plan::Basic => self.basic,
            Plan::Premium => self.premium,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.trial_days == 0 {
            return Err(BillingError::Config(
                "trial_days must be greater than 0".to_string(),
            ));
        }

        for spec in [self.basic, self.premium] {
            if spec.runs == 0 {
                return Err(BillingError::Config(format!(
                    "{} plan must grant at least one run",
                    spec.plan
                )));
            }
            if spec.price_cents == 0 {
                return Err(BillingError::Config(format!(
                    "{} plan must have a price",
                    spec.plan
                )));
            }
        }

        if self.password_rounds < MIN_ROUNDS {
            return Err(BillingError::Config(format!(
                "password_rounds must be at least {MIN_ROUNDS}"
            )));
        }

        if self.admin_username.trim().is_empty() {
            return Err(BillingError::Config(
                "admin_username must not be empty".to_string(),
            ));
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(BillingError::Config(format!(
                "database_url must be a sqlite URL, got '{}'",
                self.database_url
            )));
        }

        Ok(())
    }
}

/// Builder for BillingConfig
#[derive(Debug, Default)]
pub struct BillingConfigBuilder {
    database_url: Option<String>,
    trial_runs: Option<u32>,
    trial_days: Option<u32>,
    basic: Option<PlanSpec>,
    premium: Option<PlanSpec>,
    rollover_unused_runs: Option<bool>,
    payment_mode: Option<PaymentMode>,
    recent_usage_limit: Option<u32>,
    password_rounds: Option<u32>,
    admin_username: Option<String>,
    admin_credential_hash: Option<String>,
}

impl BillingConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn trial_runs(mut self, runs: u32) -> Self {
        self.trial_runs = Some(runs);
        self
    }

    pub fn trial_days(mut self, days: u32) -> Self {
        self.trial_days = Some(days);
        self
    }

    pub fn basic(mut self, spec: PlanSpec) -> Self {
        self.basic = Some(spec);
        self
    }

    pub fn premium(mut self, spec: PlanSpec) -> Self {
        self.premium = Some(spec);
        self
    }

    pub fn rollover_unused_runs(mut self, enabled: bool) -> Self {
        self.rollover_unused_runs = Some(enabled);
        self
    }

    pub fn payment_mode(mut self, mode: PaymentMode) -> Self {
        self.payment_mode = Some(mode);
        self
    }

    pub fn recent_usage_limit(mut self, limit: u32) -> Self {
        self.recent_usage_limit = Some(limit);
        self
    }

    pub fn password_rounds(mut self, rounds: u32) -> Self {
        self.password_rounds = Some(rounds);
        self
    }

    pub fn admin_username(mut self, username: impl Into<String>) -> Self {
        self.admin_username = Some(username.into());
        self
    }

    /// Hash as produced by [`hash_password`](crate::credentials::hash_password)
    pub fn admin_credential_hash(mut self, hash: impl Into<String>) -> Self {
        self.admin_credential_hash = Some(hash.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<BillingConfig> {
        let defaults = BillingConfig::default();

        let config = BillingConfig {
            database_url: self.database_url.unwrap_or(defaults.database_url),
            trial_runs: self.trial_runs.unwrap_or(defaults.trial_runs),
            trial_days: self.trial_days.unwrap_or(defaults.trial_days),
            basic: self.basic.unwrap_or(defaults.basic),
            premium: self.premium.unwrap_or(defaults.premium),
            rollover_unused_runs: self
                .rollover_unused_runs
                .unwrap_or(defaults.rollover_unused_runs),
            payment_mode: self.payment_mode.unwrap_or(defaults.payment_mode),
            recent_usage_limit: self.recent_usage_limit.unwrap_or(defaults.recent_usage_limit),
            password_rounds: self.password_rounds.unwrap_or(defaults.password_rounds),
            admin_username: self.admin_username.unwrap_or(defaults.admin_username),
            admin_credential_hash: self.admin_credential_hash.or(defaults.admin_credential_hash),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BillingConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.rollover_unused_runs);
        assert_eq!(config.plan_spec(Plan::Trial).runs, 3);
        assert_eq!(config.plan_spec(Plan::Trial).duration_days, Some(3));
        assert_eq!(config.plan_spec(Plan::Basic).duration_days, None);
        assert_eq!(config.plan_spec(Plan::Premium).price_cents, 50_000);
    }

    #[test]
    fn test_config_builder() {
        let config = BillingConfig::builder()
            .trial_runs(5)
            .trial_days(7)
            .rollover_unused_runs(true)
            .payment_mode(PaymentMode::HostedCheckout)
            .build()
            .unwrap();

        assert_eq!(config.plan_spec(Plan::Trial).runs, 5);
        assert_eq!(config.plan_spec(Plan::Trial).duration_days, Some(7));
        assert!(config.rollover_unused_runs);
    }

    #[test]
    fn test_validation_rejects_zero_trial_days() {
        assert!(BillingConfig::builder().trial_days(0).build().is_err());
    }

    #[test]
    fn test_validation_rejects_non_sqlite_url() {
        let result = BillingConfig::builder()
            .database_url("postgres://localhost/app")
            .build();
        assert!(matches!(result, Err(BillingError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_weak_password_rounds() {
        assert!(BillingConfig::builder().password_rounds(10).build().is_err());
        let config = BillingConfig::builder().password_rounds(MIN_ROUNDS).build().unwrap();
        assert_eq!(config.password_rounds, MIN_ROUNDS);
        assert!(config.admin_credential_hash.is_none());
    }

    #[test]
    fn test_payment_mode_parse() {
        assert_eq!("stripe".parse::<PaymentMode>(), Ok(PaymentMode::HostedCheckout));
        assert_eq!("Simulated".parse::<PaymentMode>(), Ok(PaymentMode::Simulated));
        assert!("paypal".parse::<PaymentMode>().is_err());
    }
}
