//! Payment gateways
//!
//! A gateway turns a plan purchase into a [`PaymentOutcome`]. It never
//! touches subscriptions itself: completed payments are activated by
//! [`AccountService`](crate::AccountService).

use crate::error::{BillingError, Result};
use crate::model::Plan;
use async_trait::async_trait;
use chrono::Utc;
use consensus_utils::{env_var, require_env};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const DECLINED_TEST_CARD: &str = "4000000000009995";

/// Card details entered for a simulated purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    /// `MM/YY` or `MM/YYYY`
    pub expiry: String,
    pub cvc: String,
    pub cardholder_name: String,
}

impl CardDetails {
    /// Digits of the card number with spaces and dashes removed
    pub fn normalized_number(&self) -> String {
        self.number.chars().filter(char::is_ascii_digit).collect()
    }

    /// Parse the expiry into (month, four-digit year)
    pub fn expiry_month_year(&self) -> Result<(u32, i32)> {
        let invalid = || {
            BillingError::Validation("invalid expiration date format, use MM/YY".to_string())
        };
        let (month, year) = self.expiry.split_once('/').ok_or_else(invalid)?;
        let month: u32 = month.trim().parse().map_err(|_| invalid())?;
        let year = year.trim();
        let parsed: i32 = year.parse().map_err(|_| invalid())?;
        let year = if year.len() == 2 { 2000 + parsed } else { parsed };
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok((month, year))
    }
}

/// What is being bought, by whom
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub email: String,
    pub plan: Plan,
    pub amount_cents: u64,
    /// Only used by gateways that take card details directly
    pub card: Option<CardDetails>,
}

/// Result of a checkout or confirmation
///
/// A completed payment names the user and plan it was taken for, so a
/// confirmation can be checked against the purchase it claims to settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Completed {
        payment_id: String,
        user_id: String,
        plan: Plan,
    },
    Pending { session_id: String, checkout_url: String },
    Declined { reason: String },
}

/// A way to take payment for a plan
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn checkout(&self, request: &CheckoutRequest) -> Result<PaymentOutcome>;

    /// Re-check a pending session
    ///
    /// Unknown sessions are declined, never completed.
    async fn confirm(&self, session_id: &str) -> Result<PaymentOutcome>;
}

/// Local gateway using test-card rules
///
/// The card `4000 0000 0000 9995` is declined; every other card succeeds.
/// Payments settle at checkout, so there is never a session to confirm.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway;

impl SimulatedGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    fn name(&self) -> &str {
        "simulated"
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, plan = %request.plan))]
    async fn checkout(&self, request: &CheckoutRequest) -> Result<PaymentOutcome> {
        let card = request
            .card
            .as_ref()
            .ok_or_else(|| BillingError::Validation("card details required".to_string()))?;
        card.expiry_month_year()?;

        if card.normalized_number() == DECLINED_TEST_CARD {
            info!("Simulated card declined");
            return Ok(PaymentOutcome::Declined {
                reason: "card declined".to_string(),
            });
        }

        let uuid = uuid::Uuid::new_v4().simple().to_string();
        let payment_id = format!("sim_{}_{}", &uuid[..8], Utc::now().timestamp());
        info!(payment_id = %payment_id, "Simulated payment completed");
        Ok(PaymentOutcome::Completed {
            payment_id,
            user_id: request.user_id.clone(),
            plan: request.plan,
        })
    }

    async fn confirm(&self, session_id: &str) -> Result<PaymentOutcome> {
        info!(session_id = %session_id, "No pending simulated session");
        Ok(PaymentOutcome::Declined {
            reason: format!("unknown checkout session '{session_id}'"),
        })
    }
}

/// Configuration for the hosted checkout gateway
#[derive(Debug, Clone)]
pub struct HostedCheckoutConfig {
    pub secret_key: String,
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
    pub timeout_secs: u64,
}

impl HostedCheckoutConfig {
    pub fn new(
        secret_key: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            api_base: STRIPE_API_BASE.to_string(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
            currency: "usd".to_string(),
            timeout_secs: 30,
        }
    }

    /// Reads `STRIPE_SECRET_KEY`, `FC_CHECKOUT_SUCCESS_URL` and `FC_CHECKOUT_CANCEL_URL`
    pub fn from_env() -> Result<Self> {
        let config = Self::new(
            require_env("STRIPE_SECRET_KEY")?,
            env_var("FC_CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|| "http://localhost:8501/?checkout=success".to_string()),
            env_var("FC_CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|| "http://localhost:8501/?checkout=cancel".to_string()),
        );
        config.validate()?;
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.secret_key.trim().is_empty() {
            return Err(BillingError::Config("checkout secret key is empty".to_string()));
        }
        for raw in [&self.api_base, &self.success_url, &self.cancel_url] {
            let url = Url::parse(raw)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(BillingError::Config(format!("unsupported URL scheme in {raw}")));
            }
        }
        Ok(())
    }
}

/// Stripe Checkout Sessions over HTTPS
pub struct HostedCheckoutGateway {
    client: Client,
    config: HostedCheckoutConfig,
}

impl HostedCheckoutGateway {
    pub fn new(config: HostedCheckoutConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(HostedCheckoutConfig::from_env()?)
    }

    fn session_form(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let pair = |k: &str, v: String| (k.to_string(), v);
        vec![
            pair("mode", "payment".to_string()),
            pair("success_url", self.config.success_url.clone()),
            pair("cancel_url", self.config.cancel_url.clone()),
            pair("client_reference_id", request.user_id.clone()),
            pair("customer_email", request.email.clone()),
            pair("line_items[0][quantity]", "1".to_string()),
            pair("line_items[0][price_data][currency]", self.config.currency.clone()),
            pair(
                "line_items[0][price_data][unit_amount]",
                request.amount_cents.to_string(),
            ),
            pair(
                "line_items[0][price_data][product_data][name]",
                format!("Futures consensus {} plan", request.plan),
            ),
            pair("metadata[plan]", request.plan.as_str().to_string()),
            pair("metadata[user_id]", request.user_id.clone()),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl CheckoutSession {
    fn into_outcome(self) -> Result<PaymentOutcome> {
        if self.payment_status.as_deref() == Some("paid") {
            return self.completed();
        }
        if self.status.as_deref() == Some("expired") {
            return Ok(PaymentOutcome::Declined {
                reason: "checkout session expired".to_string(),
            });
        }
        Ok(PaymentOutcome::Pending {
            checkout_url: self.url.unwrap_or_default(),
            session_id: self.id,
        })
    }

    /// The buyer comes from `client_reference_id`, falling back to `metadata[user_id]`
    fn completed(mut self) -> Result<PaymentOutcome> {
        let user_id = self
            .client_reference_id
            .take()
            .or_else(|| self.metadata.remove("user_id"))
            .ok_or_else(|| {
                BillingError::Payment(format!("paid session {} names no user", self.id))
            })?;
        let plan = self
            .metadata
            .get("plan")
            .ok_or_else(|| BillingError::Payment(format!("paid session {} names no plan", self.id)))?
            .parse::<Plan>()
            .map_err(BillingError::InvalidPlan)?;

        Ok(PaymentOutcome::Completed {
            payment_id: self.payment_intent.unwrap_or(self.id),
            user_id,
            plan,
        })
    }
}

async fn read_session(response: reqwest::Response) -> Result<CheckoutSession> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await?;
        return Err(BillingError::Payment(format!("checkout API returned {status}: {body}")));
    }
    response
        .json()
        .await
        .map_err(|e| BillingError::Payment(format!("unexpected checkout response: {e}")))
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    fn name(&self) -> &str {
        "hosted_checkout"
    }

    #[instrument(skip(self, request), fields(user_id = %request.user_id, plan = %request.plan))]
    async fn checkout(&self, request: &CheckoutRequest) -> Result<PaymentOutcome> {
        debug!("Creating checkout session");
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.config.api_base))
            .bearer_auth(&self.config.secret_key)
            .form(&self.session_form(request))
            .send()
            .await?;

        let session = read_session(response).await?;
        info!(session_id = %session.id, "Checkout session created");
        session.into_outcome()
    }

    #[instrument(skip(self))]
    async fn confirm(&self, session_id: &str) -> Result<PaymentOutcome> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{session_id}", self.config.api_base))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        read_session(response).await?.into_outcome()
    }
}
