//! Error types for billing and metering operations

use thiserror::Error;

/// Billing specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data could not be mapped back to a domain value
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// No user with the given id or username
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// No subscription with the given id
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Username or email already registered
    #[error("User already exists: {0}")]
    DuplicateUser(String),

    /// Username/password pair did not match
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Plan name or plan operation not recognized
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Input rejected before reaching storage
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment gateway failure
    #[error("Payment error: {0}")]
    Payment(String),

    /// A settled payment was presented for a different user or plan
    #[error("Payment does not match this purchase: {0}")]
    PaymentMismatch(String),

    /// The payment already activated a subscription
    #[error("Payment already settled: {0}")]
    PaymentAlreadySettled(String),

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for billing operations
pub type Result<T> = std::result::Result<T, BillingError>;

impl From<consensus_utils::ConfigError> for BillingError {
    fn from(err: consensus_utils::ConfigError) -> Self {
        BillingError::Config(err.to_string())
    }
}

impl From<url::ParseError> for BillingError {
    fn from(err: url::ParseError) -> Self {
        BillingError::Config(format!("invalid URL: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            BillingError::UserNotFound("alice".to_string()).to_string(),
            "User not found: alice"
        );
        assert_eq!(
            BillingError::InvalidCredentials.to_string(),
            "Invalid username or password"
        );
        assert_eq!(
            BillingError::PaymentAlreadySettled("pi_1".to_string()).to_string(),
            "Payment already settled: pi_1"
        );
    }

    #[test]
    fn test_config_error_conversion() {
        let err: BillingError = consensus_utils::ConfigError::Missing("STRIPE_SECRET_KEY".into()).into();
        assert!(matches!(err, BillingError::Config(msg) if msg.contains("STRIPE_SECRET_KEY")));
    }
}
