//! Error taxonomy shared across the workspace

use crate::ProviderId;
use thiserror::Error;

/// Result type alias for consensus operations
pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Errors produced while collecting and reducing opinions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// Aggregation was attempted with fewer opinions than providers
    #[error("partial input: expected {expected} opinions, received {received}")]
    PartialInput {
        expected: usize,
        received: usize,
        /// Providers known to be missing, in priority order
        missing: Vec<ProviderId>,
    },

    /// Opinions are inconsistent with each other or with their own invariants
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Network, authentication, rate limit or timeout failure; may be retried
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: ProviderId, reason: String },

    /// The provider answered but the answer cannot be read as an opinion
    #[error("provider {provider} returned an unusable response: {reason}")]
    ProviderFormat { provider: ProviderId, reason: String },

    /// The entitlement gate refused the run
    #[error("run not permitted for user {user_id}: {reason}")]
    EntitlementDenied { user_id: String, reason: String },
}

impl ConsensusError {
    /// Whether a caller may reasonably retry the failing provider alone
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    /// The provider this error is attributed to, if any
    pub fn provider(&self) -> Option<&ProviderId> {
        match self {
            Self::ProviderUnavailable { provider, .. } | Self::ProviderFormat { provider, .. } => {
                Some(provider)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConsensusError::PartialInput {
            expected: 3,
            received: 2,
            missing: vec![ProviderId::new("groq")],
        };
        assert_eq!(
            err.to_string(),
            "partial input: expected 3 opinions, received 2"
        );

        let err = ConsensusError::ProviderUnavailable {
            provider: ProviderId::new("gemini"),
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "provider gemini unavailable: timeout");
    }

    #[test]
    fn test_retryable() {
        let unavailable = ConsensusError::ProviderUnavailable {
            provider: ProviderId::new("deepseek"),
            reason: "503".to_string(),
        };
        let format = ConsensusError::ProviderFormat {
            provider: ProviderId::new("deepseek"),
            reason: "no json".to_string(),
        };
        assert!(unavailable.is_retryable());
        assert!(!format.is_retryable());
        assert_eq!(format.provider().map(ProviderId::as_str), Some("deepseek"));
        assert!(ConsensusError::InvalidInput("x".into()).provider().is_none());
    }
}
