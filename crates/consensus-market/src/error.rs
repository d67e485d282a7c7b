//! Error types for market data, sentiment and pipeline operations

use thiserror::Error;

/// Market and pipeline errors
#[derive(Debug, Error)]
pub enum MarketError {
    /// Price data could not be obtained
    #[error("Data not available for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Rate limit exceeded for an upstream API
    #[error("Rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: String },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Yahoo Finance API error
    #[error("Yahoo Finance error: {0}")]
    YahooFinanceError(String),

    /// Alpha Vantage API error
    #[error("Alpha Vantage error: {0}")]
    AlphaVantageError(String),

    /// Sentiment classification failed
    #[error("Sentiment error: {0}")]
    SentimentError(String),

    /// Technical indicator calculation error
    #[error("Technical indicator error: {0}")]
    IndicatorError(String),

    /// Prompt template failed to render
    #[error("Prompt error: {0}")]
    PromptError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Report could not be written
    #[error("Report error: {0}")]
    ReportError(String),

    /// Consensus or entitlement error
    #[error(transparent)]
    Consensus(#[from] consensus_core::ConsensusError),

    /// Text generation error
    #[error(transparent)]
    Llm(#[from] consensus_llm::LLMError),

    /// Billing or metering error
    #[error(transparent)]
    Billing(#[from] consensus_billing::BillingError),
}

/// Result type alias for market operations
pub type Result<T> = std::result::Result<T, MarketError>;

impl From<consensus_utils::ConfigError> for MarketError {
    fn from(err: consensus_utils::ConfigError) -> Self {
        MarketError::ConfigError(err.to_string())
    }
}

impl From<minijinja::Error> for MarketError {
    fn from(err: minijinja::Error) -> Self {
        MarketError::PromptError(err.to_string())
    }
}

impl From<std::io::Error> for MarketError {
    fn from(err: std::io::Error) -> Self {
        MarketError::ReportError(err.to_string())
    }
}
