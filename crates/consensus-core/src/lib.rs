//! Core types for futures-consensus
//!
//! This crate defines the vocabulary shared by every other crate in the
//! workspace: market symbols and timeframes, provider opinions, the
//! [`ConsensusAggregator`] that reduces three opinions into one call, the
//! [`RunContext`] threaded through an analysis run, and the error taxonomy.

pub mod aggregator;
pub mod context;
pub mod error;
pub mod opinion;
pub mod types;

pub use aggregator::{
    ConsensusAggregator, ConsensusResult, FailureKind, ProviderFailure, ProviderOutcome,
    Resolution, TimeframeOutcome, VoteBreakdown,
};
pub use context::RunContext;
pub use error::{ConsensusError, Result};
pub use opinion::Opinion;
pub use types::{Direction, ProviderId, Symbol, Timeframe};
