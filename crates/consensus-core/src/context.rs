//! Per-run execution context
//!
//! A `RunContext` is created once a run has been granted and is passed by
//! value through the analysis pipeline. It carries the identity of the run
//! plus a small key-value store for provider- or report-specific metadata.

use crate::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Well-known metadata keys
pub mod keys {
    /// Runs remaining on the subscription after this run was granted
    pub const RUNS_REMAINING: &str = "runs_remaining";
    /// Plan the run was charged to
    pub const PLAN: &str = "plan";
    /// Free-form note attached by the caller
    pub const NOTE: &str = "note";
}

/// Identity and parameters of one analysis run
///
/// # Example
///
/// ```
/// use consensus_core::{RunContext, Symbol, Timeframe};
///
/// let ctx = RunContext::new("user-1", Symbol::ES)
///     .with_prediction_timeframes(vec![Timeframe::Intraday]);
///
/// assert_eq!(ctx.symbol(), Symbol::ES);
/// assert_eq!(ctx.prediction_timeframes(), &[Timeframe::Intraday]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    run_id: String,
    user_id: String,
    symbol: Symbol,
    prediction_timeframes: Vec<Timeframe>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl RunContext {
    /// New run for `user_id` on `symbol`, predicting the default timeframes
    pub fn new(user_id: impl Into<String>, symbol: Symbol) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            symbol,
            prediction_timeframes: Timeframe::PREDICTION.to_vec(),
            started_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    // =========== Builder Methods ===========

    /// Restrict or reorder the timeframes providers are asked about
    pub fn with_prediction_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.prediction_timeframes = timeframes;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    // =========== Accessors ===========

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn prediction_timeframes(&self) -> &[Timeframe] {
        &self.prediction_timeframes
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get a metadata value
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }

    /// Get a typed metadata value; `None` when absent or of another shape
    pub fn get_typed<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.metadata
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = RunContext::new("user-1", Symbol::NQ);
        assert_eq!(ctx.user_id(), "user-1");
        assert_eq!(ctx.prediction_timeframes(), &Timeframe::PREDICTION);
        assert!(Uuid::parse_str(ctx.run_id()).is_ok());
        assert!(ctx.metadata().is_empty());
    }

    #[test]
    fn test_builder_chain() {
        let ctx = RunContext::new("user-1", Symbol::YM)
            .with_run_id("run-42")
            .with_prediction_timeframes(vec![Timeframe::ThirtyDay])
            .with_metadata(keys::RUNS_REMAINING, serde_json::json!(2))
            .with_metadata(keys::PLAN, serde_json::json!("Trial"));

        assert_eq!(ctx.run_id(), "run-42");
        assert_eq!(ctx.get_typed::<i64>(keys::RUNS_REMAINING), Some(2));
        assert_eq!(ctx.get_typed::<String>(keys::PLAN).as_deref(), Some("Trial"));
        assert_eq!(ctx.get_typed::<i64>(keys::PLAN), None);
        assert!(ctx.get(keys::NOTE).is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let original = RunContext::new("user-1", Symbol::ES);
        let copy = original.clone().with_metadata(keys::NOTE, serde_json::json!("x"));
        assert!(original.get(keys::NOTE).is_none());
        assert!(copy.get(keys::NOTE).is_some());
    }
}
