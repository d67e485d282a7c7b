//! A single provider's trading call

use crate::{ConsensusError, Direction, ProviderId, Result, Symbol, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One provider's structured opinion for a (symbol, timeframe)
///
/// Fields are read-only once constructed. Equality ignores `generated_at` so
/// that identical calls made at different instants compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawOpinion")]
pub struct Opinion {
    provider_id: ProviderId,
    symbol: Symbol,
    timeframe: Timeframe,
    direction: Direction,
    confidence: f64,
    rationale: String,
    generated_at: DateTime<Utc>,
}

impl Opinion {
    /// Create an opinion stamped with the current time
    ///
    /// Fails with [`ConsensusError::InvalidInput`] when `confidence` is not a
    /// finite value in `[0, 1]`.
    pub fn new(
        provider_id: impl Into<ProviderId>,
        symbol: Symbol,
        timeframe: Timeframe,
        direction: Direction,
        confidence: f64,
        rationale: impl Into<String>,
    ) -> Result<Self> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ConsensusError::InvalidInput(format!(
                "confidence must be within [0, 1], got {confidence}"
            )));
        }

        Ok(Self {
            provider_id: provider_id.into(),
            symbol,
            timeframe,
            direction,
            confidence,
            rationale: rationale.into(),
            generated_at: Utc::now(),
        })
    }

    /// Replace the generation timestamp
    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = at;
        self
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }
}

impl PartialEq for Opinion {
    fn eq(&self, other: &Self) -> bool {
        self.provider_id == other.provider_id
            && self.symbol == other.symbol
            && self.timeframe == other.timeframe
            && self.direction == other.direction
            && self.confidence.to_bits() == other.confidence.to_bits()
            && self.rationale == other.rationale
    }
}

#[derive(Deserialize)]
struct RawOpinion {
    provider_id: ProviderId,
    symbol: Symbol,
    timeframe: Timeframe,
    direction: Direction,
    confidence: f64,
    rationale: String,
    generated_at: DateTime<Utc>,
}

impl TryFrom<RawOpinion> for Opinion {
    type Error = ConsensusError;

    fn try_from(raw: RawOpinion) -> Result<Self> {
        Ok(Opinion::new(
            raw.provider_id,
            raw.symbol,
            raw.timeframe,
            raw.direction,
            raw.confidence,
            raw.rationale,
        )?
        .with_generated_at(raw.generated_at))
    }
}
