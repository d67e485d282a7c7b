//! Consensus aggregation
//!
//! Reduces exactly three provider opinions for the same (symbol, timeframe)
//! into one [`ConsensusResult`]:
//!
//! 1. A direction with two or more votes wins outright.
//! 2. With one vote each, the single highest-confidence opinion wins.
//! 3. Equal top confidences fall back to the configured provider priority.
//!
//! `mean_confidence` is always the unweighted mean of all three inputs.

use crate::{ConsensusError, Direction, Opinion, ProviderId, Result, Symbol, Timeframe};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Number of providers a consensus requires
pub const REQUIRED_OPINIONS: usize = 3;

/// Raw vote counts per direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteBreakdown {
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

impl VoteBreakdown {
    fn tally(directions: impl IntoIterator<Item = Direction>) -> Self {
        let mut votes = Self::default();
        for direction in directions {
            match direction {
                Direction::Buy => votes.buy += 1,
                Direction::Sell => votes.sell += 1,
                Direction::Hold => votes.hold += 1,
            }
        }
        votes
    }

    /// Votes cast for `direction`
    pub fn count(&self, direction: Direction) -> usize {
        match direction {
            Direction::Buy => self.buy,
            Direction::Sell => self.sell,
            Direction::Hold => self.hold,
        }
    }

    /// Direction holding a strict majority, if any
    pub fn majority(&self) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|d| self.count(*d) * 2 > self.buy + self.sell + self.hold)
    }
}

/// How the final direction was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Majority,
    HighestConfidence,
    ProviderPriority,
}

/// Reduced decision for one (symbol, timeframe)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub final_direction: Direction,
    pub mean_confidence: f64,
    pub vote_breakdown: VoteBreakdown,
    /// Inputs in provider priority order
    pub inputs: Vec<Opinion>,
    pub resolution: Resolution,
}

impl ConsensusResult {
    /// Whether all three providers agreed
    pub fn is_unanimous(&self) -> bool {
        self.vote_breakdown.count(self.final_direction) == self.inputs.len()
    }

    /// Whether the direction came from a tie-break rather than a vote
    pub fn is_tie_broken(&self) -> bool {
        self.resolution != Resolution::Majority
    }
}

/// Why a provider's opinion is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unavailable,
    Format,
    Other,
}

/// Marker recorded in place of an opinion that could not be obtained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider_id: ProviderId,
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn from_error(provider_id: ProviderId, error: &ConsensusError) -> Self {
        let kind = match error {
            ConsensusError::ProviderUnavailable { .. } => FailureKind::Unavailable,
            ConsensusError::ProviderFormat { .. } => FailureKind::Format,
            _ => FailureKind::Other,
        };
        Self {
            provider_id,
            kind,
            message: error.to_string(),
        }
    }
}

/// Result of one provider call as seen by the aggregator
pub type ProviderOutcome = (ProviderId, Result<Opinion>);

/// Per-timeframe outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TimeframeOutcome {
    /// All providers answered and a consensus was formed
    Consensus(ConsensusResult),
    /// At least one provider is missing; no consensus is claimed
    Degraded {
        symbol: Symbol,
        timeframe: Timeframe,
        opinions: Vec<Opinion>,
        failures: Vec<ProviderFailure>,
        reason: String,
    },
}

impl TimeframeOutcome {
    pub fn timeframe(&self) -> Timeframe {
        match self {
            Self::Consensus(result) => result.timeframe,
            Self::Degraded { timeframe, .. } => *timeframe,
        }
    }

    pub fn consensus(&self) -> Option<&ConsensusResult> {
        match self {
            Self::Consensus(result) => Some(result),
            Self::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Reduces three opinions into one call using a fixed provider priority
#[derive(Debug, Clone, Default)]
pub struct ConsensusAggregator {
    priority: Vec<ProviderId>,
}

impl ConsensusAggregator {
    /// Create an aggregator; `priority` breaks exact confidence ties, earliest first
    pub fn new(priority: Vec<ProviderId>) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &[ProviderId] {
        &self.priority
    }

    /// Listed providers rank by position; unlisted ones follow, ordered by id
    fn rank_key<'a>(&self, provider: &'a ProviderId) -> (usize, &'a str) {
        let position = self
            .priority
            .iter()
            .position(|p| p == provider)
            .unwrap_or(self.priority.len());
        (position, provider.as_str())
    }

    /// Combine exactly three opinions for one (symbol, timeframe)
    pub fn aggregate(&self, opinions: Vec<Opinion>) -> Result<ConsensusResult> {
        if opinions.len() < REQUIRED_OPINIONS {
            let missing = self
                .priority
                .iter()
                .filter(|p| opinions.iter().all(|o| o.provider_id() != *p))
                .cloned()
                .collect();
            return Err(ConsensusError::PartialInput {
                expected: REQUIRED_OPINIONS,
                received: opinions.len(),
                missing,
            });
        }
        if opinions.len() > REQUIRED_OPINIONS {
            return Err(ConsensusError::InvalidInput(format!(
                "expected {REQUIRED_OPINIONS} opinions, received {}",
                opinions.len()
            )));
        }

        let mut inputs = opinions;
        inputs.sort_by(|a, b| self.rank_key(a.provider_id()).cmp(&self.rank_key(b.provider_id())));

        if let Some(pair) = inputs
            .windows(2)
            .find(|pair| pair[0].provider_id() == pair[1].provider_id())
        {
            return Err(ConsensusError::InvalidInput(format!(
                "duplicate opinion from provider {}",
                pair[0].provider_id()
            )));
        }

        let (symbol, timeframe) = (inputs[0].symbol(), inputs[0].timeframe());
        if let Some(other) = inputs
            .iter()
            .find(|o| o.symbol() != symbol || o.timeframe() != timeframe)
        {
            return Err(ConsensusError::InvalidInput(format!(
                "mixed inputs: {symbol}/{timeframe} and {}/{}",
                other.symbol(),
                other.timeframe()
            )));
        }

        let vote_breakdown = VoteBreakdown::tally(inputs.iter().map(Opinion::direction));

        let (final_direction, resolution) = match vote_breakdown.majority() {
            Some(direction) => (direction, Resolution::Majority),
            None => {
                // One vote each. Inputs are in priority order, so keeping the
                // first of equal maxima applies the priority tie-break.
                let mut best = &inputs[0];
                let mut tied = false;
                for opinion in &inputs[1..] {
                    match opinion.confidence().total_cmp(&best.confidence()) {
                        std::cmp::Ordering::Greater => {
                            best = opinion;
                            tied = false;
                        }
                        std::cmp::Ordering::Equal => tied = true,
                        std::cmp::Ordering::Less => {}
                    }
                }
                let resolution = if tied {
                    Resolution::ProviderPriority
                } else {
                    Resolution::HighestConfidence
                };
                (best.direction(), resolution)
            }
        };

        let mean_confidence =
            inputs.iter().map(Opinion::confidence).sum::<f64>() / inputs.len() as f64;

        debug!(
            %symbol,
            %timeframe,
            direction = %final_direction,
            mean_confidence,
            ?resolution,
            "consensus formed"
        );

        Ok(ConsensusResult {
            symbol,
            timeframe,
            final_direction,
            mean_confidence,
            vote_breakdown,
            inputs,
            resolution,
        })
    }

    /// Reduce raw provider outcomes, turning failures into missing-opinion markers
    ///
    /// Never fails: a missing or invalid input yields
    /// [`TimeframeOutcome::Degraded`] labelled with the reason.
    pub fn reduce(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
        outcomes: Vec<ProviderOutcome>,
    ) -> TimeframeOutcome {
        let mut opinions = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();

        for (provider_id, outcome) in outcomes {
            match outcome {
                Ok(opinion) => opinions.push(opinion),
                Err(error) => {
                    warn!(%provider_id, %symbol, %timeframe, %error, "opinion missing");
                    failures.push(ProviderFailure::from_error(provider_id, &error));
                }
            }
        }

        match self.aggregate(opinions.clone()) {
            Ok(result) => TimeframeOutcome::Consensus(result),
            Err(error) => TimeframeOutcome::Degraded {
                symbol,
                timeframe,
                opinions,
                failures,
                reason: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> ConsensusAggregator {
        ConsensusAggregator::new(vec!["deepseek".into(), "gemini".into(), "groq".into()])
    }

    fn opinion(provider: &str, direction: Direction, confidence: f64) -> Opinion {
        Opinion::new(
            provider,
            Symbol::NQ,
            Timeframe::Intraday,
            direction,
            confidence,
            format!("{provider} says {direction}"),
        )
        .unwrap()
    }

    #[test]
    fn test_worked_example() {
        let result = aggregator()
            .aggregate(vec![
                opinion("deepseek", Direction::Buy, 0.9),
                opinion("gemini", Direction::Sell, 0.4),
                opinion("groq", Direction::Buy, 0.6),
            ])
            .unwrap();

        assert_eq!(result.final_direction, Direction::Buy);
        assert!((result.mean_confidence - 0.633).abs() < 1e-3);
        assert_eq!(result.vote_breakdown.buy, 2);
        assert_eq!(result.vote_breakdown.sell, 1);
        assert_eq!(result.vote_breakdown.hold, 0);
        assert_eq!(result.resolution, Resolution::Majority);
        assert_eq!(result.inputs.len(), 3);
    }

    #[test]
    fn test_majority_ignores_confidence() {
        let result = aggregator()
            .aggregate(vec![
                opinion("deepseek", Direction::Sell, 0.05),
                opinion("gemini", Direction::Sell, 0.1),
                opinion("groq", Direction::Buy, 1.0),
            ])
            .unwrap();
        assert_eq!(result.final_direction, Direction::Sell);
        assert!((result.mean_confidence - (0.05 + 0.1 + 1.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_mean_is_unweighted_for_every_split() {
        let cases = [
            [(Direction::Buy, 0.2), (Direction::Buy, 0.3), (Direction::Buy, 0.7)],
            [(Direction::Hold, 0.9), (Direction::Sell, 0.1), (Direction::Hold, 0.5)],
            [(Direction::Buy, 0.33), (Direction::Sell, 0.66), (Direction::Hold, 0.99)],
        ];
        for case in cases {
            let inputs = vec![
                opinion("deepseek", case[0].0, case[0].1),
                opinion("gemini", case[1].0, case[1].1),
                opinion("groq", case[2].0, case[2].1),
            ];
            let expected = (case[0].1 + case[1].1 + case[2].1) / 3.0;
            let result = aggregator().aggregate(inputs).unwrap();
            assert!((result.mean_confidence - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn test_three_way_split_highest_confidence_wins() {
        let result = aggregator()
            .aggregate(vec![
                opinion("deepseek", Direction::Buy, 0.5),
                opinion("gemini", Direction::Sell, 0.8),
                opinion("groq", Direction::Hold, 0.3),
            ])
            .unwrap();
        assert_eq!(result.final_direction, Direction::Sell);
        assert_eq!(result.resolution, Resolution::HighestConfidence);
    }

    #[test]
    fn test_three_way_split_equal_confidence_uses_priority() {
        let inputs = vec![
            opinion("groq", Direction::Hold, 0.5),
            opinion("gemini", Direction::Sell, 0.5),
            opinion("deepseek", Direction::Buy, 0.5),
        ];

        let first = aggregator().aggregate(inputs.clone()).unwrap();
        assert_eq!(first.final_direction, Direction::Buy);
        assert_eq!(first.resolution, Resolution::ProviderPriority);

        for shift in 0..6 {
            let mut shuffled = inputs.clone();
            shuffled.rotate_left(shift % 3);
            if shift >= 3 {
                shuffled.reverse();
            }
            assert_eq!(aggregator().aggregate(shuffled).unwrap(), first);
        }

        let reversed = ConsensusAggregator::new(vec!["groq".into(), "gemini".into(), "deepseek".into()]);
        assert_eq!(
            reversed.aggregate(inputs).unwrap().final_direction,
            Direction::Hold
        );
    }

    #[test]
    fn test_top_two_tied_above_third() {
        let result = aggregator()
            .aggregate(vec![
                opinion("deepseek", Direction::Buy, 0.2),
                opinion("gemini", Direction::Sell, 0.7),
                opinion("groq", Direction::Hold, 0.7),
            ])
            .unwrap();
        assert_eq!(result.final_direction, Direction::Sell);
        assert_eq!(result.resolution, Resolution::ProviderPriority);
    }

    #[test]
    fn test_inputs_sorted_by_priority() {
        let result = aggregator()
            .aggregate(vec![
                opinion("groq", Direction::Buy, 0.1),
                opinion("deepseek", Direction::Buy, 0.2),
                opinion("gemini", Direction::Buy, 0.3),
            ])
            .unwrap();
        let order: Vec<&str> = result.inputs.iter().map(|o| o.provider_id().as_str()).collect();
        assert_eq!(order, vec!["deepseek", "gemini", "groq"]);
        assert!(result.is_unanimous());
    }

    #[test]
    fn test_two_opinions_is_partial_input() {
        let err = aggregator()
            .aggregate(vec![
                opinion("deepseek", Direction::Buy, 0.9),
                opinion("groq", Direction::Buy, 0.6),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            ConsensusError::PartialInput {
                expected: 3,
                received: 2,
                missing: vec![ProviderId::new("gemini")],
            }
        );
    }

    #[test]
    fn test_rejects_duplicates_and_mixed_inputs() {
        let dup = aggregator().aggregate(vec![
            opinion("deepseek", Direction::Buy, 0.9),
            opinion("deepseek", Direction::Sell, 0.4),
            opinion("groq", Direction::Buy, 0.6),
        ]);
        assert!(matches!(dup, Err(ConsensusError::InvalidInput(_))));

        let other_tf = Opinion::new("groq", Symbol::NQ, Timeframe::FiveDay, Direction::Buy, 0.6, "")
            .unwrap();
        let mixed = aggregator().aggregate(vec![
            opinion("deepseek", Direction::Buy, 0.9),
            opinion("gemini", Direction::Sell, 0.4),
            other_tf,
        ]);
        assert!(matches!(mixed, Err(ConsensusError::InvalidInput(_))));

        let four = aggregator().aggregate(vec![
            opinion("deepseek", Direction::Buy, 0.9),
            opinion("gemini", Direction::Sell, 0.4),
            opinion("groq", Direction::Buy, 0.6),
            opinion("extra", Direction::Buy, 0.6),
        ]);
        assert!(matches!(four, Err(ConsensusError::InvalidInput(_))));
    }

    #[test]
    fn test_reduce_labels_degraded_result() {
        let outcome = aggregator().reduce(
            Symbol::NQ,
            Timeframe::Intraday,
            vec![
                ("deepseek".into(), Ok(opinion("deepseek", Direction::Buy, 0.9))),
                (
                    "gemini".into(),
                    Err(ConsensusError::ProviderFormat {
                        provider: "gemini".into(),
                        reason: "free text".to_string(),
                    }),
                ),
                ("groq".into(), Ok(opinion("groq", Direction::Buy, 0.6))),
            ],
        );

        assert!(outcome.is_degraded());
        assert!(outcome.consensus().is_none());
        match outcome {
            TimeframeOutcome::Degraded {
                opinions, failures, ..
            } => {
                assert_eq!(opinions.len(), 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].provider_id.as_str(), "gemini");
                assert_eq!(failures[0].kind, FailureKind::Format);
            }
            TimeframeOutcome::Consensus(_) => panic!("expected degraded outcome"),
        }
    }

    #[test]
    fn test_reduce_full_set_forms_consensus() {
        let outcome = aggregator().reduce(
            Symbol::NQ,
            Timeframe::Intraday,
            vec![
                ("deepseek".into(), Ok(opinion("deepseek", Direction::Hold, 0.4))),
                ("gemini".into(), Ok(opinion("gemini", Direction::Hold, 0.5))),
                ("groq".into(), Ok(opinion("groq", Direction::Sell, 0.6))),
            ],
        );
        assert_eq!(
            outcome.consensus().map(|c| c.final_direction),
            Some(Direction::Hold)
        );
        assert_eq!(outcome.timeframe(), Timeframe::Intraday);
    }
}
