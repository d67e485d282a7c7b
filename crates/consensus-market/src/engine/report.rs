//! Run reports
//!
//! A [`RunReport`] is the persisted outcome of one run: the consensus (or the
//! degraded marker) per prediction timeframe, every underlying opinion, and
//! the inputs the providers saw.

use crate::error::Result;
use crate::indicators::PriceSummary;
use crate::sentiment::SentimentSummary;
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use consensus_core::{RunContext, Symbol, TimeframeOutcome};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub user_id: String,
    pub symbol: Symbol,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Runs left on the subscription after this run was granted
    pub runs_remaining: u32,
    pub sentiment: SentimentSummary,
    pub summaries: Vec<PriceSummary>,
    pub outcomes: Vec<TimeframeOutcome>,
}

impl RunReport {
    pub fn new(
        ctx: &RunContext,
        runs_remaining: u32,
        sentiment: SentimentSummary,
        summaries: Vec<PriceSummary>,
        outcomes: Vec<TimeframeOutcome>,
    ) -> Self {
        Self {
            run_id: ctx.run_id().to_string(),
            user_id: ctx.user_id().to_string(),
            symbol: ctx.symbol(),
            started_at: ctx.started_at(),
            finished_at: Utc::now(),
            runs_remaining,
            sentiment,
            summaries,
            outcomes,
        }
    }

    /// Number of timeframes without a consensus
    pub fn degraded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_degraded()).count()
    }

    /// Write as pretty JSON to `<dir>/<symbol>/reports/<run_id>.json`
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let folder = dir.join(self.symbol.as_str()).join("reports");
        std::fs::create_dir_all(&folder)?;
        let path = folder.join(format!("{}.json", self.run_id));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), "run report saved");
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// One row per timeframe: the consensus and each provider's call
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Timeframe", "Signal", "Confidence", "Votes", "Opinions"]);

        for outcome in &self.outcomes {
            match outcome {
                TimeframeOutcome::Consensus(result) => {
                    let votes = format!(
                        "B{} S{} H{}",
                        result.vote_breakdown.buy, result.vote_breakdown.sell, result.vote_breakdown.hold
                    );
                    let opinions = result
                        .inputs
                        .iter()
                        .map(|o| format!("{}: {} {:.0}%", o.provider_id(), o.direction(), o.confidence() * 100.0))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let signal = if result.is_tie_broken() {
                        format!("{} (tie-break)", result.final_direction)
                    } else {
                        result.final_direction.to_string()
                    };
                    table.add_row(vec![
                        result.timeframe.to_string(),
                        signal,
                        format!("{:.0}%", result.mean_confidence * 100.0),
                        votes,
                        opinions,
                    ]);
                }
                TimeframeOutcome::Degraded {
                    timeframe,
                    opinions,
                    failures,
                    reason,
                    ..
                } => {
                    let mut lines: Vec<String> = opinions
                        .iter()
                        .map(|o| format!("{}: {} {:.0}%", o.provider_id(), o.direction(), o.confidence() * 100.0))
                        .collect();
                    lines.extend(
                        failures
                            .iter()
                            .map(|f| format!("{}: missing ({:?})", f.provider_id, f.kind)),
                    );
                    lines.push(reason.clone());
                    table.add_row(vec![
                        timeframe.to_string(),
                        "no consensus".to_string(),
                        "-".to_string(),
                        "-".to_string(),
                        lines.join("\n"),
                    ]);
                }
            }
        }

        format!(
            "{} ({}) run {}\nSentiment: {} ({:+.2}, {} articles) | runs remaining: {}\n{table}",
            self.symbol.display_name(),
            self.symbol,
            self.run_id,
            self.sentiment.label,
            self.sentiment.score,
            self.sentiment.source_count,
            self.runs_remaining
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_core::{
        ConsensusAggregator, ConsensusError, Direction, Opinion, ProviderId, Timeframe,
    };

    fn opinion(provider: &str, direction: Direction, confidence: f64) -> Opinion {
        Opinion::new(provider, Symbol::NQ, Timeframe::Intraday, direction, confidence, "r").unwrap()
    }

    fn report() -> RunReport {
        let aggregator = ConsensusAggregator::new(vec!["deepseek".into(), "gemini".into(), "groq".into()]);
        let consensus = aggregator.reduce(
            Symbol::NQ,
            Timeframe::Intraday,
            vec![
                ("deepseek".into(), Ok(opinion("deepseek", Direction::Buy, 0.7))),
                ("gemini".into(), Ok(opinion("gemini", Direction::Buy, 0.6))),
                ("groq".into(), Ok(opinion("groq", Direction::Sell, 0.5))),
            ],
        );
        let degraded = aggregator.reduce(
            Symbol::NQ,
            Timeframe::FiveDay,
            vec![(
                ProviderId::new("groq"),
                Err(ConsensusError::ProviderUnavailable {
                    provider: "groq".into(),
                    reason: "timeout".to_string(),
                }),
            )],
        );

        let ctx = RunContext::new("user-1", Symbol::NQ).with_run_id("run-1");
        RunReport::new(&ctx, 2, SentimentSummary::unavailable(), Vec::new(), vec![consensus, degraded])
    }

    #[test]
    fn test_table_lists_every_timeframe() {
        let report = report();
        let text = report.render_table();

        assert!(text.contains("run run-1"));
        assert!(text.contains("intraday"));
        assert!(text.contains("Buy"));
        assert!(text.contains("no consensus"));
        assert!(text.contains("groq: missing"));
        assert_eq!(report.degraded_count(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("fc-report-{}", uuid::Uuid::new_v4()));
        let report = report();

        let path = report.save(&dir).unwrap();
        assert!(path.ends_with("NQ/reports/run-1.json"));

        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded, report);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
