//! News sentiment
//!
//! News comes from Alpha Vantage. When a text-generation provider is
//! configured, the headlines are classified by the model; otherwise, or when
//! the model's answer cannot be read, the feed's own per-article scores are
//! averaged.

use crate::api::AlphaVantageClient;
use crate::cache::{CacheKey, MarketCache};
use crate::error::{MarketError, Result};
use crate::opinion::parse::extract_json;
use crate::prompts;
use async_trait::async_trait;
use consensus_core::Symbol;
use consensus_llm::{CompletionRequest, LLMProvider, Message};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Headlines carried into prompts and reports
pub const MAX_HEADLINES: usize = 10;
/// Scores beyond this magnitude are not neutral
pub const NEUTRAL_BAND: f64 = 0.15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub summary: String,
    pub url: String,
    pub source: String,
    pub published: String,
    pub sentiment_score: Option<f64>,
    pub sentiment_label: String,
}

/// Articles returned for one keyword search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub keywords: String,
    pub articles: Vec<NewsArticle>,
}

impl NewsFeed {
    /// Mean of the article scores that are present
    pub fn average_score(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .articles
            .iter()
            .filter_map(|a| a.sentiment_score)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }

    pub fn headlines(&self) -> Vec<String> {
        self.articles
            .iter()
            .take(MAX_HEADLINES)
            .map(|a| a.title.clone())
            .collect()
    }

    /// Title and summary of the leading articles, one block per article
    pub fn snippets(&self) -> String {
        self.articles
            .iter()
            .take(MAX_HEADLINES)
            .map(|a| {
                if a.summary.is_empty() {
                    format!("- {}", a.title)
                } else {
                    format!("- {}: {}", a.title, a.summary)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > NEUTRAL_BAND {
            Self::Positive
        } else if score < -NEUTRAL_BAND {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "positive" | "bullish" | "somewhat-bullish" | "somewhat bullish" => Some(Self::Positive),
            "negative" | "bearish" | "somewhat-bearish" | "somewhat bearish" => Some(Self::Negative),
            "neutral" | "mixed" => Some(Self::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        })
    }
}

/// Overall news mood for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub label: SentimentLabel,
    /// In `[-1, 1]`
    pub score: f64,
    pub source_count: usize,
    pub headlines: Vec<String>,
}

impl SentimentSummary {
    /// Summary used when no news could be obtained
    pub fn unavailable() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
            source_count: 0,
            headlines: Vec::new(),
        }
    }

    pub fn new(label: SentimentLabel, score: f64, source_count: usize, headlines: Vec<String>) -> Self {
        Self {
            label,
            score: if score.is_finite() { score.clamp(-1.0, 1.0) } else { 0.0 },
            source_count,
            headlines,
        }
    }

    /// Average the feed's per-article scores
    pub fn from_feed(feed: &NewsFeed) -> Self {
        let score = feed.average_score().unwrap_or(0.0);
        Self::new(
            SentimentLabel::from_score(score),
            score,
            feed.articles.len(),
            feed.headlines(),
        )
    }

    pub fn to_prompt_text(&self) -> String {
        if self.source_count == 0 {
            return "News sentiment: unavailable".to_string();
        }
        let mut text = format!(
            "News sentiment: {} (score {:+.2}) from {} articles",
            self.label, self.score, self.source_count
        );
        for headline in self.headlines.iter().take(5) {
            text.push_str("\n- ");
            text.push_str(headline);
        }
        text
    }
}

/// Source of news sentiment
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn fetch(&self, symbol: Symbol) -> Result<SentimentSummary>;
}

/// Used when no news API key is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSentiment;

#[async_trait]
impl SentimentSource for NoSentiment {
    async fn fetch(&self, _symbol: Symbol) -> Result<SentimentSummary> {
        Ok(SentimentSummary::unavailable())
    }
}

/// Asks a text-generation provider to label a batch of headlines
pub struct SentimentClassifier {
    provider: Arc<dyn LLMProvider>,
    model: String,
}

impl SentimentClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn classify(&self, symbol: Symbol, feed: &NewsFeed) -> Result<SentimentSummary> {
        let prompt = prompts::render_sentiment(symbol, &feed.snippets())?;
        let request = CompletionRequest::builder(&self.model)
            .system(prompts::SENTIMENT_SYSTEM)
            .add_message(Message::user(prompt))
            .max_tokens(256)
            .temperature(0.0)
            .json_response(true)
            .build();

        let response = self.provider.complete(request).await?;
        let value = extract_json(response.text()).ok_or_else(|| {
            MarketError::SentimentError("classifier returned no JSON object".to_string())
        })?;

        let score = value
            .get("score")
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .filter(|s| s.is_finite())
            .ok_or_else(|| MarketError::SentimentError("classifier omitted score".to_string()))?;
        let label = value
            .get("label")
            .and_then(|v| v.as_str())
            .and_then(SentimentLabel::parse)
            .unwrap_or_else(|| SentimentLabel::from_score(score));

        Ok(SentimentSummary::new(
            label,
            score,
            feed.articles.len(),
            feed.headlines(),
        ))
    }
}

/// Cached Alpha Vantage news, optionally classified by a model
pub struct NewsSentiment {
    client: AlphaVantageClient,
    cache: MarketCache<NewsFeed>,
    classifier: Option<SentimentClassifier>,
}

impl NewsSentiment {
    pub fn new(client: AlphaVantageClient, cache: MarketCache<NewsFeed>) -> Self {
        Self {
            client,
            cache,
            classifier: None,
        }
    }

    pub fn with_classifier(mut self, classifier: SentimentClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Label a feed, preferring the classifier when one is set
    pub async fn summarize(&self, symbol: Symbol, feed: &NewsFeed) -> SentimentSummary {
        if feed.articles.is_empty() {
            return SentimentSummary::unavailable();
        }
        match &self.classifier {
            Some(classifier) => match classifier.classify(symbol, feed).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(%symbol, error = %e, "sentiment classification failed, using feed scores");
                    SentimentSummary::from_feed(feed)
                }
            },
            None => SentimentSummary::from_feed(feed),
        }
    }
}

#[async_trait]
impl SentimentSource for NewsSentiment {
    async fn fetch(&self, symbol: Symbol) -> Result<SentimentSummary> {
        let key = CacheKey::news(symbol, AlphaVantageClient::SOURCE);
        let feed = self
            .cache
            .get_or_fetch(key, || self.client.news_sentiment(symbol))
            .await?;
        let summary = self.summarize(symbol, &feed).await;
        debug!(%symbol, label = %summary.label, score = summary.score, "news sentiment");
        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn article(title: &str, score: Option<f64>) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            summary: format!("{title} summary"),
            url: String::new(),
            source: "Wire".to_string(),
            published: "20250303T140000".to_string(),
            sentiment_score: score,
            sentiment_label: String::new(),
        }
    }

    pub fn feed(scores: &[Option<f64>]) -> NewsFeed {
        NewsFeed {
            keywords: "test".to_string(),
            articles: scores
                .iter()
                .enumerate()
                .map(|(i, s)| article(&format!("Headline {i}"), *s))
                .collect(),
        }
    }
}
