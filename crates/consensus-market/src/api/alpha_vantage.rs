//! Alpha Vantage news sentiment client

use crate::error::{MarketError, Result};
use crate::sentiment::{NewsArticle, NewsFeed};
use chrono::{Duration, Utc};
use consensus_core::Symbol;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::{debug, instrument};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const DEFAULT_RATE_LIMIT: NonZeroU32 = NonZeroU32::new(5).expect("5 is non-zero");

/// Articles requested per call
pub const NEWS_LIMIT: usize = 50;
/// Days of news considered
pub const NEWS_WINDOW_DAYS: i64 = 7;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Search keywords that move each index
pub fn keywords(symbol: Symbol) -> &'static str {
    match symbol {
        Symbol::NQ => "NASDAQ technology earnings tech stocks",
        Symbol::ES => "S&P 500 market economy Fed interest rates",
        Symbol::YM => "Dow Jones industrial stocks economy",
    }
}

/// Alpha Vantage `NEWS_SENTIMENT` client
#[derive(Debug, Clone)]
pub struct AlphaVantageClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: SharedRateLimiter,
}

impl AlphaVantageClient {
    pub const SOURCE: &'static str = "alpha_vantage.news";

    /// Create a client allowing `rate_limit` requests per minute (5 on the free tier)
    pub fn new(api_key: impl Into<String>, rate_limit: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(DEFAULT_RATE_LIMIT));
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Create from `ALPHA_VANTAGE_API_KEY` with the free-tier rate limit
    pub fn from_env() -> Result<Self> {
        let api_key = consensus_utils::require_env("ALPHA_VANTAGE_API_KEY")?;
        Ok(Self::new(api_key, DEFAULT_RATE_LIMIT.get()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Recent news for the keywords mapped to `symbol`
    #[instrument(skip(self))]
    pub async fn news_sentiment(&self, symbol: Symbol) -> Result<NewsFeed> {
        self.rate_limiter.until_ready().await;

        let now = Utc::now();
        let time_from = (now - Duration::days(NEWS_WINDOW_DAYS))
            .format("%Y%m%dT0000")
            .to_string();
        let time_to = now.format("%Y%m%dT2359").to_string();
        let limit = NEWS_LIMIT.to_string();
        let keywords = keywords(symbol);

        let params = [
            ("function", "NEWS_SENTIMENT"),
            ("keywords", keywords),
            ("time_from", time_from.as_str()),
            ("time_to", time_to.as_str()),
            ("limit", limit.as_str()),
            ("apikey", self.api_key.as_str()),
        ];

        let response = self.client.get(&self.base_url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(MarketError::AlphaVantageError(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        let data: serde_json::Value = response.json().await?;
        let feed = parse_news(keywords, &data)?;
        debug!(articles = feed.articles.len(), "fetched news feed");
        Ok(feed)
    }
}

/// Read a `NEWS_SENTIMENT` payload
pub fn parse_news(keywords: &str, data: &serde_json::Value) -> Result<NewsFeed> {
    if let Some(error) = data.get("Error Message") {
        return Err(MarketError::AlphaVantageError(error.to_string()));
    }
    if data.get("Note").is_some() {
        return Err(MarketError::RateLimitExceeded {
            provider: "Alpha Vantage".to_string(),
        });
    }
    if let Some(info) = data.get("Information").and_then(|v| v.as_str()) {
        return Err(MarketError::AlphaVantageError(info.to_string()));
    }

    let articles = data
        .get("feed")
        .and_then(|f| f.as_array())
        .map(|items| items.iter().filter_map(parse_article).collect())
        .unwrap_or_default();

    Ok(NewsFeed {
        keywords: keywords.to_string(),
        articles,
    })
}

fn parse_article(item: &serde_json::Value) -> Option<NewsArticle> {
    let text = |key: &str| item.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let title = text("title");
    if title.is_empty() {
        return None;
    }

    // Scores arrive as numbers or numeric strings
    let score = item.get("overall_sentiment_score").and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
    });

    Some(NewsArticle {
        title,
        summary: text("summary"),
        url: text("url"),
        source: text("source"),
        published: text("time_published"),
        sentiment_score: score.filter(|s| s.is_finite()),
        sentiment_label: text("overall_sentiment_label"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keywords_per_symbol() {
        assert!(keywords(Symbol::NQ).contains("NASDAQ"));
        assert!(keywords(Symbol::ES).contains("S&P 500"));
        assert!(keywords(Symbol::YM).contains("Dow Jones"));
    }

    #[test]
    fn test_parse_feed() {
        let data = json!({
            "items": "2",
            "feed": [
                {
                    "title": "Tech rallies on earnings",
                    "summary": "Chipmakers lead",
                    "url": "https://example.com/a",
                    "source": "Wire",
                    "time_published": "20250303T140000",
                    "overall_sentiment_score": 0.31,
                    "overall_sentiment_label": "Somewhat-Bullish"
                },
                {
                    "title": "Yields climb",
                    "overall_sentiment_score": "-0.2"
                },
                { "summary": "untitled items are skipped" }
            ]
        });

        let feed = parse_news("kw", &data).unwrap();
        assert_eq!(feed.keywords, "kw");
        assert_eq!(feed.articles.len(), 2);
        assert_eq!(feed.articles[0].sentiment_score, Some(0.31));
        assert_eq!(feed.articles[1].sentiment_score, Some(-0.2));
        assert_eq!(feed.articles[1].summary, "");
    }

    #[test]
    fn test_parse_api_errors() {
        let limited = parse_news("kw", &json!({"Note": "Thank you for using Alpha Vantage"}));
        assert!(matches!(limited, Err(MarketError::RateLimitExceeded { .. })));

        let invalid = parse_news("kw", &json!({"Error Message": "Invalid API call"}));
        assert!(matches!(invalid, Err(MarketError::AlphaVantageError(_))));

        let info = parse_news("kw", &json!({"Information": "premium endpoint"}));
        assert!(matches!(info, Err(MarketError::AlphaVantageError(m)) if m == "premium endpoint"));
    }

    #[test]
    fn test_missing_feed_is_empty() {
        let feed = parse_news("kw", &json!({})).unwrap();
        assert!(feed.articles.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires API key and network access
    async fn test_news_sentiment() {
        let client = AlphaVantageClient::from_env().unwrap();
        let feed = client.news_sentiment(Symbol::ES).await.unwrap();
        assert!(feed.keywords.contains("S&P"));
    }
}
