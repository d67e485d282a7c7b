//! Futures consensus analysis
//!
//! Fetches price history and news sentiment for the NQ, ES and YM equity
//! index futures, asks several independent opinion providers for a Buy, Sell
//! or Hold call per prediction timeframe, and reduces the answers to a
//! single consensus. Every run is metered against the user's subscription.
//!
//! - Price series from Yahoo Finance with SMA, RSI, MACD and volume profile
//! - News sentiment from Alpha Vantage, optionally reclassified by a model
//! - Opinion providers backed by hosted text-generation models
//! - Majority-vote consensus with a configured tie-break order
//!
//! # Example
//!
//! ```rust,ignore
//! use consensus_billing::{AccountService, BillingConfig, SqliteEntitlementStore};
//! use consensus_core::Symbol;
//! use consensus_market::{AnalysisPipeline, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteEntitlementStore::connect("sqlite://fc.db").await?);
//!     let accounts = Arc::new(AccountService::new(store, BillingConfig::from_env()?));
//!     let pipeline = AnalysisPipeline::from_config(&PipelineConfig::from_env()?, accounts)?;
//!
//!     let report = pipeline.run("user-id", Symbol::NQ).await?;
//!     println!("{}", report.render_table());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cache;
pub mod candles;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod opinion;
pub mod prompts;
pub mod retry;
pub mod sentiment;

pub use cache::{CacheKey, CacheManager, MarketCache};
pub use candles::{CachedMarketData, Candle, MarketDataSource};
pub use config::{Backend, PipelineConfig, PipelineConfigBuilder, ProviderConfig};
pub use engine::{AnalysisPipeline, RunReport};
pub use error::{MarketError, Result};
pub use indicators::PriceSummary;
pub use opinion::{LlmOpinionProvider, OpinionProvider};
pub use prompts::PromptFlavour;
pub use retry::RetryPolicy;
pub use sentiment::{NewsSentiment, NoSentiment, SentimentLabel, SentimentSource, SentimentSummary};
