//! The metered analysis run
//!
//! 1. The entitlement gate takes one run or refuses. Nothing else happens on
//!    refusal.
//! 2. Price series for every lookback window and news sentiment are fetched
//!    concurrently.
//! 3. For each prediction timeframe the providers are asked concurrently and
//!    their outcomes reduced by the aggregator. The other windows reach the
//!    providers as longer-term context.
//!
//! A granted run is never refunded, whether it later fails or is dropped.

use super::report::RunReport;
use crate::api::{AlphaVantageClient, YahooMarketData};
use crate::cache::CacheManager;
use crate::candles::{CachedMarketData, MarketDataSource};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::indicators::{PriceSummary, WindowContext};
use crate::opinion::{LlmOpinionProvider, OpinionProvider, build_llm};
use crate::retry::RetryPolicy;
use crate::sentiment::{
    NewsSentiment, NoSentiment, SentimentClassifier, SentimentSource, SentimentSummary,
};
use consensus_billing::{AccountService, EntitlementGate};
use consensus_core::context::keys;
use consensus_core::{
    ConsensusAggregator, ProviderOutcome, RunContext, Symbol, Timeframe, TimeframeOutcome,
};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct AnalysisPipeline {
    gate: EntitlementGate,
    accounts: Arc<AccountService>,
    market: Arc<dyn MarketDataSource>,
    sentiment: Arc<dyn SentimentSource>,
    providers: Vec<Arc<dyn OpinionProvider>>,
    aggregator: ConsensusAggregator,
    timeframes: Vec<Timeframe>,
    retry: RetryPolicy,
}

impl AnalysisPipeline {
    /// Assemble a pipeline metered against the store behind `accounts`
    pub fn new(
        accounts: Arc<AccountService>,
        market: Arc<dyn MarketDataSource>,
        sentiment: Arc<dyn SentimentSource>,
        providers: Vec<Arc<dyn OpinionProvider>>,
        aggregator: ConsensusAggregator,
    ) -> Self {
        Self {
            gate: EntitlementGate::new(Arc::clone(accounts.store())),
            accounts,
            market,
            sentiment,
            providers,
            aggregator,
            timeframes: Timeframe::PREDICTION.to_vec(),
            retry: RetryPolicy::no_retry(),
        }
    }

    /// Yahoo prices, Alpha Vantage news (when a key is set) and the configured providers
    pub fn from_config(config: &PipelineConfig, accounts: Arc<AccountService>) -> Result<Self> {
        config.validate()?;
        let caches = CacheManager::new(config.cache_ttl_prices, config.cache_ttl_news);

        let market = Arc::new(CachedMarketData::new(
            Arc::new(YahooMarketData::new()),
            caches.prices.clone(),
            YahooMarketData::SOURCE,
        ));

        let providers = config
            .providers
            .iter()
            .map(|p| {
                LlmOpinionProvider::from_config(p)
                    .map(|provider| Arc::new(provider) as Arc<dyn OpinionProvider>)
            })
            .collect::<Result<Vec<_>>>()?;

        let priority = config.effective_priority();

        let sentiment: Arc<dyn SentimentSource> = match &config.alpha_vantage_api_key {
            Some(key) => {
                let client = AlphaVantageClient::new(key.clone(), config.alpha_vantage_rate_limit);
                let mut news = NewsSentiment::new(client, caches.news.clone());
                let classifier_config = priority
                    .first()
                    .and_then(|id| config.providers.iter().find(|p| &p.id == id));
                if let (true, Some(provider)) = (config.classify_sentiment, classifier_config) {
                    news = news.with_classifier(SentimentClassifier::new(
                        build_llm(provider)?,
                        provider.model.clone(),
                    ));
                }
                Arc::new(news)
            }
            None => {
                warn!("ALPHA_VANTAGE_API_KEY not set, runs proceed without news sentiment");
                Arc::new(NoSentiment)
            }
        };

        Ok(Self::new(
            accounts,
            market,
            sentiment,
            providers,
            ConsensusAggregator::new(priority),
        )
        .with_timeframes(config.prediction_timeframes.clone())
        .with_retry(config.provider_retry.clone()))
    }

    pub fn with_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.timeframes = timeframes;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    /// Charge one run to `user_id` and analyze `symbol`
    ///
    /// Fails with `EntitlementDenied` before any external call when the user
    /// has no usable subscription.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn run(&self, user_id: &str, symbol: Symbol) -> Result<RunReport> {
        let decision = self.gate.try_consume_run(user_id).await?.require(user_id)?;

        let mut ctx = RunContext::new(user_id, symbol)
            .with_prediction_timeframes(self.timeframes.clone())
            .with_metadata(keys::RUNS_REMAINING, json!(decision.remaining));
        if let Some(plan) = decision.plan {
            ctx = ctx.with_metadata(keys::PLAN, json!(plan.as_str()));
        }

        if let Some(subscription_id) = &decision.subscription_id {
            if let Err(e) = self
                .accounts
                .record_run(user_id, subscription_id, symbol.as_str())
                .await
            {
                warn!(run_id = ctx.run_id(), error = %e, "failed to record usage");
            }
        }

        info!(run_id = ctx.run_id(), remaining = decision.remaining, "run granted");
        Ok(self.analyze(&ctx, decision.remaining).await)
    }

    /// Everything after the grant; never fails, missing inputs degrade timeframes
    async fn analyze(&self, ctx: &RunContext, runs_remaining: u32) -> RunReport {
        let symbol = ctx.symbol();

        let (prices, sentiment) = tokio::join!(self.fetch_prices(ctx), self.fetch_sentiment(symbol));

        let prediction = ctx.prediction_timeframes();
        let mut summaries = Vec::new();
        let mut context = Vec::new();
        let mut pending = Vec::new();
        let mut outcomes = Vec::new();
        for (timeframe, price) in prices {
            let predicted = prediction.contains(&timeframe);
            match price {
                Ok(summary) => {
                    if predicted {
                        pending.push(summary.clone());
                    } else {
                        context.push(WindowContext::from_summary(&summary));
                    }
                    summaries.push(summary);
                }
                Err(e) if !predicted => {
                    warn!(%symbol, %timeframe, error = %e, "context window unavailable");
                }
                Err(e) => {
                    warn!(%symbol, %timeframe, error = %e, "no price data, timeframe degraded");
                    outcomes.push(TimeframeOutcome::Degraded {
                        symbol,
                        timeframe,
                        opinions: Vec::new(),
                        failures: Vec::new(),
                        reason: format!("market data unavailable: {e}"),
                    });
                }
            }
        }

        let pending: Vec<PriceSummary> = pending
            .into_iter()
            .map(|summary| summary.with_context(context.clone()))
            .collect();
        let news = &sentiment;
        let reduced = join_all(pending.iter().map(|summary| async move {
            let opinions = self.collect_opinions(symbol, summary, news).await;
            self.aggregator.reduce(symbol, summary.timeframe, opinions)
        }))
        .await;
        outcomes.extend(reduced);
        outcomes.sort_by_key(TimeframeOutcome::timeframe);

        let report = RunReport::new(ctx, runs_remaining, sentiment, summaries, outcomes);
        info!(
            run_id = %report.run_id,
            degraded = report.degraded_count(),
            "run finished"
        );
        report
    }

    /// Every window in [`Timeframe::ALL`] plus any extra prediction windows
    async fn fetch_prices(&self, ctx: &RunContext) -> Vec<(Timeframe, Result<PriceSummary>)> {
        let symbol = ctx.symbol();
        let mut windows = Timeframe::ALL.to_vec();
        windows.extend(ctx.prediction_timeframes().iter().copied());
        windows.sort();
        windows.dedup();

        join_all(windows.into_iter().map(|timeframe| async move {
            let summary = self
                .market
                .fetch(symbol, timeframe)
                .await
                .and_then(|candles| PriceSummary::from_candles(symbol, timeframe, &candles));
            (timeframe, summary)
        }))
        .await
    }

    async fn fetch_sentiment(&self, symbol: Symbol) -> SentimentSummary {
        match self.sentiment.fetch(symbol).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(%symbol, error = %e, "sentiment unavailable");
                SentimentSummary::unavailable()
            }
        }
    }

    /// Ask every provider; each failure becomes a missing-opinion outcome
    async fn collect_opinions(
        &self,
        symbol: Symbol,
        price: &PriceSummary,
        sentiment: &SentimentSummary,
    ) -> Vec<ProviderOutcome> {
        join_all(self.providers.iter().map(|provider| async move {
            let id = provider.id();
            let operation = format!("{id} {symbol} {} opinion", price.timeframe);
            let outcome = self
                .retry
                .execute(&operation, || provider.get_opinion(symbol, price, sentiment))
                .await;
            (id, outcome)
        }))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candles::{Candle, MockMarketDataSource, fixtures as candles};
    use crate::error::MarketError;
    use crate::opinion::MockOpinionProvider;
    use crate::sentiment::MockSentimentSource;
    use async_trait::async_trait;
    use consensus_billing::{BillingConfig, EntitlementStore, MemoryEntitlementStore};
    use consensus_core::{ConsensusError, Direction, FailureKind, Opinion, ProviderId};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryEntitlementStore>, Arc<AccountService>, String) {
        let store = Arc::new(MemoryEntitlementStore::new());
        let config = BillingConfig::builder().password_rounds(1_000).build().unwrap();
        let accounts = Arc::new(AccountService::new(store.clone(), config));
        let user = accounts
            .register("trader", "trader@example.com", "correct horse")
            .await
            .unwrap();
        (store, accounts, user.id)
    }

    async fn remaining(store: &MemoryEntitlementStore, user_id: &str) -> u32 {
        store
            .latest_subscription(user_id)
            .await
            .unwrap()
            .map_or(0, |s| s.runs_remaining)
    }

    fn market() -> Arc<dyn MarketDataSource> {
        let mut mock = MockMarketDataSource::new();
        mock.expect_fetch()
            .returning(|_, _| Ok(candles::ramp(100.0, 1.0, 60)));
        Arc::new(mock)
    }

    fn sentiment() -> Arc<dyn SentimentSource> {
        let mut mock = MockSentimentSource::new();
        mock.expect_fetch()
            .returning(|_| Ok(SentimentSummary::unavailable()));
        Arc::new(mock)
    }

    fn voting(id: &'static str, direction: Direction, confidence: f64) -> Arc<dyn OpinionProvider> {
        let mut mock = MockOpinionProvider::new();
        mock.expect_id().return_const(ProviderId::new(id));
        mock.expect_get_opinion().returning(move |symbol, price, _| {
            Opinion::new(id, symbol, price.timeframe, direction, confidence, "mock")
        });
        Arc::new(mock)
    }

    fn failing(id: &'static str) -> Arc<dyn OpinionProvider> {
        let mut mock = MockOpinionProvider::new();
        mock.expect_id().return_const(ProviderId::new(id));
        mock.expect_get_opinion().returning(move |_, _, _| {
            Err(ConsensusError::ProviderUnavailable {
                provider: ProviderId::new(id),
                reason: "connection reset".to_string(),
            })
        });
        Arc::new(mock)
    }

    fn untouched(id: &'static str) -> Arc<dyn OpinionProvider> {
        let mut mock = MockOpinionProvider::new();
        mock.expect_id().return_const(ProviderId::new(id));
        mock.expect_get_opinion().times(0);
        Arc::new(mock)
    }

    fn aggregator() -> ConsensusAggregator {
        ConsensusAggregator::new(vec!["deepseek".into(), "gemini".into(), "groq".into()])
    }

    #[tokio::test]
    async fn test_run_forms_consensus_per_timeframe() {
        let (store, accounts, user_id) = setup().await;
        let pipeline = AnalysisPipeline::new(
            accounts,
            market(),
            sentiment(),
            vec![
                voting("deepseek", Direction::Buy, 0.8),
                voting("gemini", Direction::Buy, 0.6),
                voting("groq", Direction::Sell, 0.7),
            ],
            aggregator(),
        );

        let report = pipeline.run(&user_id, Symbol::NQ).await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.runs_remaining, 2);
        assert_eq!(report.summaries.len(), Timeframe::ALL.len());
        for outcome in &report.outcomes {
            let consensus = outcome.consensus().unwrap();
            assert_eq!(consensus.final_direction, Direction::Buy);
            assert!((consensus.mean_confidence - 0.7).abs() < 1e-9);
            assert_eq!(consensus.inputs.len(), 3);
        }
        assert_eq!(
            report.outcomes.iter().map(TimeframeOutcome::timeframe).collect::<Vec<_>>(),
            Timeframe::PREDICTION.to_vec()
        );
        assert_eq!(remaining(&store, &user_id).await, 2);
        assert_eq!(store.usage_count(&user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_provider_degrades_timeframe() {
        let (_, accounts, user_id) = setup().await;
        let pipeline = AnalysisPipeline::new(
            accounts,
            market(),
            sentiment(),
            vec![
                voting("deepseek", Direction::Buy, 0.8),
                voting("gemini", Direction::Hold, 0.5),
                failing("groq"),
            ],
            aggregator(),
        )
        .with_timeframes(vec![Timeframe::FiveDay]);

        let report = pipeline.run(&user_id, Symbol::ES).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        match &report.outcomes[0] {
            TimeframeOutcome::Degraded {
                opinions, failures, ..
            } => {
                assert_eq!(opinions.len(), 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].provider_id, ProviderId::new("groq"));
                assert_eq!(failures[0].kind, FailureKind::Unavailable);
            }
            other => panic!("expected degraded outcome, got {other:?}"),
        }
    }

    struct RecordingMarket {
        fetched: Mutex<Vec<Timeframe>>,
        failing: Vec<Timeframe>,
    }

    impl RecordingMarket {
        fn new(failing: Vec<Timeframe>) -> Arc<Self> {
            Arc::new(Self {
                fetched: Mutex::new(Vec::new()),
                failing,
            })
        }

        fn fetched(&self) -> Vec<Timeframe> {
            let mut fetched = self.fetched.lock().unwrap().clone();
            fetched.sort();
            fetched
        }
    }

    #[async_trait]
    impl MarketDataSource for RecordingMarket {
        async fn fetch(&self, symbol: Symbol, timeframe: Timeframe) -> Result<Vec<Candle>> {
            self.fetched.lock().unwrap().push(timeframe);
            if self.failing.contains(&timeframe) {
                return Err(MarketError::DataUnavailable {
                    symbol: symbol.ticker().to_string(),
                    reason: "no data".to_string(),
                });
            }
            Ok(candles::ramp(100.0, 1.0, 60))
        }
    }

    fn with_context(id: &'static str, windows: usize) -> Arc<dyn OpinionProvider> {
        let mut mock = MockOpinionProvider::new();
        mock.expect_id().return_const(ProviderId::new(id));
        mock.expect_get_opinion()
            .withf(move |_, price, _| {
                price.context.len() == windows
                    && price.context.iter().all(|w| !w.timeframe.is_prediction())
            })
            .returning(move |symbol, price, _| {
                Opinion::new(id, symbol, price.timeframe, Direction::Buy, 0.6, "mock")
            });
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_every_window_is_fetched_and_longer_ones_become_context() {
        let (_, accounts, user_id) = setup().await;
        let market = RecordingMarket::new(Vec::new());
        let pipeline = AnalysisPipeline::new(
            accounts,
            market.clone(),
            sentiment(),
            vec![
                with_context("deepseek", 4),
                with_context("gemini", 4),
                with_context("groq", 4),
            ],
            aggregator(),
        );

        let report = pipeline.run(&user_id, Symbol::NQ).await.unwrap();

        assert_eq!(market.fetched(), Timeframe::ALL.to_vec());
        assert_eq!(report.degraded_count(), 0);
        assert_eq!(
            report.summaries.iter().map(|s| s.timeframe).collect::<Vec<_>>(),
            Timeframe::ALL.to_vec()
        );
    }

    #[tokio::test]
    async fn test_missing_context_window_does_not_degrade() {
        let (_, accounts, user_id) = setup().await;
        let market = RecordingMarket::new(vec![Timeframe::OneYear, Timeframe::SixMonth]);
        let pipeline = AnalysisPipeline::new(
            accounts,
            market.clone(),
            sentiment(),
            vec![
                with_context("deepseek", 2),
                with_context("gemini", 2),
                with_context("groq", 2),
            ],
            aggregator(),
        );

        let report = pipeline.run(&user_id, Symbol::YM).await.unwrap();

        assert_eq!(market.fetched().len(), Timeframe::ALL.len());
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.degraded_count(), 0);
        assert_eq!(report.summaries.len(), 5);
    }

    #[tokio::test]
    async fn test_denied_run_makes_no_external_calls() {
        let (_, accounts, _) = setup().await;

        let mut market = MockMarketDataSource::new();
        market.expect_fetch().times(0);
        let mut news = MockSentimentSource::new();
        news.expect_fetch().times(0);

        let pipeline = AnalysisPipeline::new(
            accounts,
            Arc::new(market),
            Arc::new(news),
            vec![untouched("deepseek"), untouched("gemini"), untouched("groq")],
            aggregator(),
        );

        let err = pipeline.run("nobody", Symbol::YM).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Consensus(ConsensusError::EntitlementDenied { ref user_id, .. }) if user_id == "nobody"
        ));
    }

    #[tokio::test]
    async fn test_exhausted_trial_is_denied() {
        let (store, accounts, user_id) = setup().await;
        let pipeline = AnalysisPipeline::new(
            accounts,
            market(),
            sentiment(),
            vec![
                voting("deepseek", Direction::Sell, 0.6),
                voting("gemini", Direction::Sell, 0.6),
                voting("groq", Direction::Sell, 0.6),
            ],
            aggregator(),
        )
        .with_timeframes(vec![Timeframe::Intraday]);

        for _ in 0..3 {
            pipeline.run(&user_id, Symbol::NQ).await.unwrap();
        }
        let err = pipeline.run(&user_id, Symbol::NQ).await.unwrap_err();

        assert!(err.to_string().contains("no runs remaining"));
        assert_eq!(remaining(&store, &user_id).await, 0);
        assert_eq!(store.usage_count(&user_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_market_failure_is_not_refunded() {
        let (store, accounts, user_id) = setup().await;

        let mut broken = MockMarketDataSource::new();
        broken.expect_fetch().returning(|symbol, _| {
            Err(MarketError::DataUnavailable {
                symbol: symbol.ticker().to_string(),
                reason: "upstream down".to_string(),
            })
        });

        let pipeline = AnalysisPipeline::new(
            accounts,
            Arc::new(broken),
            sentiment(),
            vec![untouched("deepseek"), untouched("gemini"), untouched("groq")],
            aggregator(),
        );

        let report = pipeline.run(&user_id, Symbol::ES).await.unwrap();
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.degraded_count(), 3);
        assert!(report.summaries.is_empty());
        assert_eq!(remaining(&store, &user_id).await, 2);
    }

    struct StalledMarket;

    #[async_trait]
    impl MarketDataSource for StalledMarket {
        async fn fetch(&self, _symbol: Symbol, _timeframe: Timeframe) -> Result<Vec<Candle>> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_run_is_not_refunded() {
        let (store, accounts, user_id) = setup().await;
        let pipeline = AnalysisPipeline::new(
            accounts,
            Arc::new(StalledMarket),
            sentiment(),
            vec![untouched("deepseek"), untouched("gemini"), untouched("groq")],
            aggregator(),
        );

        let result =
            tokio::time::timeout(Duration::from_millis(50), pipeline.run(&user_id, Symbol::NQ)).await;

        assert!(result.is_err());
        assert_eq!(remaining(&store, &user_id).await, 2);
    }

    struct FlakyProvider {
        id: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OpinionProvider for FlakyProvider {
        fn id(&self) -> ProviderId {
            ProviderId::new(self.id)
        }

        async fn get_opinion(
            &self,
            symbol: Symbol,
            price: &PriceSummary,
            _sentiment: &SentimentSummary,
        ) -> consensus_core::Result<Opinion> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(ConsensusError::ProviderUnavailable {
                    provider: self.id(),
                    reason: "503".to_string(),
                });
            }
            Opinion::new(self.id, symbol, price.timeframe, Direction::Hold, 0.5, "flaky")
        }
    }

    #[tokio::test]
    async fn test_retry_is_opt_in() {
        let run = |retry: RetryPolicy| async move {
            let (_, accounts, user_id) = setup().await;
            let flaky = Arc::new(FlakyProvider {
                id: "groq",
                calls: AtomicUsize::new(0),
            });
            let pipeline = AnalysisPipeline::new(
                accounts,
                market(),
                sentiment(),
                vec![
                    voting("deepseek", Direction::Hold, 0.5),
                    voting("gemini", Direction::Hold, 0.5),
                    flaky.clone() as Arc<dyn OpinionProvider>,
                ],
                aggregator(),
            )
            .with_timeframes(vec![Timeframe::ThirtyDay])
            .with_retry(retry);
            let report = pipeline.run(&user_id, Symbol::YM).await.unwrap();
            (report, flaky.calls.load(Ordering::SeqCst))
        };

        let (report, calls) = run(RetryPolicy::no_retry()).await;
        assert!(report.outcomes[0].is_degraded());
        assert_eq!(calls, 1);

        let (report, calls) = run(RetryPolicy::fast()).await;
        assert!(!report.outcomes[0].is_degraded());
        assert_eq!(calls, 2);
    }
}
