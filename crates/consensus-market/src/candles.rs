//! OHLCV candles and the market data boundary

use crate::cache::{CacheKey, MarketCache};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use consensus_core::{Symbol, Timeframe};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One price bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Drop non-finite bars and order the rest by timestamp
pub fn normalize(mut candles: Vec<Candle>) -> Vec<Candle> {
    let before = candles.len();
    candles.retain(Candle::is_finite);
    if candles.len() < before {
        tracing::debug!(dropped = before - candles.len(), "dropped non-finite candles");
    }
    candles.sort_by_key(|c| c.timestamp);
    candles
}

/// Source of OHLCV series
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Series for `symbol` over `timeframe`, ordered by timestamp
    async fn fetch(&self, symbol: Symbol, timeframe: Timeframe) -> Result<Vec<Candle>>;
}

/// Wraps a source with a timed cache
pub struct CachedMarketData {
    inner: Arc<dyn MarketDataSource>,
    cache: MarketCache<Vec<Candle>>,
    source: String,
}

impl CachedMarketData {
    pub fn new(
        inner: Arc<dyn MarketDataSource>,
        cache: MarketCache<Vec<Candle>>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            cache,
            source: source.into(),
        }
    }
}

#[async_trait]
impl MarketDataSource for CachedMarketData {
    async fn fetch(&self, symbol: Symbol, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let key = CacheKey::prices(symbol, timeframe, self.source.clone());
        self.cache
            .get_or_fetch(key, || self.inner.fetch(symbol, timeframe))
            .await
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Candle;
    use chrono::{Duration, TimeZone, Utc};

    /// Hourly candles whose closes follow `closes`
    pub fn series(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 14, 30, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::hours(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000.0 + i as f64,
            })
            .collect()
    }

    /// Linear ramp of `len` closes starting at `start`
    pub fn ramp(start: f64, step: f64, len: usize) -> Vec<Candle> {
        let closes: Vec<f64> = (0..len).map(|i| start + step * i as f64).collect();
        series(&closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_normalize_sorts_and_drops_non_finite() {
        let mut candles = fixtures::series(&[1.0, 2.0, 3.0]);
        candles.swap(0, 2);
        candles[1].close = f64::NAN;

        let normalized = normalize(candles);
        assert_eq!(normalized.len(), 2);
        assert!(normalized[0].timestamp < normalized[1].timestamp);
        assert!((normalized[0].close - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_cached_source_fetches_once() {
        let mut mock = MockMarketDataSource::new();
        mock.expect_fetch()
            .times(1)
            .returning(|_, _| Ok(fixtures::ramp(100.0, 1.0, 5)));

        let cached = CachedMarketData::new(
            Arc::new(mock),
            MarketCache::new(Duration::from_secs(60)),
            "test",
        );

        let first = cached.fetch(Symbol::NQ, Timeframe::FiveDay).await.unwrap();
        let second = cached.fetch(Symbol::NQ, Timeframe::FiveDay).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }
}
