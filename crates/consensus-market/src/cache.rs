//! Time-bounded caches for price series and news feeds

use crate::candles::Candle;
use crate::sentiment::NewsFeed;
use cached::{Cached, TimedCache};
use consensus_core::{Symbol, Timeframe};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cache key for an upstream request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: Symbol,
    /// Upstream source, e.g. "yahoo" or "alpha_vantage.news"
    pub source: String,
    /// Window the data covers; `None` for symbol-wide data such as news
    pub timeframe: Option<Timeframe>,
}

impl CacheKey {
    pub fn prices(symbol: Symbol, timeframe: Timeframe, source: impl Into<String>) -> Self {
        Self {
            symbol,
            source: source.into(),
            timeframe: Some(timeframe),
        }
    }

    pub fn news(symbol: Symbol, source: impl Into<String>) -> Self {
        Self {
            symbol,
            source: source.into(),
            timeframe: None,
        }
    }
}

/// Shared cache whose entries expire after a fixed lifespan
pub struct MarketCache<V> {
    cache: Arc<RwLock<TimedCache<CacheKey, V>>>,
}

impl<V: Clone> MarketCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<V> {
        // TimedCache evicts on read, so lookups need the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, value: V) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(key, value);
    }

    /// Return the cached value or run `fetcher` and cache its success
    ///
    /// Errors are passed through and never cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: CacheKey, fetcher: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            tracing::debug!("Cache hit for key: {:?}", key);
            return Ok(value);
        }

        tracing::debug!("Cache miss for key: {:?}", key);
        let value = fetcher().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V> Clone for MarketCache<V> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

/// Caches used by one pipeline
#[derive(Clone)]
pub struct CacheManager {
    /// Candle series, short lifespan
    pub prices: MarketCache<Vec<Candle>>,
    /// News feeds, longer lifespan to spare the news API quota
    pub news: MarketCache<NewsFeed>,
}

impl CacheManager {
    pub fn new(prices_ttl: Duration, news_ttl: Duration) -> Self {
        Self {
            prices: MarketCache::new(prices_ttl),
            news: MarketCache::new(news_ttl),
        }
    }

    pub fn default_config() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(900))
    }

    pub async fn clear_all(&self) {
        self.prices.clear().await;
        self.news.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn key() -> CacheKey {
        CacheKey::prices(Symbol::ES, Timeframe::FiveDay, "yahoo")
    }

    #[test]
    fn test_cache_keys_differ_by_timeframe() {
        let a = CacheKey::prices(Symbol::NQ, Timeframe::Intraday, "yahoo");
        let b = CacheKey::prices(Symbol::NQ, Timeframe::ThirtyDay, "yahoo");
        assert_ne!(a, b);
        assert_eq!(CacheKey::news(Symbol::NQ, "av").timeframe, None);
    }

    #[tokio::test]
    async fn test_cache_insert_and_get() {
        let cache = MarketCache::new(Duration::from_secs(60));
        cache.insert(key(), vec![1.0_f64, 2.0]).await;
        assert_eq!(cache.get(&key()).await, Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn test_get_or_fetch_calls_fetcher_once() {
        let cache = MarketCache::new(Duration::from_secs(60));
        let calls = Arc::new(Mutex::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value = cache
                .get_or_fetch(key(), || async move {
                    *calls.lock().await += 1;
                    Ok::<_, String>(42_u32)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(*calls.lock().await, 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache: MarketCache<u32> = MarketCache::new(Duration::from_secs(60));
        let result = cache
            .get_or_fetch(key(), || async { Err::<u32, _>("upstream down".to_string()) })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let manager = CacheManager::default_config();
        manager.prices.insert(key(), Vec::new()).await;
        manager.prices.invalidate(&key()).await;
        assert!(manager.prices.get(&key()).await.is_none());

        manager.prices.insert(key(), Vec::new()).await;
        manager
            .news
            .insert(CacheKey::news(Symbol::ES, "av"), NewsFeed::default())
            .await;
        manager.clear_all().await;
        assert!(manager.prices.is_empty().await);
        assert!(manager.news.is_empty().await);
    }
}
