//! Yahoo Finance price history for index futures

use crate::candles::{Candle, MarketDataSource, normalize};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use consensus_core::{Symbol, Timeframe};
use time::OffsetDateTime;
use tracing::{debug, instrument};
use yahoo_finance_api as yahoo;

/// How far back a timeframe reaches and at what bar size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookback {
    /// A range label Yahoo understands, e.g. "5d"
    Range(&'static str),
    /// An explicit number of days ending now
    Days(i64),
}

/// (lookback, interval) used for each timeframe
pub fn window(timeframe: Timeframe) -> (Lookback, &'static str) {
    match timeframe {
        Timeframe::Intraday => (Lookback::Range("1d"), "1m"),
        Timeframe::FiveDay => (Lookback::Range("5d"), "5m"),
        Timeframe::ThirtyDay => (Lookback::Range("1mo"), "60m"),
        Timeframe::SixtyDay => (Lookback::Days(60), "60m"),
        Timeframe::NinetyDay => (Lookback::Range("3mo"), "60m"),
        Timeframe::SixMonth => (Lookback::Range("6mo"), "1d"),
        Timeframe::OneYear => (Lookback::Range("1y"), "1d"),
    }
}

/// Market data fetcher backed by Yahoo Finance continuous contracts
#[derive(Debug, Clone, Default)]
pub struct YahooMarketData {}

impl YahooMarketData {
    pub const SOURCE: &'static str = "yahoo";

    pub fn new() -> Self {
        Self {}
    }

    fn connector() -> Result<yahoo::YahooConnector> {
        yahoo::YahooConnector::new().map_err(|e| MarketError::YahooFinanceError(e.to_string()))
    }

    fn unavailable(symbol: Symbol, reason: impl ToString) -> MarketError {
        MarketError::DataUnavailable {
            symbol: symbol.ticker().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MarketDataSource for YahooMarketData {
    #[instrument(skip(self), fields(ticker = symbol.ticker()))]
    async fn fetch(&self, symbol: Symbol, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let provider = Self::connector()?;
        let ticker = symbol.ticker();
        let (lookback, interval) = window(timeframe);

        let response = match lookback {
            Lookback::Range(range) => provider.get_quote_range(ticker, interval, range).await,
            Lookback::Days(days) => {
                let end = OffsetDateTime::now_utc();
                let start = end - time::Duration::days(days);
                provider
                    .get_quote_history_interval(ticker, start, end, interval)
                    .await
            }
        }
        .map_err(|e| Self::unavailable(symbol, e))?;

        let quotes = response
            .quotes()
            .map_err(|e| Self::unavailable(symbol, e))?;

        let candles: Vec<Candle> = quotes
            .iter()
            .filter_map(|q| {
                let timestamp = i64::try_from(q.timestamp).ok()?;
                Some(Candle {
                    timestamp: DateTime::<Utc>::from_timestamp(timestamp, 0)?,
                    open: q.open,
                    high: q.high,
                    low: q.low,
                    close: q.close,
                    volume: q.volume as f64,
                })
            })
            .collect();

        let candles = normalize(candles);
        if candles.is_empty() {
            return Err(Self::unavailable(symbol, format!("no {timeframe} data returned")));
        }

        debug!(%timeframe, points = candles.len(), "fetched price history");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prediction_windows() {
        assert_eq!(window(Timeframe::Intraday), (Lookback::Range("1d"), "1m"));
        assert_eq!(window(Timeframe::FiveDay), (Lookback::Range("5d"), "5m"));
        assert_eq!(window(Timeframe::ThirtyDay), (Lookback::Range("1mo"), "60m"));
    }

    #[test]
    fn test_context_windows() {
        assert_eq!(window(Timeframe::SixtyDay), (Lookback::Days(60), "60m"));
        assert_eq!(window(Timeframe::OneYear), (Lookback::Range("1y"), "1d"));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_es_five_day() {
        let source = YahooMarketData::new();
        let candles = source.fetch(Symbol::ES, Timeframe::FiveDay).await.unwrap();
        assert!(!candles.is_empty());
        assert!(candles.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
