//! Clients for upstream market data providers

pub mod alpha_vantage;
pub mod yahoo;

pub use alpha_vantage::AlphaVantageClient;
pub use yahoo::{Lookback, YahooMarketData, window};
