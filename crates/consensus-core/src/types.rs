//! Market vocabulary: symbols, timeframes, directions and provider ids

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported index futures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    /// E-mini Nasdaq-100
    NQ,
    /// E-mini S&P 500
    ES,
    /// E-mini Dow
    YM,
}

impl Symbol {
    /// Every supported symbol
    pub const ALL: [Symbol; 3] = [Symbol::NQ, Symbol::ES, Symbol::YM];

    /// Short code, e.g. "NQ"
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NQ => "NQ",
            Self::ES => "ES",
            Self::YM => "YM",
        }
    }

    /// Continuous front-month ticker on Yahoo Finance
    pub fn ticker(&self) -> &'static str {
        match self {
            Self::NQ => "NQ=F",
            Self::ES => "ES=F",
            Self::YM => "YM=F",
        }
    }

    /// Human readable contract name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::NQ => "E-mini Nasdaq-100",
            Self::ES => "E-mini S&P 500",
            Self::YM => "E-mini Dow",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Symbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim().to_uppercase();
        match code.trim_end_matches("=F") {
            "NQ" => Ok(Self::NQ),
            "ES" => Ok(Self::ES),
            "YM" => Ok(Self::YM),
            _ => Err(format!("unsupported symbol '{s}' (expected NQ, ES or YM)")),
        }
    }
}

/// Named lookback window for price history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "intraday")]
    Intraday,
    #[serde(rename = "5d")]
    FiveDay,
    #[serde(rename = "30d")]
    ThirtyDay,
    #[serde(rename = "60d")]
    SixtyDay,
    #[serde(rename = "90d")]
    NinetyDay,
    #[serde(rename = "6mo")]
    SixMonth,
    #[serde(rename = "1y")]
    OneYear,
}

impl Timeframe {
    /// Every lookback window fetched for context
    pub const ALL: [Timeframe; 7] = [
        Timeframe::Intraday,
        Timeframe::FiveDay,
        Timeframe::ThirtyDay,
        Timeframe::SixtyDay,
        Timeframe::NinetyDay,
        Timeframe::SixMonth,
        Timeframe::OneYear,
    ];

    /// Windows for which providers are asked to predict
    pub const PREDICTION: [Timeframe; 3] =
        [Timeframe::Intraday, Timeframe::FiveDay, Timeframe::ThirtyDay];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intraday => "intraday",
            Self::FiveDay => "5d",
            Self::ThirtyDay => "30d",
            Self::SixtyDay => "60d",
            Self::NinetyDay => "90d",
            Self::SixMonth => "6mo",
            Self::OneYear => "1y",
        }
    }

    /// Whether providers produce an opinion for this window
    pub fn is_prediction(&self) -> bool {
        Self::PREDICTION.contains(self)
    }

    /// Short phrase used in prompts, e.g. "next 5 trading days"
    pub fn horizon(&self) -> &'static str {
        match self {
            Self::Intraday => "rest of the current session",
            Self::FiveDay => "next 5 trading days",
            Self::ThirtyDay => "next 30 days",
            Self::SixtyDay => "next 60 days",
            Self::NinetyDay => "next 90 days",
            Self::SixMonth => "next 6 months",
            Self::OneYear => "next 12 months",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|tf| tf.as_str() == value)
            .or(match value.as_str() {
                "1d" | "day" => Some(Self::Intraday),
                "1mo" => Some(Self::ThirtyDay),
                "2mo" => Some(Self::SixtyDay),
                "3mo" => Some(Self::NinetyDay),
                _ => None,
            })
            .ok_or_else(|| format!("unknown timeframe '{s}'"))
    }
}

/// Trading call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Buy, Direction::Sell, Direction::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
            Self::Hold => "Hold",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    /// Case-insensitive; accepts common synonyms used by models
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .trim_matches(|c: char| !c.is_ascii_alphabetic())
            .to_lowercase();
        match value.as_str() {
            "buy" | "long" | "bullish" | "strong buy" => Ok(Self::Buy),
            "sell" | "short" | "bearish" | "strong sell" => Ok(Self::Sell),
            "hold" | "neutral" | "wait" | "flat" => Ok(Self::Hold),
            _ => Err(format!("'{s}' is not a trading direction")),
        }
    }
}

/// Identifier of a configured opinion provider, e.g. "deepseek"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProviderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_parse_and_ticker() {
        assert_eq!("nq".parse::<Symbol>(), Ok(Symbol::NQ));
        assert_eq!("ES=F".parse::<Symbol>(), Ok(Symbol::ES));
        assert_eq!(Symbol::YM.ticker(), "YM=F");
        assert!("CL".parse::<Symbol>().is_err());
    }

    #[test]
    fn test_timeframe_labels_round_trip() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>(), Ok(tf));
        }
        assert_eq!("1mo".parse::<Timeframe>(), Ok(Timeframe::ThirtyDay));
        assert!(Timeframe::FiveDay.is_prediction());
        assert!(!Timeframe::OneYear.is_prediction());
    }

    #[test]
    fn test_timeframe_serde_uses_labels() {
        let json = serde_json::to_string(&Timeframe::FiveDay).unwrap();
        assert_eq!(json, "\"5d\"");
    }

    #[test]
    fn test_direction_synonyms() {
        assert_eq!("BUY".parse::<Direction>(), Ok(Direction::Buy));
        assert_eq!(" bearish ".parse::<Direction>(), Ok(Direction::Sell));
        assert_eq!("Neutral".parse::<Direction>(), Ok(Direction::Hold));
        assert_eq!("**Long**".parse::<Direction>(), Ok(Direction::Buy));
        assert!("moon".parse::<Direction>().is_err());
    }
}
