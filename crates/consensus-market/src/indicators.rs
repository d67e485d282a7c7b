//! Price summaries with technical indicators
//!
//! A [`PriceSummary`] condenses one candle series into the handful of numbers
//! an opinion provider needs: range, change, moving averages, RSI, MACD, a
//! trend label and, when volume is present, a volume profile. Longer
//! windows of the same symbol ride along as [`WindowContext`].

use crate::candles::Candle;
use crate::error::{MarketError, Result};
use consensus_core::{Symbol, Timeframe};
use serde::{Deserialize, Serialize};
use std::fmt;
use ta::Next;
use ta::indicators::{
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Price bins used for the volume profile
pub const PROFILE_BINS: usize = 20;
/// Share of total volume enclosed by the value area
pub const VALUE_AREA_SHARE: f64 = 0.7;

/// Direction implied by the short and medium moving averages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Where volume traded within the series' price range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Midpoint of the busiest price bin
    pub point_of_control: f64,
    pub value_area_low: f64,
    pub value_area_high: f64,
    pub total_volume: f64,
}

/// Headline numbers of another window, shown next to the one being predicted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowContext {
    pub timeframe: Timeframe,
    pub last_close: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub trend: Trend,
}

impl WindowContext {
    pub fn from_summary(summary: &PriceSummary) -> Self {
        Self {
            timeframe: summary.timeframe,
            last_close: summary.last_close,
            change_pct: summary.change_pct,
            high: summary.high,
            low: summary.low,
            trend: summary.trend,
        }
    }
}

/// Compact description of one price series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSummary {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub points: usize,
    pub first_close: f64,
    pub last_close: f64,
    pub change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub sma20: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd: Option<Macd>,
    pub trend: Trend,
    pub volume_profile: Option<VolumeProfile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<WindowContext>,
}

impl PriceSummary {
    /// Summarize `candles`, which must be ordered and non-empty
    pub fn from_candles(symbol: Symbol, timeframe: Timeframe, candles: &[Candle]) -> Result<Self> {
        let (first, last) = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(MarketError::DataUnavailable {
                    symbol: symbol.ticker().to_string(),
                    reason: format!("empty {timeframe} series"),
                });
            }
        };

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let change_pct = if first.close.abs() > f64::EPSILON {
            (last.close - first.close) / first.close * 100.0
        } else {
            0.0
        };

        let sma20 = sma(&closes, 20)?;
        let sma50 = sma(&closes, 50)?;
        let trend = match (sma20, sma50) {
            (Some(short), Some(medium)) if short > medium => Trend::Bullish,
            (Some(short), Some(medium)) if short < medium => Trend::Bearish,
            _ => Trend::Neutral,
        };

        Ok(Self {
            symbol,
            timeframe,
            points: candles.len(),
            first_close: first.close,
            last_close: last.close,
            change_pct,
            high,
            low,
            sma20,
            sma50,
            sma200: sma(&closes, 200)?,
            rsi14: rsi(&closes)?,
            macd: macd(&closes)?,
            trend,
            volume_profile: volume_profile(candles, PROFILE_BINS),
            context: Vec::new(),
        })
    }

    /// Attach other windows' headline numbers, ordered by timeframe
    pub fn with_context(mut self, mut context: Vec<WindowContext>) -> Self {
        context.retain(|window| window.timeframe != self.timeframe);
        context.sort_by_key(|window| window.timeframe);
        self.context = context;
        self
    }

    /// Multi-line rendering used inside prompts
    pub fn to_prompt_text(&self) -> String {
        let mut text = format!(
            "{} ({}) {} window: {} points\n\
             Close: {:.2} -> {:.2} ({:+.2}%)\n\
             Range: {:.2} - {:.2}\n",
            self.symbol.display_name(),
            self.symbol,
            self.timeframe,
            self.points,
            self.first_close,
            self.last_close,
            self.change_pct,
            self.low,
            self.high,
        );

        for (label, value) in [("SMA20", self.sma20), ("SMA50", self.sma50), ("SMA200", self.sma200)]
        {
            if let Some(value) = value {
                text.push_str(&format!("{label}: {value:.2}\n"));
            }
        }
        if let Some(rsi) = self.rsi14 {
            text.push_str(&format!("RSI14: {rsi:.1} ({})\n", interpret_rsi(rsi)));
        }
        if let Some(macd) = self.macd {
            text.push_str(&format!(
                "MACD: {:.3} signal {:.3} histogram {:+.3}\n",
                macd.macd, macd.signal, macd.histogram
            ));
        }
        if let Some(profile) = self.volume_profile {
            text.push_str(&format!(
                "Volume POC: {:.2}, value area {:.2} - {:.2}\n",
                profile.point_of_control, profile.value_area_low, profile.value_area_high
            ));
        }
        text.push_str(&format!("Trend: {}", self.trend));

        if !self.context.is_empty() {
            text.push_str("\nLonger-term context:");
            for window in &self.context {
                text.push_str(&format!(
                    "\n- {}: close {:.2} ({:+.2}%), range {:.2} - {:.2}, {}",
                    window.timeframe,
                    window.last_close,
                    window.change_pct,
                    window.low,
                    window.high,
                    window.trend
                ));
            }
        }
        text
    }
}

fn indicator_error(e: impl fmt::Display) -> MarketError {
    MarketError::IndicatorError(e.to_string())
}

/// Latest SMA value, or `None` until a full window is available
fn sma(closes: &[f64], period: usize) -> Result<Option<f64>> {
    if closes.len() < period {
        return Ok(None);
    }
    let mut sma = SimpleMovingAverage::new(period).map_err(indicator_error)?;
    Ok(closes.iter().map(|&c| sma.next(c)).last())
}

fn rsi(closes: &[f64]) -> Result<Option<f64>> {
    // RSI needs RSI_PERIOD price changes
    if closes.len() <= RSI_PERIOD {
        return Ok(None);
    }
    let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).map_err(indicator_error)?;
    Ok(closes.iter().map(|&c| rsi.next(c)).last())
}

fn macd(closes: &[f64]) -> Result<Option<Macd>> {
    if closes.len() < MACD_SLOW {
        return Ok(None);
    }
    let mut macd = MovingAverageConvergenceDivergence::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)
        .map_err(indicator_error)?;
    Ok(closes.iter().map(|&c| macd.next(c)).last().map(|out| Macd {
        macd: out.macd,
        signal: out.signal,
        histogram: out.histogram,
    }))
}

pub fn interpret_rsi(rsi: f64) -> &'static str {
    if rsi >= 70.0 {
        "overbought"
    } else if rsi <= 30.0 {
        "oversold"
    } else {
        "neutral"
    }
}

/// Distribute each candle's volume over the price bins its range spans
///
/// Returns `None` when the series carries no volume.
pub fn volume_profile(candles: &[Candle], bins: usize) -> Option<VolumeProfile> {
    let total_volume: f64 = candles.iter().map(|c| c.volume.max(0.0)).sum();
    if bins == 0 || total_volume <= 0.0 {
        return None;
    }

    let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let width = (high - low) / bins as f64;
    if width <= 0.0 {
        return Some(VolumeProfile {
            point_of_control: low,
            value_area_low: low,
            value_area_high: high,
            total_volume,
        });
    }

    let bin_of = |price: f64| (((price - low) / width).floor().max(0.0) as usize).min(bins - 1);
    let mut volumes = vec![0.0_f64; bins];

    for candle in candles {
        let volume = candle.volume.max(0.0);
        let range = candle.high - candle.low;
        let (first, last) = (bin_of(candle.low), bin_of(candle.high));
        if first == last || range <= 0.0 {
            volumes[first] += volume;
            continue;
        }
        for (idx, slot) in volumes.iter_mut().enumerate().take(last + 1).skip(first) {
            let bin_low = low + width * idx as f64;
            let overlap = (bin_low + width).min(candle.high) - bin_low.max(candle.low);
            if overlap > 0.0 {
                *slot += volume * overlap / range;
            }
        }
    }

    let mut by_volume: Vec<usize> = (0..bins).collect();
    by_volume.sort_by(|a, b| volumes[*b].total_cmp(&volumes[*a]).then(a.cmp(b)));

    let poc = by_volume[0];
    let target = total_volume * VALUE_AREA_SHARE;
    let mut accumulated = 0.0;
    let (mut lowest, mut highest) = (poc, poc);
    for &idx in &by_volume {
        accumulated += volumes[idx];
        lowest = lowest.min(idx);
        highest = highest.max(idx);
        if accumulated >= target {
            break;
        }
    }

    Some(VolumeProfile {
        point_of_control: low + width * (poc as f64 + 0.5),
        value_area_low: low + width * lowest as f64,
        value_area_high: low + width * (highest + 1) as f64,
        total_volume,
    })
}
