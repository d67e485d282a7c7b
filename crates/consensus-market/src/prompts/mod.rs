//! Prompt templates for opinion providers and the sentiment classifier
//!
//! Templates use Jinja2 syntax rendered by MiniJinja:
//! - `system`: system prompts, one per provider flavour
//! - `user`: the per-timeframe opinion request and the sentiment request

mod system;
mod user;

pub use system::{SENTIMENT_SYSTEM, opinion_system};
pub use user::{OPINION_USER, SENTIMENT_USER};

use crate::error::Result;
use crate::indicators::PriceSummary;
use crate::sentiment::SentimentSummary;
use consensus_core::Symbol;
use minijinja::{Environment, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Emphasis a provider is asked to give its analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptFlavour {
    #[default]
    Balanced,
    Technical,
    Sentiment,
}

impl PromptFlavour {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Technical => "technical",
            Self::Sentiment => "sentiment",
        }
    }
}

impl fmt::Display for PromptFlavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptFlavour {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balanced" | "" => Ok(Self::Balanced),
            "technical" => Ok(Self::Technical),
            "sentiment" | "news" => Ok(Self::Sentiment),
            other => Err(format!("unknown prompt flavour '{other}'")),
        }
    }
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.add_filter("upper", |s: String| s.to_uppercase());
    env.add_filter("lower", |s: String| s.to_lowercase());
    env.add_filter("trim", |s: String| s.trim().to_string());
    env
}

/// Render a template string against serializable variables
pub fn render<S: Serialize>(template: &str, vars: &S) -> Result<String> {
    let env = environment();
    let value = Value::from_serialize(vars);
    Ok(env.render_str(template, value)?)
}

#[derive(Serialize)]
struct OpinionVars<'a> {
    symbol: &'a str,
    contract: &'a str,
    timeframe: &'a str,
    horizon: &'a str,
    chart: String,
    sentiment: String,
}

/// User message asking for one timeframe's opinion
pub fn render_opinion(
    symbol: Symbol,
    price: &PriceSummary,
    sentiment: &SentimentSummary,
) -> Result<String> {
    render(
        OPINION_USER,
        &OpinionVars {
            symbol: symbol.as_str(),
            contract: symbol.display_name(),
            timeframe: price.timeframe.as_str(),
            horizon: price.timeframe.horizon(),
            chart: price.to_prompt_text(),
            sentiment: sentiment.to_prompt_text(),
        },
    )
}

#[derive(Serialize)]
struct SentimentVars<'a> {
    symbol: &'a str,
    contract: &'a str,
    snippets: &'a str,
}

/// User message asking for a sentiment label over news snippets
pub fn render_sentiment(symbol: Symbol, snippets: &str) -> Result<String> {
    render(
        SENTIMENT_USER,
        &SentimentVars {
            symbol: symbol.as_str(),
            contract: symbol.display_name(),
            snippets,
        },
    )
}
