//! Configuration for market data, opinion providers and the analysis pipeline

use crate::error::{MarketError, Result};
use crate::prompts::PromptFlavour;
use crate::retry::RetryPolicy;
use consensus_core::{ProviderId, Timeframe, aggregator::REQUIRED_OPINIONS};
use consensus_utils::{env_bool, env_list, env_parse, env_var};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Text-generation service behind an opinion provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    DeepSeek,
    Gemini,
    Groq,
    Anthropic,
    OpenAi,
}

impl Backend {
    /// Variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::Gemini => "gemini-2.0-flash-exp",
            Self::Groq => "llama-3.3-70b-versatile",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "gemini" | "google" => Ok(Self::Gemini),
            "groq" => Ok(Self::Groq),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

/// One opinion provider instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub backend: Backend,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub flavour: PromptFlavour,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(id: impl Into<ProviderId>, backend: Backend) -> Self {
        Self {
            id: id.into(),
            backend,
            model: backend.default_model().to_string(),
            api_key: None,
            flavour: PromptFlavour::Balanced,
            temperature: 0.2,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn deepseek() -> Self {
        Self::new("deepseek", Backend::DeepSeek).with_flavour(PromptFlavour::Technical)
    }

    pub fn gemini() -> Self {
        Self::new("gemini", Backend::Gemini).with_flavour(PromptFlavour::Sentiment)
    }

    pub fn groq() -> Self {
        Self::new("groq", Backend::Groq)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_flavour(mut self, flavour: PromptFlavour) -> Self {
        self.flavour = flavour;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fill the API key and model override from the environment
    ///
    /// The model override is read from `FC_<ID>_MODEL`.
    pub fn with_env(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = env_var(self.backend.api_key_env());
        }
        let model_var = format!("FC_{}_MODEL", self.id.as_str().to_uppercase());
        if let Some(model) = env_var(&model_var) {
            self.model = model;
        }
        self
    }
}

/// Configuration for one analysis pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Timeframes providers are asked to predict
    pub prediction_timeframes: Vec<Timeframe>,

    /// Exactly three opinion providers
    pub providers: Vec<ProviderConfig>,

    /// Tie-break order for equal confidences, earliest first
    pub priority: Vec<ProviderId>,

    /// Cache TTL for price series
    pub cache_ttl_prices: Duration,

    /// Cache TTL for news feeds
    pub cache_ttl_news: Duration,

    #[serde(skip_serializing)]
    pub alpha_vantage_api_key: Option<String>,

    /// Alpha Vantage requests per minute
    pub alpha_vantage_rate_limit: u32,

    /// Ask the first priority provider to classify headlines
    pub classify_sentiment: bool,

    /// Retry applied to each provider call; none by default
    pub provider_retry: RetryPolicy,

    /// Directory run reports are written to
    pub data_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let providers = vec![
            ProviderConfig::deepseek(),
            ProviderConfig::gemini(),
            ProviderConfig::groq(),
        ];
        let priority = providers.iter().map(|p| p.id.clone()).collect();
        Self {
            prediction_timeframes: Timeframe::PREDICTION.to_vec(),
            providers,
            priority,
            cache_ttl_prices: Duration::from_secs(60),
            cache_ttl_news: Duration::from_secs(900),
            alpha_vantage_api_key: None,
            alpha_vantage_rate_limit: 5,
            classify_sentiment: true,
            provider_retry: RetryPolicy::no_retry(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Defaults overlaid with the process environment
    ///
    /// Reads the provider API keys, `ALPHA_VANTAGE_API_KEY`,
    /// `FC_PROVIDER_PRIORITY`, `FC_DATA_DIR`, `FC_AV_RATE_LIMIT`,
    /// `FC_CLASSIFY_SENTIMENT` and `FC_PROVIDER_ATTEMPTS`.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mut builder = Self::builder()
            .providers(defaults.providers.into_iter().map(ProviderConfig::with_env).collect())
            .alpha_vantage_rate_limit(env_parse("FC_AV_RATE_LIMIT", defaults.alpha_vantage_rate_limit)?)
            .classify_sentiment(env_bool("FC_CLASSIFY_SENTIMENT", defaults.classify_sentiment)?);

        if let Some(key) = env_var("ALPHA_VANTAGE_API_KEY") {
            builder = builder.alpha_vantage_api_key(key);
        }
        if let Some(priority) = env_list("FC_PROVIDER_PRIORITY") {
            builder = builder.priority(priority.into_iter().map(ProviderId::from).collect());
        }
        if let Some(dir) = env_var("FC_DATA_DIR") {
            builder = builder.data_dir(dir);
        }
        let attempts: u32 = env_parse("FC_PROVIDER_ATTEMPTS", 1)?;
        if attempts > 1 {
            builder = builder.provider_retry(RetryPolicy {
                max_attempts: attempts,
                ..RetryPolicy::default()
            });
        }

        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.len() != REQUIRED_OPINIONS {
            return Err(MarketError::ConfigError(format!(
                "exactly {REQUIRED_OPINIONS} opinion providers are required, {} configured",
                self.providers.len()
            )));
        }

        let ids: HashSet<&ProviderId> = self.providers.iter().map(|p| &p.id).collect();
        if ids.len() != self.providers.len() {
            return Err(MarketError::ConfigError(
                "provider ids must be unique".to_string(),
            ));
        }

        if let Some(unknown) = self.priority.iter().find(|id| !ids.contains(id)) {
            return Err(MarketError::ConfigError(format!(
                "priority names unknown provider '{unknown}'"
            )));
        }

        if self.prediction_timeframes.is_empty() {
            return Err(MarketError::ConfigError(
                "at least one prediction timeframe is required".to_string(),
            ));
        }

        if self.alpha_vantage_rate_limit == 0 {
            return Err(MarketError::ConfigError(
                "alpha_vantage_rate_limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Priority list completed with any configured provider it omits
    pub fn effective_priority(&self) -> Vec<ProviderId> {
        let mut priority = self.priority.clone();
        for provider in &self.providers {
            if !priority.contains(&provider.id) {
                priority.push(provider.id.clone());
            }
        }
        priority
    }
}

/// Builder for PipelineConfig
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    prediction_timeframes: Option<Vec<Timeframe>>,
    providers: Option<Vec<ProviderConfig>>,
    priority: Option<Vec<ProviderId>>,
    cache_ttl_prices: Option<Duration>,
    cache_ttl_news: Option<Duration>,
    alpha_vantage_api_key: Option<String>,
    alpha_vantage_rate_limit: Option<u32>,
    classify_sentiment: Option<bool>,
    provider_retry: Option<RetryPolicy>,
    data_dir: Option<PathBuf>,
}

impl PipelineConfigBuilder {
    pub fn prediction_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.prediction_timeframes = Some(timeframes);
        self
    }

    pub fn providers(mut self, providers: Vec<ProviderConfig>) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn priority(mut self, priority: Vec<ProviderId>) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn cache_ttl_prices(mut self, duration: Duration) -> Self {
        self.cache_ttl_prices = Some(duration);
        self
    }

    pub fn cache_ttl_news(mut self, duration: Duration) -> Self {
        self.cache_ttl_news = Some(duration);
        self
    }

    pub fn alpha_vantage_api_key(mut self, key: impl Into<String>) -> Self {
        self.alpha_vantage_api_key = Some(key.into());
        self
    }

    pub fn alpha_vantage_rate_limit(mut self, per_minute: u32) -> Self {
        self.alpha_vantage_rate_limit = Some(per_minute);
        self
    }

    pub fn classify_sentiment(mut self, enabled: bool) -> Self {
        self.classify_sentiment = Some(enabled);
        self
    }

    pub fn provider_retry(mut self, policy: RetryPolicy) -> Self {
        self.provider_retry = Some(policy);
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let providers = self.providers.unwrap_or(defaults.providers);
        let priority = self
            .priority
            .unwrap_or_else(|| providers.iter().map(|p| p.id.clone()).collect());

        let config = PipelineConfig {
            prediction_timeframes: self
                .prediction_timeframes
                .unwrap_or(defaults.prediction_timeframes),
            providers,
            priority,
            cache_ttl_prices: self.cache_ttl_prices.unwrap_or(defaults.cache_ttl_prices),
            cache_ttl_news: self.cache_ttl_news.unwrap_or(defaults.cache_ttl_news),
            alpha_vantage_api_key: self.alpha_vantage_api_key,
            alpha_vantage_rate_limit: self
                .alpha_vantage_rate_limit
                .unwrap_or(defaults.alpha_vantage_rate_limit),
            classify_sentiment: self.classify_sentiment.unwrap_or(defaults.classify_sentiment),
            provider_retry: self.provider_retry.unwrap_or(defaults.provider_retry),
            data_dir: self.data_dir.unwrap_or(defaults.data_dir),
        };

        config.validate()?;
        Ok(config)
    }
}
