//! Opinion providers
//!
//! Every provider sits behind [`OpinionProvider`]. The shipped implementation,
//! [`LlmOpinionProvider`], is instantiated once per configured backend and
//! differs between instances only in backend, model and prompt flavour.

pub mod parse;

use crate::config::{Backend, ProviderConfig};
use crate::error::{MarketError, Result};
use crate::indicators::PriceSummary;
use crate::prompts::{self, PromptFlavour};
use crate::sentiment::SentimentSummary;
use async_trait::async_trait;
use consensus_core::{ConsensusError, Opinion, ProviderId, Symbol};
use consensus_llm::providers::{
    AnthropicConfig, AnthropicProvider, GeminiConfig, GeminiProvider, OpenAIConfig, OpenAIProvider,
};
use consensus_llm::{CompletionRequest, LLMError, LLMProvider, Message, StopReason};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// A source of trading opinions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OpinionProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Opinion for the timeframe carried by `price`
    ///
    /// Fails with `ProviderUnavailable` for transient failures (network,
    /// auth, rate limit, timeout) and `ProviderFormat` when the answer cannot
    /// be read as an opinion.
    async fn get_opinion(
        &self,
        symbol: Symbol,
        price: &PriceSummary,
        sentiment: &SentimentSummary,
    ) -> consensus_core::Result<Opinion>;
}

/// Opinion provider backed by a hosted text-generation model
pub struct LlmOpinionProvider {
    id: ProviderId,
    llm: Arc<dyn LLMProvider>,
    model: String,
    flavour: PromptFlavour,
    temperature: f32,
    max_tokens: usize,
    timeout: Duration,
}

impl LlmOpinionProvider {
    pub fn new(id: impl Into<ProviderId>, llm: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            llm,
            model: model.into(),
            flavour: PromptFlavour::Balanced,
            temperature: 0.2,
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build the backend client described by `config`
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let llm = build_llm(config)?;
        Ok(Self {
            id: config.id.clone(),
            llm,
            model: config.model.clone(),
            flavour: config.flavour,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        })
    }

    pub fn with_flavour(mut self, flavour: PromptFlavour) -> Self {
        self.flavour = flavour;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn unavailable(&self, reason: impl Into<String>) -> ConsensusError {
        ConsensusError::ProviderUnavailable {
            provider: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn format_error(&self, reason: impl Into<String>) -> ConsensusError {
        ConsensusError::ProviderFormat {
            provider: self.id.clone(),
            reason: reason.into(),
        }
    }

    fn classify(&self, error: LLMError) -> ConsensusError {
        if error.is_unavailable() {
            self.unavailable(error.to_string())
        } else {
            self.format_error(error.to_string())
        }
    }
}

#[async_trait]
impl OpinionProvider for LlmOpinionProvider {
    fn id(&self) -> ProviderId {
        self.id.clone()
    }

    #[instrument(skip(self, price, sentiment), fields(provider = %self.id, timeframe = %price.timeframe))]
    async fn get_opinion(
        &self,
        symbol: Symbol,
        price: &PriceSummary,
        sentiment: &SentimentSummary,
    ) -> consensus_core::Result<Opinion> {
        if price.symbol != symbol {
            return Err(ConsensusError::InvalidInput(format!(
                "price summary for {} passed for {symbol}",
                price.symbol
            )));
        }

        let render_error = |e: MarketError| ConsensusError::InvalidInput(e.to_string());
        let system = prompts::opinion_system(self.flavour).map_err(render_error)?;
        let prompt = prompts::render_opinion(symbol, price, sentiment).map_err(render_error)?;

        let request = CompletionRequest::builder(&self.model)
            .system(system)
            .add_message(Message::user(prompt))
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .json_response(true)
            .build();

        let response = tokio::time::timeout(self.timeout, self.llm.complete(request))
            .await
            .map_err(|_| self.unavailable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| self.classify(e))?;

        if response.stop_reason == StopReason::ContentFilter {
            return Err(self.format_error("response withheld by content filter"));
        }

        let parsed = parse::parse_opinion(response.text(), price.timeframe).map_err(|e| {
            if response.is_truncated() {
                self.format_error(format!("{e} (answer cut off at {} tokens)", self.max_tokens))
            } else {
                self.format_error(e)
            }
        })?;

        debug!(
            direction = %parsed.direction,
            confidence = parsed.confidence,
            tokens = response.usage.total(),
            "opinion received"
        );

        Opinion::new(
            self.id.clone(),
            symbol,
            price.timeframe,
            parsed.direction,
            parsed.confidence,
            parsed.rationale,
        )
        .map_err(|e| self.format_error(e.to_string()))
    }
}

/// Construct the client for a provider's backend
pub fn build_llm(config: &ProviderConfig) -> Result<Arc<dyn LLMProvider>> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        MarketError::ConfigError(format!(
            "{} is not set for provider '{}'",
            config.backend.api_key_env(),
            config.id
        ))
    })?;
    let timeout_secs = config.timeout.as_secs().max(1);

    let llm: Arc<dyn LLMProvider> = match config.backend {
        Backend::DeepSeek => Arc::new(OpenAIProvider::with_config(
            OpenAIConfig::deepseek(api_key).with_timeout(timeout_secs),
        )?),
        Backend::Groq => Arc::new(OpenAIProvider::with_config(
            OpenAIConfig::groq(api_key).with_timeout(timeout_secs),
        )?),
        Backend::OpenAi => Arc::new(OpenAIProvider::with_config(
            OpenAIConfig::new(api_key).with_timeout(timeout_secs),
        )?),
        Backend::Gemini => Arc::new(GeminiProvider::with_config(
            GeminiConfig::new(api_key).with_timeout(timeout_secs),
        )?),
        Backend::Anthropic => Arc::new(AnthropicProvider::with_config(
            AnthropicConfig::new(api_key).with_timeout(timeout_secs),
        )?),
    };
    Ok(llm)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use consensus_llm::{CompletionResponse, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed text or error and counts calls
    pub struct ScriptedLlm {
        reply: std::result::Result<String, fn() -> LLMError>,
        pub calls: AtomicUsize,
    }

    impl ScriptedLlm {
        pub fn text(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn error(make: fn() -> LLMError) -> Self {
            Self {
                reply: Err(make),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedLlm {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> consensus_llm::Result<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    message: Message::assistant(text.clone()),
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                }),
                Err(make) => Err(make()),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }
}
