//! Completion request and response types
//!
//! Opinion and sentiment prompts are single-turn: one system prompt, one user
//! message, and a JSON answer. The request shape still carries a message list
//! so providers can be exercised with short multi-turn exchanges in tests.

use crate::Message;
use serde::{Deserialize, Serialize};

/// One call to a text-generation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Backend-specific model name, e.g. `deepseek-chat`
    pub model: String,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub max_tokens: usize,

    /// Low values keep repeated runs on the same inputs close together
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    /// Constrain output to a JSON document where the backend supports it
    #[serde(default)]
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn builder(model: impl Into<String>) -> CompletionRequestBuilder {
        CompletionRequestBuilder::new(model)
    }

    /// Stop sequences, or `None` when there are none to send
    pub fn stop(&self) -> Option<Vec<String>> {
        (!self.stop_sequences.is_empty()).then(|| self.stop_sequences.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub message: Message,
    pub stop_reason: StopReason,
    pub usage: TokenUsage,
}

impl CompletionResponse {
    pub fn text(&self) -> &str {
        self.message.text()
    }

    /// Whether the answer was cut short by the token limit
    pub fn is_truncated(&self) -> bool {
        self.stop_reason == StopReason::MaxTokens
    }
}

/// Why generation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    /// Output withheld by the backend's safety filter
    ContentFilter,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }
}

pub struct CompletionRequestBuilder {
    request: CompletionRequest,
}

impl CompletionRequestBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request: CompletionRequest {
                model: model.into(),
                messages: Vec::new(),
                system: None,
                max_tokens: 1024,
                temperature: None,
                stop_sequences: Vec::new(),
                json_response: false,
            },
        }
    }

    pub fn add_message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.request.system = Some(system.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.request.max_tokens = max_tokens;
        self
    }

    /// Clamped to `0.0..=2.0`, the widest range any supported backend accepts
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.request.temperature = Some(temperature.clamp(0.0, 2.0));
        self
    }

    pub fn stop_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.request.stop_sequences.push(sequence.into());
        self
    }

    pub fn json_response(mut self, enabled: bool) -> Self {
        self.request.json_response = enabled;
        self
    }

    pub fn build(self) -> CompletionRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let request = CompletionRequest::builder("deepseek-chat")
            .add_message(Message::user("Hello"))
            .system("You are a futures analyst")
            .max_tokens(2048)
            .temperature(0.7)
            .json_response(true)
            .build();

        assert_eq!(request.model, "deepseek-chat");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.max_tokens, 2048);
        assert_eq!(request.temperature, Some(0.7));
        assert!(request.json_response);
        assert_eq!(request.stop(), None);
    }

    #[test]
    fn test_temperature_is_clamped() {
        let request = CompletionRequest::builder("m").temperature(7.5).build();
        assert_eq!(request.temperature, Some(2.0));
    }

    #[test]
    fn test_stop_sequences() {
        let request = CompletionRequest::builder("m")
            .stop_sequence("```")
            .stop_sequence("END")
            .build();
        assert_eq!(request.stop(), Some(vec!["```".to_string(), "END".to_string()]));
    }

    #[test]
    fn test_truncation() {
        let response = CompletionResponse {
            message: Message::assistant("{\"prediction_label\": \"Bu"),
            stop_reason: StopReason::MaxTokens,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
        };
        assert!(response.is_truncated());
        assert_eq!(response.usage.total(), 150);
    }
}
