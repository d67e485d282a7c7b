//! Text-generation provider abstraction for futures-consensus
//!
//! This crate provides provider-agnostic abstractions for calling hosted
//! Large Language Models (LLMs). It includes:
//!
//! - Message types for LLM communication
//! - Completion request/response types
//! - Provider trait for LLM implementations
//! - Concrete provider implementations (behind feature flags): any
//!   OpenAI-compatible chat API (OpenAI, DeepSeek, Groq), Google Gemini, and
//!   Anthropic Claude

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod providers;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;
