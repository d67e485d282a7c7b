//! Backend trait

use crate::{CompletionRequest, CompletionResponse, Result};
use async_trait::async_trait;

/// A hosted text-generation service (DeepSeek, Gemini, Groq, ...)
///
/// Implementations map transport, status and wire-format failures onto
/// [`LLMError`](crate::LLMError) so callers can tell an unreachable backend
/// from an unusable answer with [`LLMError::is_unavailable`](crate::LLMError::is_unavailable).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Short backend name used in logs, e.g. "gemini"
    fn name(&self) -> &str;
}
