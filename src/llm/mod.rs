//! Model-provider capability interface.
//!
//! Providers expose chat completion (optionally streamed), embeddings, token
//! counting, model listing and a health probe behind one trait. A registry
//! maps stored provider records to client implementations; callers only see
//! the coordinator error kinds.

pub mod anthropic;
pub mod openai;
pub mod registry;
pub mod retry;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use registry::LlmProviderFactory;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Per-call knobs; unset fields fall back to provider defaults.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Uniform chat result shape across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
    pub model: String,
    pub usage: TokenUsage,
}

/// Uniform embeddings result shape across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsResult {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

/// Incremental content chunks from a streamed chat completion.
pub type ChatStream = BoxStream<'static, Result<String>>;

/// Capability interface implemented by every provider client.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn default_model(&self) -> &str;

    fn default_embedding_model(&self) -> Option<&str>;

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatCompletion>;

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream>;

    async fn embeddings(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingsResult>;

    /// Provider-side token estimate; exact tokenizers live with the models.
    fn count_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    async fn health_check(&self) -> bool;
}
