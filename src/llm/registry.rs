//! Provider registry: stored records to client instances.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::store::llm_store::ProviderRecord;
use crate::store::LlmProviderStore;

use super::{AnthropicProvider, LlmProvider, OpenAiProvider, RetryPolicy};

/// Creates provider clients from the `llm_providers` table.
#[derive(Clone)]
pub struct LlmProviderFactory {
    store: LlmProviderStore,
    default_chat_provider: Option<String>,
    default_embedding_provider: Option<String>,
}

impl LlmProviderFactory {
    pub fn new(
        store: LlmProviderStore,
        default_chat_provider: Option<String>,
        default_embedding_provider: Option<String>,
    ) -> Self {
        Self {
            store,
            default_chat_provider,
            default_embedding_provider,
        }
    }

    /// Resolve a provider by name. With no name, the configured default is
    /// used, else the first active record.
    pub async fn create_provider(
        &self,
        name: Option<&str>,
        model: Option<&str>,
    ) -> Result<Arc<dyn LlmProvider>> {
        let record = match name.or(self.default_chat_provider.as_deref()) {
            Some(name) => self.store.get_by_name(name).await?,
            None => self.store.first_active().await?,
        };
        self.build(record, model)
    }

    /// Resolve the provider used for embeddings.
    pub async fn create_embedding_provider(&self) -> Result<Arc<dyn LlmProvider>> {
        let record = match self.default_embedding_provider.as_deref() {
            Some(name) => self.store.get_by_name(name).await?,
            None => self.store.first_active().await?,
        };
        self.build(record, None)
    }

    fn build(&self, record: ProviderRecord, model: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let retry = RetryPolicy::new(record.max_retries.max(1) as u32, Duration::from_secs(2));
        let timeout = Duration::from_secs(record.request_timeout_secs.max(1) as u64);
        let default_model = model.unwrap_or(&record.default_model).to_string();

        tracing::debug!(
            provider = %record.name,
            provider_type = %record.provider_type,
            model = %default_model,
            "Building provider client"
        );

        match record.provider_type.to_lowercase().as_str() {
            // Anything speaking the OpenAI wire protocol, including hosted
            // gateways configured through api_base_url.
            "openai" | "volcengine" | "gemini" => {
                let mut provider = OpenAiProvider::new(record.name, record.api_key, default_model)
                    .with_embedding_model(record.default_embedding_model)
                    .with_retry(retry)
                    .with_timeout(timeout);
                if let Some(base_url) = record.api_base_url {
                    provider = provider.with_base_url(base_url);
                }
                Ok(Arc::new(provider))
            }
            "anthropic" => {
                let mut provider =
                    AnthropicProvider::new(record.name, record.api_key, default_model)
                        .with_retry(retry)
                        .with_timeout(timeout);
                if let Some(base_url) = record.api_base_url {
                    provider = provider.with_base_url(base_url);
                }
                Ok(Arc::new(provider))
            }
            other => Err(AppError::ConfigurationError {
                message: format!("unsupported provider type: {}", other),
            }),
        }
    }
}
