//! Anthropic messages-API client. Chat only; embeddings are not offered by
//! this provider and surface as a fatal error.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::{error_for_status, error_for_transport, RetryPolicy};
use super::{
    ChatCompletion, ChatMessage, ChatOptions, ChatStream, EmbeddingsResult, LlmProvider,
    ModelInfo, TokenUsage,
};
use crate::error::{AppError, Result};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    name: String,
    api_key: String,
    base_url: String,
    default_model: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl AnthropicProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            default_model: default_model.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .expect("reqwest client"),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|e| AppError::ConfigurationError {
                message: format!("invalid API key header: {}", e),
            })?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Anthropic takes the system prompt as a dedicated field.
    fn split_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<ChatMessage>) {
        let mut system_parts = Vec::new();
        let mut rest = Vec::new();
        for message in messages {
            if message.role == "system" {
                system_parts.push(message.content.clone());
            } else {
                rest.push(message.clone());
            }
        }
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, rest)
    }

    fn request_for(&self, messages: &[ChatMessage], options: &ChatOptions, stream: bool) -> MessagesRequest {
        let (system, rest) = Self::split_messages(messages);
        MessagesRequest {
            model: options
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            system,
            messages: rest,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            top_p: options.top_p,
            stop_sequences: if options.stop.is_empty() {
                None
            } else {
                Some(options.stop.clone())
            },
            stream,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_embedding_model(&self) -> Option<&str> {
        None
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatCompletion> {
        let request = self.request_for(messages, options, false);

        let response = self
            .retry
            .run(&self.name, "messages", || async {
                let url = format!("{}/messages", self.base_url);
                let response = self
                    .http
                    .post(&url)
                    .headers(self.headers()?)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| error_for_transport(&self.name, e))?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(error_for_status(&self.name, status.as_u16(), body));
                }

                response
                    .json::<MessagesResponse>()
                    .await
                    .map_err(|e| error_for_transport(&self.name, e))
            })
            .await?;

        let content = response
            .content
            .iter()
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = TokenUsage {
            prompt_tokens: response.usage.input_tokens,
            completion_tokens: response.usage.output_tokens,
            total_tokens: response.usage.input_tokens + response.usage.output_tokens,
        };

        Ok(ChatCompletion {
            message: ChatMessage::assistant(content),
            finish_reason: response.stop_reason,
            model: response.model,
            usage,
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream> {
        let request = self.request_for(messages, options, true);

        let url = format!("{}/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| error_for_transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(&self.name, status.as_u16(), body));
        }

        let provider = self.name.clone();
        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buf = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(error_for_transport(&provider, e));
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);

                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    match serde_json::from_str::<StreamEvent>(payload.trim()) {
                        Ok(event) if event.event_type == "content_block_delta" => {
                            if let Some(text) = event.delta.and_then(|d| d.text) {
                                if !text.is_empty() {
                                    yield Ok(text);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::debug!(
                                provider = %provider,
                                error = %e,
                                "Skipping unparseable stream event"
                            );
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn embeddings(&self, _texts: &[String], _model: Option<&str>) -> Result<EmbeddingsResult> {
        Err(AppError::ProviderFatal {
            provider: self.name.clone(),
            message: "embeddings are not supported by this provider".to_string(),
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| error_for_transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(&self.name, status.as_u16(), body));
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| error_for_transport(&self.name, e))?;

        Ok(models
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                owned_by: Some("anthropic".to_string()),
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn chat_joins_content_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "claude-sonnet-4",
                "content": [
                    {"type": "text", "text": "hello "},
                    {"type": "text", "text": "world"}
                ],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 10, "output_tokens": 4}
            })))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("anthropic", "key", "claude-sonnet-4")
            .with_base_url(server.uri());
        let completion = provider
            .chat(
                &[
                    ChatMessage::system("be brief"),
                    ChatMessage::user("greet me"),
                ],
                &ChatOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(completion.message.content, "hello world");
        assert_eq!(completion.usage.total_tokens, 14);
    }

    #[tokio::test]
    async fn embeddings_are_fatal() {
        let provider = AnthropicProvider::new("anthropic", "key", "claude-sonnet-4");
        let err = provider.embeddings(&["x".to_string()], None).await.unwrap_err();
        assert_eq!(err.error_code(), "PROVIDER_FATAL");
    }

    #[test]
    fn system_messages_are_hoisted() {
        let (system, rest) = AnthropicProvider::split_messages(&[
            ChatMessage::system("a"),
            ChatMessage::user("b"),
            ChatMessage::system("c"),
        ]);
        assert_eq!(system.as_deref(), Some("a\n\nc"));
        assert_eq!(rest.len(), 1);
    }
}
