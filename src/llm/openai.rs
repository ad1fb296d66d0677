//! OpenAI-compatible chat/embeddings client.
//!
//! Also serves gateways that speak the same wire protocol (volcengine,
//! gemini-compatible endpoints) through `base_url` overrides.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::{error_for_status, error_for_transport, RetryPolicy};
use super::{
    ChatCompletion, ChatMessage, ChatOptions, ChatStream, EmbeddingsResult, LlmProvider,
    ModelInfo, TokenUsage,
};
use crate::error::{AppError, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    name: String,
    api_key: String,
    base_url: String,
    default_model: String,
    default_embedding_model: Option<String>,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            default_model: default_model.into(),
            default_embedding_model: Some("text-embedding-3-large".to_string()),
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

    pub fn with_embedding_model(mut self, model: Option<String>) -> Self {
        self.default_embedding_model = model;
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
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e| {
                AppError::ConfigurationError {
                    message: format!("invalid API key header: {}", e),
                }
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn resolve_model<'a>(&'a self, options: &'a ChatOptions) -> &'a str {
        options.model.as_deref().unwrap_or(&self.default_model)
    }

    async fn chat_once(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(provider = %self.name, model = %request.model, "Chat completion request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await
            .map_err(|e| error_for_transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(&self.name, status.as_u16(), body));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|e| error_for_transport(&self.name, e))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_embedding_model(&self) -> Option<&str> {
        self.default_embedding_model.as_deref()
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatCompletion> {
        let request = ChatRequest {
            model: self.resolve_model(options).to_string(),
            messages: messages.to_vec(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stop: if options.stop.is_empty() {
                None
            } else {
                Some(options.stop.clone())
            },
            stream: false,
        };

        let response = self
            .retry
            .run(&self.name, "chat_completion", || self.chat_once(&request))
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ProviderFatal {
                provider: self.name.clone(),
                message: "empty choices in chat response".to_string(),
            })?;

        Ok(ChatCompletion {
            message: ChatMessage {
                role: choice.message.role.unwrap_or_else(|| "assistant".to_string()),
                content: choice.message.content.unwrap_or_default(),
            },
            finish_reason: choice.finish_reason,
            model: response.model,
            usage: response.usage.map(TokenUsage::from).unwrap_or_default(),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatStream> {
        let request = ChatRequest {
            model: self.resolve_model(options).to_string(),
            messages: messages.to_vec(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stop: None,
            stream: true,
        };

        let url = format!("{}/chat/completions", self.base_url);
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
                    let payload = payload.trim();
                    if payload.is_empty() || payload == "[DONE]" {
                        continue;
                    }
                    match serde_json::from_str::<StreamChunk>(payload) {
                        Ok(chunk) => {
                            if let Some(delta) = chunk
                                .choices
                                .into_iter()
                                .next()
                                .and_then(|c| c.delta.content)
                            {
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(
                                provider = %provider,
                                error = %e,
                                "Skipping unparseable stream chunk"
                            );
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }

    async fn embeddings(&self, texts: &[String], model: Option<&str>) -> Result<EmbeddingsResult> {
        let model = model
            .or(self.default_embedding_model.as_deref())
            .ok_or_else(|| AppError::ProviderFatal {
                provider: self.name.clone(),
                message: "no embedding model configured".to_string(),
            })?
            .to_string();

        let request = EmbeddingRequest {
            model: model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .retry
            .run(&self.name, "embeddings", || async {
                let url = format!("{}/embeddings", self.base_url);
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
                    .json::<EmbeddingResponse>()
                    .await
                    .map_err(|e| error_for_transport(&self.name, e))
            })
            .await?;

        Ok(EmbeddingsResult {
            embeddings: response.data.into_iter().map(|d| d.embedding).collect(),
            model: response.model,
            usage: response.usage.map(TokenUsage::from).unwrap_or_default(),
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
                owned_by: m.owned_by,
            })
            .collect())
    }

    async fn health_check(&self) -> bool {
        self.list_models().await.is_ok()
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
    owned_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiProvider {
        OpenAiProvider::new("openai", "test-key", "gpt-4o")
            .with_base_url(server.uri())
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn chat_returns_uniform_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o",
                "choices": [{
                    "message": {"role": "assistant", "content": "hello"},
                    "finish_reason": "stop"
                }],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let completion = provider
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(completion.message.content, "hello");
        assert_eq!(completion.finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.total_tokens, 7);
    }

    #[tokio::test]
    async fn embeddings_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "text-embedding-3-large",
                "data": [{"embedding": [0.1, 0.2, 0.3]}],
                "usage": {"prompt_tokens": 3, "total_tokens": 3}
            })))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider
            .embeddings(&["hello".to_string()], None)
            .await
            .unwrap();
        assert_eq!(result.embeddings.len(), 1);
        assert_eq!(result.embeddings[0].len(), 3);
    }

    #[tokio::test]
    async fn auth_failure_is_fatal_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PROVIDER_FATAL");
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(2)
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let err = provider
            .chat(&[ChatMessage::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PROVIDER_TRANSIENT");
    }

    #[test]
    fn token_estimate_rounds_up() {
        let provider = OpenAiProvider::new("openai", "k", "gpt-4o");
        assert_eq!(provider.count_tokens(""), 0);
        assert_eq!(provider.count_tokens("abcd"), 1);
        assert_eq!(provider.count_tokens("abcde"), 2);
    }
}
