//! Assistant streaming endpoints: summarize and translate.
//!
//! With `stream=true` the events go out as SSE messages; otherwise the
//! server drives its own stream to the terminal event and returns the
//! assembled payload.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::services::assistant::{AssistantEvent, AssistantEventStream, AssistantService};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct TransformRequest {
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_stream() -> bool {
    true
}

fn default_language() -> String {
    "zh".to_string()
}

impl Default for TransformRequest {
    fn default() -> Self {
        Self {
            stream: default_stream(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransformResponse {
    pub status: String,
    pub full_content: Option<String>,
    pub error: Option<String>,
    pub events: Vec<AssistantEvent>,
}

fn user_id_from(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

fn sse_response(stream: AssistantEventStream) -> Response {
    let events = stream.map(|event| {
        Ok::<Event, Infallible>(
            Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("{}")),
        )
    });
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn collected_response(stream: AssistantEventStream) -> Response {
    let events = AssistantService::collect_stream(stream).await;
    let (status, full_content, error) = match events.last() {
        Some(AssistantEvent::Complete { full_content }) => {
            ("ok".to_string(), Some(full_content.clone()), None)
        }
        Some(AssistantEvent::Error { message }) => {
            ("error".to_string(), None, Some(message.clone()))
        }
        _ => ("error".to_string(), None, Some("stream ended early".to_string())),
    };
    Json(TransformResponse {
        status,
        full_content,
        error,
        events,
    })
    .into_response()
}

/// POST /api/v1/assistant/articles/{article_id}/summarize
pub async fn summarize_article(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    headers: HeaderMap,
    request: Option<Json<TransformRequest>>,
) -> Result<Response> {
    let Json(request) = request.unwrap_or_default();
    let user_id = user_id_from(&headers);
    let stream = state
        .assistant
        .summarize_article_stream(&user_id, article_id, request.language);

    Ok(if request.stream {
        sse_response(stream)
    } else {
        collected_response(stream).await
    })
}

/// POST /api/v1/assistant/articles/{article_id}/translate
pub async fn translate_article(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    headers: HeaderMap,
    request: Option<Json<TransformRequest>>,
) -> Result<Response> {
    let Json(request) = request.unwrap_or_default();
    let user_id = user_id_from(&headers);
    let stream = state
        .assistant
        .translate_article_stream(&user_id, article_id, request.language);

    Ok(if request.stream {
        sse_response(stream)
    } else {
        collected_response(stream).await
    })
}
