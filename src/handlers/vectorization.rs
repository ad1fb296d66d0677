//! Vectorization worker surface.

use axum::{
    extract::{Extension, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::middleware::WorkerIdentity;
use crate::models::{Article, VectorizationStats, VectorizationTask};
use crate::services::summary::{ProcessingStep, StepStatus};
use crate::services::vectorization::VectorizationOutcome;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct PendingVectorizationRequest {
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub worker_id: Option<String>,
}

fn default_limit() -> i64 {
    10
}

/// POST /api/jobs/vectorization/pending_vectorization
pub async fn pending_vectorization(
    State(state): State<AppState>,
    Json(request): Json<PendingVectorizationRequest>,
) -> Result<Json<Vec<Article>>> {
    Ok(Json(state.vectorization.pending_articles(request.limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct ClaimVectorizationRequest {
    pub article_id: i64,
    pub worker_id: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimVectorizationResponse {
    pub article: Article,
    pub task_id: Uuid,
    pub task: VectorizationTask,
}

/// POST /api/jobs/vectorization/claim_vectorization_task
pub async fn claim_vectorization_task(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
    Json(request): Json<ClaimVectorizationRequest>,
) -> Result<Json<ClaimVectorizationResponse>> {
    let worker_id = request.worker_id.unwrap_or(worker.crawler_id);
    let (article, task) = state
        .vectorization
        .claim_article_with_task(request.article_id, Some(&worker_id), request.model.as_deref())
        .await?;
    Ok(Json(ClaimVectorizationResponse {
        article,
        task_id: task.batch_id,
        task,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessVectorizationRequest {
    pub article_id: i64,
    pub worker_id: Option<String>,
    pub task_id: Option<Uuid>,
    pub provider_type: Option<String>,
    pub model: Option<String>,
}

/// POST /api/jobs/vectorization/process_article_vectorization
///
/// The coordinator performs the embedding call itself here; workers only
/// drive the schedule.
pub async fn process_article_vectorization(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
    Json(request): Json<ProcessVectorizationRequest>,
) -> Result<Json<VectorizationOutcome>> {
    let worker_id = request.worker_id.unwrap_or(worker.crawler_id);
    let outcome = state
        .vectorization
        .process_article_vectorization(
            request.article_id,
            Some(&worker_id),
            request.task_id,
            request.provider_type.as_deref(),
            request.model.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticleStepRequest {
    pub article_id: i64,
    pub step: ProcessingStep,
    pub status: StepStatus,
    pub data: Option<Value>,
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateArticleStepResponse {
    pub article_id: i64,
    pub step: ProcessingStep,
    pub status: StepStatus,
}

/// POST /api/jobs/vectorization/update_article_step
///
/// Step recorder for workers that run summarize/vectorize on their side and
/// only report coarse progress.
pub async fn update_article_step(
    State(state): State<AppState>,
    Json(request): Json<UpdateArticleStepRequest>,
) -> Result<Json<UpdateArticleStepResponse>> {
    state
        .summaries
        .update_article_processing_step(
            request.article_id,
            request.step,
            request.status,
            request.data.as_ref(),
            request.error_message.as_deref(),
        )
        .await?;
    Ok(Json(UpdateArticleStepResponse {
        article_id: request.article_id,
        step: request.step,
        status: request.status,
    }))
}

/// GET /api/jobs/vectorization/stats
pub async fn vectorization_stats(
    State(state): State<AppState>,
) -> Result<Json<VectorizationStats>> {
    Ok(Json(state.vectorization.stats().await?))
}
