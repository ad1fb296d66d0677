//! Feed-sync worker surface.

use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::middleware::WorkerIdentity;
use crate::models::{Feed, FeedSyncStats};
use crate::services::feed_sync::{
    PendingFeedsResponse, SubmitFeedResultRequest, SubmitFeedResultResponse,
};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct PendingFeedsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_true")]
    pub skip_recent_success: bool,
    pub success_interval_minutes: Option<i64>,
}

fn default_limit() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

/// GET /api/jobs/feed-sync/pending_feeds
pub async fn pending_feeds(
    State(state): State<AppState>,
    Query(query): Query<PendingFeedsQuery>,
) -> Result<Json<PendingFeedsResponse>> {
    let response = state
        .feed_sync
        .pending_feeds(
            query.limit,
            query.skip_recent_success,
            query.success_interval_minutes,
        )
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ClaimFeedRequest {
    #[validate(length(min = 1))]
    pub feed_id: String,
    pub crawler_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimFeedResponse {
    pub feed: Feed,
    pub crawler_id: String,
    pub consecutive_failures: i32,
    pub claimed_at: DateTime<Utc>,
}

/// POST /api/jobs/feed-sync/claim_feed
pub async fn claim_feed(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
    Json(request): Json<ClaimFeedRequest>,
) -> Result<Json<ClaimFeedResponse>> {
    request.validate()?;
    let crawler_id = request.crawler_id.unwrap_or(worker.crawler_id);
    let feed = state.feed_sync.claim_feed(&request.feed_id, &crawler_id).await?;
    Ok(Json(ClaimFeedResponse {
        consecutive_failures: feed.consecutive_failures,
        feed,
        crawler_id,
        claimed_at: Utc::now(),
    }))
}

/// POST /api/jobs/feed-sync/submit_feed_result
pub async fn submit_feed_result(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
    Json(request): Json<SubmitFeedResultRequest>,
) -> Result<Json<SubmitFeedResultResponse>> {
    request.validate()?;
    let response = state
        .feed_sync
        .submit_feed_result(&worker.crawler_id, request)
        .await?;
    Ok(Json(response))
}

/// GET /api/jobs/feed-sync/feed_sync_stats
pub async fn feed_sync_stats(State(state): State<AppState>) -> Result<Json<FeedSyncStats>> {
    Ok(Json(state.feed_sync.sync_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct ResetFeedFailuresRequest {
    pub feed_id: Option<String>,
    #[serde(default)]
    pub reactivate: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetFeedFailuresResponse {
    pub feeds_reset: u64,
    pub reactivated: bool,
}

/// POST /api/jobs/feed-sync/reset_feed_failures
pub async fn reset_feed_failures(
    State(state): State<AppState>,
    Json(request): Json<ResetFeedFailuresRequest>,
) -> Result<Json<ResetFeedFailuresResponse>> {
    let affected = state
        .feed_sync
        .reset_feed_failures(request.feed_id.as_deref(), request.reactivate)
        .await?;
    Ok(Json(ResetFeedFailuresResponse {
        feeds_reset: affected,
        reactivated: request.reactivate,
    }))
}
