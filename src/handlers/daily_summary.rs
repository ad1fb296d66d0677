//! Daily-digest worker surface and consumer reads.

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{DailySummary, SummaryLanguage};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct FeedsNeedingSummaryQuery {
    pub target_date: NaiveDate,
    pub language: SummaryLanguage,
    pub worker_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedsNeedingSummaryResponse {
    pub target_date: NaiveDate,
    pub language: SummaryLanguage,
    pub feed_ids: Vec<String>,
}

/// GET /api/jobs/daily-summary/get_feeds_needing_summary
pub async fn get_feeds_needing_summary(
    State(state): State<AppState>,
    Query(query): Query<FeedsNeedingSummaryQuery>,
) -> Result<Json<FeedsNeedingSummaryResponse>> {
    let feed_ids = state
        .digests
        .feeds_needing_summary(query.target_date, query.language)
        .await?;
    Ok(Json(FeedsNeedingSummaryResponse {
        target_date: query.target_date,
        language: query.language,
        feed_ids,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProcessFeedSummaryQuery {
    pub feed_id: String,
    pub target_date: NaiveDate,
    pub language: SummaryLanguage,
    pub worker_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessFeedSummaryResponse {
    pub result: DailySummary,
    pub status: String,
    pub processing_time: f64,
}

/// GET /api/jobs/daily-summary/process_feed_summary
pub async fn process_feed_summary(
    State(state): State<AppState>,
    Query(query): Query<ProcessFeedSummaryQuery>,
) -> Result<Json<ProcessFeedSummaryResponse>> {
    let started = std::time::Instant::now();
    let summary = state
        .digests
        .generate_feed_summary(&query.feed_id, query.target_date, query.language)
        .await?;
    Ok(Json(ProcessFeedSummaryResponse {
        result: summary,
        status: "ok".to_string(),
        processing_time: started.elapsed().as_secs_f64(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct DailySummariesQuery {
    pub date: NaiveDate,
    pub language: SummaryLanguage,
}

/// GET /api/v1/daily-summaries
pub async fn list_daily_summaries(
    State(state): State<AppState>,
    Query(query): Query<DailySummariesQuery>,
) -> Result<Json<Vec<DailySummary>>> {
    Ok(Json(
        state.digests.summaries_for_date(query.date, query.language).await?,
    ))
}
