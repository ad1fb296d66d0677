//! Hot-topic aggregation trigger and unified-topic reads.

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::UnifiedHotTopic;
use crate::services::hot_topics::AggregationReport;
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub topic_date: NaiveDate,
    pub provider_type: Option<String>,
    pub model: Option<String>,
}

/// POST /api/v1/hot-topics/aggregate
pub async fn trigger_aggregation(
    State(state): State<AppState>,
    Json(request): Json<AggregateRequest>,
) -> Result<Json<AggregationReport>> {
    let report = state
        .hot_topics
        .aggregate_topics_for_date(
            request.topic_date,
            request.provider_type.as_deref(),
            request.model.as_deref(),
        )
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct UnifiedTopicsQuery {
    pub date: NaiveDate,
}

/// GET /api/v1/hot-topics/unified
pub async fn unified_topics(
    State(state): State<AppState>,
    Query(query): Query<UnifiedTopicsQuery>,
) -> Result<Json<Vec<UnifiedHotTopic>>> {
    Ok(Json(state.hot_topics.unified_topics_for_date(query.date).await?))
}
