//! Feed administration and extraction-script management.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::models::{
    CreateFeedRequest, CreateScriptRequest, Feed, FeedFilters, FeedScript, FeedSyncLog, Page,
    PageParams,
};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct FeedListQuery {
    pub title: Option<String>,
    pub url: Option<String>,
    pub category_id: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

/// GET /api/v1/feeds
pub async fn list_feeds(
    State(state): State<AppState>,
    Query(query): Query<FeedListQuery>,
) -> Result<Json<Page<Feed>>> {
    let filters = FeedFilters {
        title: query.title,
        url: query.url,
        category_id: query.category_id,
        is_active: query.is_active,
    };
    let params = PageParams {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.feeds.list(&filters, params).await?))
}

/// POST /api/v1/feeds
pub async fn create_feed(
    State(state): State<AppState>,
    Json(request): Json<CreateFeedRequest>,
) -> Result<Json<Feed>> {
    request.validate()?;
    Ok(Json(state.feeds.create(&request).await?))
}

/// GET /api/v1/feeds/{feed_id}
pub async fn get_feed(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> Result<Json<Feed>> {
    Ok(Json(state.feeds.get(&feed_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetFeedStatusRequest {
    pub is_active: bool,
}

/// PUT /api/v1/feeds/{feed_id}/status
pub async fn set_feed_status(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    Json(request): Json<SetFeedStatusRequest>,
) -> Result<Json<Feed>> {
    Ok(Json(state.feeds.set_active(&feed_id, request.is_active).await?))
}

/// GET /api/v1/feeds/{feed_id}/sync_logs
pub async fn feed_sync_logs(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<FeedSyncLog>>> {
    Ok(Json(state.sync_logs.list_for_feed(&feed_id, params).await?))
}

/// GET /api/v1/feeds/{feed_id}/scripts
pub async fn list_scripts(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> Result<Json<Vec<FeedScript>>> {
    Ok(Json(state.scripts.list_for_feed(&feed_id).await?))
}

/// POST /api/v1/feeds/{feed_id}/scripts
///
/// Stores a new opaque script version; the coordinator never interprets the
/// script body.
pub async fn create_script(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
    Json(request): Json<CreateScriptRequest>,
) -> Result<Json<FeedScript>> {
    request.validate()?;
    // Reject unknown feeds before allocating a version.
    state.feeds.get(&feed_id).await?;

    let script = state
        .scripts
        .create(&feed_id, &request.script, request.description.as_deref())
        .await?;
    let script = if request.publish {
        state.scripts.publish(script.id).await?
    } else {
        script
    };
    Ok(Json(script))
}

/// POST /api/v1/scripts/{script_id}/publish
pub async fn publish_script(
    State(state): State<AppState>,
    Path(script_id): Path<i64>,
) -> Result<Json<FeedScript>> {
    Ok(Json(state.scripts.publish(script_id).await?))
}

/// GET /api/v1/feeds/{feed_id}/scripts/published
pub async fn published_script(
    State(state): State<AppState>,
    Path(feed_id): Path<String>,
) -> Result<Json<Option<FeedScript>>> {
    Ok(Json(state.scripts.get_published(&feed_id).await?))
}
