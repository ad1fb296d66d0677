//! Consumer article reads: listing, detail with similar articles, semantic
//! search, pipeline statistics.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;

use crate::models::{
    Article, ArticleFilters, ArticleStatus, DateRange, Page, PageParams, RetryRange,
    VectorizationStats, VectorizationStatus,
};
use crate::services::retrieval::{ArticleDetail, SimilarArticle};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct ArticleListQuery {
    pub feed_id: Option<String>,
    pub status: Option<ArticleStatus>,
    pub vectorization_status: Option<VectorizationStatus>,
    pub title: Option<String>,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub min_retries: Option<i32>,
    pub max_retries: Option<i32>,
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

/// GET /api/v1/articles
pub async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Page<Article>>> {
    let date_range = if query.start_date.is_some() || query.end_date.is_some() {
        Some(DateRange {
            start: query.start_date,
            end: query.end_date,
        })
    } else {
        None
    };
    let retry_range = if query.min_retries.is_some() || query.max_retries.is_some() {
        Some(RetryRange {
            min: query.min_retries,
            max: query.max_retries,
        })
    } else {
        None
    };

    let filters = ArticleFilters {
        feed_id: query.feed_id,
        status: query.status,
        vectorization_status: query.vectorization_status,
        title: query.title,
        date_range,
        retry_range,
    };
    let params = PageParams {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.queries.list_articles(&filters, params).await?))
}

/// GET /api/v1/articles/{article_id}
pub async fn article_detail(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
) -> Result<Json<ArticleDetail>> {
    Ok(Json(state.queries.article_detail(article_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    pub model: Option<String>,
}

fn default_search_limit() -> usize {
    10
}

/// POST /api/v1/articles/search
pub async fn search_articles(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SimilarArticle>>> {
    let results = state
        .queries
        .search_articles(&request.query, request.limit.clamp(1, 50), request.model.as_deref())
        .await?;
    Ok(Json(results))
}

/// GET /api/v1/articles/stats
pub async fn article_stats(State(state): State<AppState>) -> Result<Json<VectorizationStats>> {
    Ok(Json(state.vectorization.stats().await?))
}
