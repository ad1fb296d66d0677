//! Crawl worker surface.

use axum::{
    extract::{Extension, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::WorkerIdentity;
use crate::models::{
    Article, CrawlLog, CrawlLogFilters, CrawlStats, DateRange, Page, PageParams,
};
use crate::services::crawl::{
    ArticleWithScript, SubmitCrawlResultRequest, SubmitCrawlResultResponse,
};
use crate::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct PendingArticlesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

/// GET /api/jobs/crawler/pending_articles
pub async fn pending_articles(
    State(state): State<AppState>,
    Query(query): Query<PendingArticlesQuery>,
) -> Result<Json<Vec<ArticleWithScript>>> {
    Ok(Json(state.crawl.pending_articles(query.limit).await?))
}

#[derive(Debug, Deserialize)]
pub struct ClaimArticleRequest {
    pub article_id: i64,
}

/// POST /api/jobs/crawler/claim_article
pub async fn claim_article(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
    Json(request): Json<ClaimArticleRequest>,
) -> Result<Json<ArticleWithScript>> {
    let claimed = state
        .crawl
        .claim_article(request.article_id, &worker.crawler_id)
        .await?;
    Ok(Json(claimed))
}

/// POST /api/jobs/crawler/submit_result
pub async fn submit_result(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
    Json(request): Json<SubmitCrawlResultRequest>,
) -> Result<Json<SubmitCrawlResultResponse>> {
    let response = state
        .crawl
        .submit_crawl_result(&worker.crawler_id, request)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct CrawlLogsQuery {
    pub feed_id: Option<String>,
    pub article_id: Option<i64>,
    pub crawler_id: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
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

/// GET /api/jobs/crawler/logs
pub async fn crawl_logs(
    State(state): State<AppState>,
    Query(query): Query<CrawlLogsQuery>,
) -> Result<Json<Page<CrawlLog>>> {
    let date_range = if query.start_date.is_some() || query.end_date.is_some() {
        Some(DateRange {
            start: query.start_date,
            end: query.end_date,
        })
    } else {
        None
    };
    let filters = CrawlLogFilters {
        feed_id: query.feed_id,
        article_id: query.article_id,
        crawler_id: query.crawler_id,
        status: query.status,
        date_range,
    };
    let params = PageParams {
        page: query.page,
        per_page: query.per_page,
    };
    Ok(Json(state.crawl.list_logs(&filters, params).await?))
}

/// GET /api/jobs/crawler/stats
pub async fn crawl_stats(State(state): State<AppState>) -> Result<Json<CrawlStats>> {
    Ok(Json(state.crawl.crawl_stats().await?))
}

#[derive(Debug, Deserialize)]
pub struct ResetBatchRequest {
    pub batch_id: Uuid,
}

/// POST /api/jobs/crawler/reset_batch
pub async fn reset_batch(
    State(state): State<AppState>,
    Json(request): Json<ResetBatchRequest>,
) -> Result<Json<Article>> {
    Ok(Json(state.crawl.reset_batch(request.batch_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResetArticleRequest {
    pub article_id: i64,
}

/// POST /api/jobs/crawler/reset_article
pub async fn reset_article(
    State(state): State<AppState>,
    Json(request): Json<ResetArticleRequest>,
) -> Result<Json<Article>> {
    Ok(Json(state.crawl.reset_article(request.article_id).await?))
}
