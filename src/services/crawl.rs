//! Crawl dispatch: per-article leases, script distribution, result
//! ingestion with per-attempt telemetry.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Article, ArticleStatus, CrawlLog, CrawlLogFilters, CrawlStats, Page, PageParams,
};
use crate::services::summary::SummaryService;
use crate::store::crawl_store::{NewCrawlBatch, NewCrawlLog};
use crate::store::{ArticleStore, ContentStore, CrawlStore, ScriptStore};

/// An article handed to a worker together with the published extraction
/// script for its feed (`None` means default extraction).
#[derive(Debug, Serialize)]
pub struct ArticleWithScript {
    #[serde(flatten)]
    pub article: Article,
    pub script: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitCrawlResultRequest {
    pub article_id: i64,
    pub batch_id: Option<Uuid>,
    pub status: ArticleStatus,
    pub html_content: Option<String>,
    pub text_content: Option<String>,
    pub generated_summary: Option<String>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub stage: Option<String>,
    pub http_status: Option<i32>,
    pub image_count: Option<i32>,
    pub link_count: Option<i32>,
    pub video_count: Option<i32>,
    pub request_time: Option<f64>,
    pub parsing_time: Option<f64>,
    pub processing_time: Option<f64>,
    pub memory_usage: Option<f64>,
    pub cpu_usage: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct SubmitCrawlResultResponse {
    pub status: ArticleStatus,
    pub content_id: Option<i64>,
    pub batch_id: Uuid,
    pub retry_count: i32,
    pub terminal: bool,
}

pub struct CrawlService {
    articles: ArticleStore,
    contents: ContentStore,
    crawl_logs: CrawlStore,
    scripts: ScriptStore,
    summaries: Arc<SummaryService>,
}

impl CrawlService {
    pub fn new(
        articles: ArticleStore,
        contents: ContentStore,
        crawl_logs: CrawlStore,
        scripts: ScriptStore,
        summaries: Arc<SummaryService>,
    ) -> Self {
        Self {
            articles,
            contents,
            crawl_logs,
            scripts,
            summaries,
        }
    }

    /// Pending articles with their feed's published script attached. Script
    /// lookups are memoized per request.
    pub async fn pending_articles(&self, limit: i64) -> Result<Vec<ArticleWithScript>> {
        let articles = self.articles.pending_for_crawl(limit).await?;

        let mut scripts: HashMap<String, Option<String>> = HashMap::new();
        let mut result = Vec::with_capacity(articles.len());
        for article in articles {
            let script = match scripts.get(&article.feed_id) {
                Some(script) => script.clone(),
                None => {
                    let script = self
                        .scripts
                        .get_published(&article.feed_id)
                        .await?
                        .map(|s| s.script);
                    scripts.insert(article.feed_id.clone(), script.clone());
                    script
                }
            };
            result.push(ArticleWithScript { article, script });
        }

        Ok(result)
    }

    /// Atomic lock; a lost race is reported distinctly from not-found so the
    /// worker can move on to the next candidate.
    pub async fn claim_article(&self, article_id: i64, crawler_id: &str) -> Result<ArticleWithScript> {
        match self.articles.lock(article_id, crawler_id).await? {
            Some(article) => {
                let script = self
                    .scripts
                    .get_published(&article.feed_id)
                    .await?
                    .map(|s| s.script);
                tracing::info!(article_id, crawler_id, "Article claimed");
                Ok(ArticleWithScript { article, script })
            }
            None => {
                let article = self.articles.get(article_id).await?;
                Err(AppError::LeaseConflict {
                    holder: article.crawler_id.unwrap_or_else(|| "unknown".to_string()),
                })
            }
        }
    }

    /// Result ingestion. The submitting worker must hold the lease. Success
    /// allocates a content row, flips the article and best-effort runs the
    /// summarizer; failure bumps the retry counter. A batch and a log row
    /// are appended either way.
    pub async fn submit_crawl_result(
        &self,
        crawler_id: &str,
        request: SubmitCrawlResultRequest,
    ) -> Result<SubmitCrawlResultResponse> {
        let article = self.articles.get(request.article_id).await?;

        match article.crawler_id.as_deref() {
            Some(holder) if holder == crawler_id => {}
            Some(holder) => {
                return Err(AppError::LeaseConflict {
                    holder: holder.to_string(),
                });
            }
            None => {
                return Err(AppError::conflict(format!(
                    "Article {} is not leased",
                    request.article_id
                )));
            }
        }

        let batch_id = request.batch_id.unwrap_or_else(Uuid::new_v4);

        let (updated, content_id) = match request.status {
            ArticleStatus::Ok => {
                let html = request.html_content.as_deref().ok_or(AppError::MissingField {
                    field: "html_content".to_string(),
                })?;
                let text = request.text_content.as_deref().ok_or(AppError::MissingField {
                    field: "text_content".to_string(),
                })?;

                let content = self.contents.insert(html, text).await?;
                let updated = self
                    .articles
                    .record_crawl_success(
                        request.article_id,
                        content.id,
                        request.generated_summary.as_deref(),
                    )
                    .await?;

                // Inline summarization is best-effort: the crawl already
                // succeeded, so its failure only gets logged.
                if let Err(e) = self
                    .summaries
                    .generate_article_summaries(request.article_id, None)
                    .await
                {
                    tracing::warn!(
                        article_id = request.article_id,
                        error = %e,
                        "Inline summarization failed"
                    );
                }

                (updated, Some(content.id))
            }
            ArticleStatus::Failed | ArticleStatus::Pending => {
                let error_message = request
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "crawl failed".to_string());
                let updated = self
                    .articles
                    .record_crawl_failure(request.article_id, &error_message)
                    .await?;
                (updated, None)
            }
        };

        let now = Utc::now();
        let started_at = request
            .processing_time
            .map(|secs| now - Duration::milliseconds((secs * 1000.0) as i64));
        let final_status = match request.status {
            ArticleStatus::Ok => "ok",
            _ => "failed",
        };

        self.crawl_logs
            .create_batch(&NewCrawlBatch {
                batch_id,
                article_id: updated.id,
                feed_id: updated.feed_id.clone(),
                crawler_id: crawler_id.to_string(),
                article_url: Some(updated.link.clone()),
                final_status: final_status.to_string(),
                error_stage: request.stage.clone(),
                error_type: request.error_type.clone(),
                error_message: request.error_message.clone(),
                original_html_length: request.html_content.as_ref().map(|c| c.len() as i64),
                processed_html_length: request.html_content.as_ref().map(|c| c.len() as i64),
                processed_text_length: request.text_content.as_ref().map(|c| c.len() as i64),
                content_hash: None,
                image_count: request.image_count,
                link_count: request.link_count,
                video_count: request.video_count,
                started_at,
                ended_at: Some(now),
                total_processing_time: request.processing_time,
                max_memory_usage: request.memory_usage,
                avg_cpu_usage: request.cpu_usage,
            })
            .await?;

        self.crawl_logs
            .create_log(&NewCrawlLog {
                batch_id,
                article_id: updated.id,
                feed_id: updated.feed_id.clone(),
                crawler_id: crawler_id.to_string(),
                status: final_status.to_string(),
                stage: request.stage.clone().or_else(|| Some("complete".to_string())),
                error_type: request.error_type.clone(),
                error_message: request.error_message.clone(),
                retry_count: Some(updated.retry_count),
                http_status_code: request.http_status,
                request_duration: request.request_time,
                parsing_time: request.parsing_time,
                total_processing_time: request.processing_time,
            })
            .await?;

        let terminal = updated.status == ArticleStatus::Failed
            && updated.retry_count >= updated.max_retries;
        if terminal {
            tracing::warn!(
                article_id = updated.id,
                retry_count = updated.retry_count,
                "Article reached terminal failure"
            );
        }

        tracing::info!(
            article_id = updated.id,
            crawler_id,
            batch_id = %batch_id,
            status = final_status,
            "Recorded crawl result"
        );

        Ok(SubmitCrawlResultResponse {
            status: updated.status,
            content_id,
            batch_id,
            retry_count: updated.retry_count,
            terminal,
        })
    }

    /// Batch reset: requeue the batch's article and drop the batch logs.
    pub async fn reset_batch(&self, batch_id: Uuid) -> Result<Article> {
        let batch = self.crawl_logs.get_batch(batch_id).await?;
        let article = self.articles.reset(batch.article_id).await?;
        let dropped = self.crawl_logs.delete_batch_logs(batch_id).await?;
        tracing::info!(
            batch_id = %batch_id,
            article_id = article.id,
            dropped_logs = dropped,
            "Reset crawl batch"
        );
        Ok(article)
    }

    pub async fn reset_article(&self, article_id: i64) -> Result<Article> {
        let article = self.articles.reset(article_id).await?;
        tracing::info!(article_id, "Reset article to pending");
        Ok(article)
    }

    pub async fn list_logs(
        &self,
        filters: &CrawlLogFilters,
        params: PageParams,
    ) -> Result<Page<CrawlLog>> {
        self.crawl_logs.list_logs(filters, params).await
    }

    pub async fn crawl_stats(&self) -> Result<CrawlStats> {
        let (pending, locked, completed, failed, terminal) = self.articles.crawl_counts().await?;
        let batches = self.crawl_logs.batches_last_24h().await?;
        Ok(CrawlStats {
            pending_articles: pending,
            locked_articles: locked,
            completed_articles: completed,
            failed_articles: failed,
            terminal_failures: terminal,
            batches_last_24h: batches,
        })
    }
}
