//! Append-only crawl telemetry: batches and sub-stage logs.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{CrawlBatch, CrawlLog, CrawlLogFilters, Page, PageParams};

/// Insert shape for one completed attempt.
#[derive(Debug, Clone, Default)]
pub struct NewCrawlBatch {
    pub batch_id: Uuid,
    pub article_id: i64,
    pub feed_id: String,
    pub crawler_id: String,
    pub article_url: Option<String>,
    pub final_status: String,
    pub error_stage: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub original_html_length: Option<i64>,
    pub processed_html_length: Option<i64>,
    pub processed_text_length: Option<i64>,
    pub content_hash: Option<String>,
    pub image_count: Option<i32>,
    pub link_count: Option<i32>,
    pub video_count: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_processing_time: Option<f64>,
    pub max_memory_usage: Option<f64>,
    pub avg_cpu_usage: Option<f64>,
}

/// Insert shape for one sub-stage log row.
#[derive(Debug, Clone, Default)]
pub struct NewCrawlLog {
    pub batch_id: Uuid,
    pub article_id: i64,
    pub feed_id: String,
    pub crawler_id: String,
    pub status: String,
    pub stage: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: Option<i32>,
    pub http_status_code: Option<i32>,
    pub request_duration: Option<f64>,
    pub parsing_time: Option<f64>,
    pub total_processing_time: Option<f64>,
}

#[derive(Clone)]
pub struct CrawlStore {
    pool: PgPool,
}

impl CrawlStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_batch(&self, batch: &NewCrawlBatch) -> Result<CrawlBatch> {
        let row = sqlx::query_as::<_, CrawlBatch>(
            r#"
            INSERT INTO crawl_batches
                (batch_id, article_id, feed_id, crawler_id, article_url, final_status,
                 error_stage, error_type, error_message,
                 original_html_length, processed_html_length, processed_text_length,
                 content_hash, image_count, link_count, video_count,
                 started_at, ended_at, total_processing_time,
                 max_memory_usage, avg_cpu_usage)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21)
            RETURNING *
            "#,
        )
        .bind(batch.batch_id)
        .bind(batch.article_id)
        .bind(&batch.feed_id)
        .bind(&batch.crawler_id)
        .bind(&batch.article_url)
        .bind(&batch.final_status)
        .bind(&batch.error_stage)
        .bind(&batch.error_type)
        .bind(&batch.error_message)
        .bind(batch.original_html_length)
        .bind(batch.processed_html_length)
        .bind(batch.processed_text_length)
        .bind(&batch.content_hash)
        .bind(batch.image_count)
        .bind(batch.link_count)
        .bind(batch.video_count)
        .bind(batch.started_at)
        .bind(batch.ended_at)
        .bind(batch.total_processing_time)
        .bind(batch.max_memory_usage)
        .bind(batch.avg_cpu_usage)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_log(&self, log: &NewCrawlLog) -> Result<CrawlLog> {
        let row = sqlx::query_as::<_, CrawlLog>(
            r#"
            INSERT INTO crawl_logs
                (batch_id, article_id, feed_id, crawler_id, status, stage,
                 error_type, error_message, retry_count, http_status_code,
                 request_duration, parsing_time, total_processing_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(log.batch_id)
        .bind(log.article_id)
        .bind(&log.feed_id)
        .bind(&log.crawler_id)
        .bind(&log.status)
        .bind(&log.stage)
        .bind(&log.error_type)
        .bind(&log.error_message)
        .bind(log.retry_count)
        .bind(log.http_status_code)
        .bind(log.request_duration)
        .bind(log.parsing_time)
        .bind(log.total_processing_time)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> Result<CrawlBatch> {
        let batch =
            sqlx::query_as::<_, CrawlBatch>("SELECT * FROM crawl_batches WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::not_found(format!("CrawlBatch {}", batch_id)))?;
        Ok(batch)
    }

    /// A batch reset discards the batch's sub-stage logs.
    pub async fn delete_batch_logs(&self, batch_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM crawl_logs WHERE batch_id = $1")
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_logs(
        &self,
        filters: &CrawlLogFilters,
        params: PageParams,
    ) -> Result<Page<CrawlLog>> {
        let params = params.normalized();

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM crawl_logs WHERE 1=1");
        let mut list_qb = QueryBuilder::<Postgres>::new("SELECT * FROM crawl_logs WHERE 1=1");
        for qb in [&mut count_qb, &mut list_qb] {
            if let Some(feed_id) = &filters.feed_id {
                qb.push(" AND feed_id = ").push_bind(feed_id.clone());
            }
            if let Some(article_id) = filters.article_id {
                qb.push(" AND article_id = ").push_bind(article_id);
            }
            if let Some(crawler_id) = &filters.crawler_id {
                qb.push(" AND crawler_id = ").push_bind(crawler_id.clone());
            }
            if let Some(status) = &filters.status {
                qb.push(" AND status = ").push_bind(status.clone());
            }
            if let Some(range) = &filters.date_range {
                if let Some(start) = range.start {
                    qb.push(" AND created_at >= ").push_bind(start);
                }
                if let Some(end) = range.end {
                    qb.push(" AND created_at <= ").push_bind(end);
                }
            }
        }

        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        list_qb.push(" ORDER BY created_at DESC LIMIT ");
        list_qb.push_bind(params.per_page);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(params.offset());

        let logs = list_qb
            .build_query_as::<CrawlLog>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(logs, total, params))
    }

    pub async fn batches_last_24h(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM crawl_batches WHERE created_at >= NOW() - INTERVAL '24 hours'",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
