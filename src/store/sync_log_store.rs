//! Feed sync audit log, one row per submission.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{FeedSyncLog, Page, PageParams};

/// Insert shape for a single-feed submission log.
#[derive(Debug, Clone, Default)]
pub struct NewFeedSyncLog {
    pub sync_id: Uuid,
    pub feed_id: Option<String>,
    pub crawler_id: Option<String>,
    pub status: String,
    pub total_time: Option<f64>,
    pub fetch_time: Option<f64>,
    pub parse_time: Option<f64>,
    pub feed_url: Option<String>,
    pub response_status: Option<i32>,
    pub entries_found: Option<i32>,
    pub new_articles: Option<i32>,
    pub error_message: Option<String>,
    pub triggered_by: Option<String>,
    pub details: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct SyncLogStore {
    pool: PgPool,
}

impl SyncLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, log: &NewFeedSyncLog) -> Result<FeedSyncLog> {
        let row = sqlx::query_as::<_, FeedSyncLog>(
            r#"
            INSERT INTO feed_sync_logs
                (sync_id, feed_id, crawler_id, status, total_feeds, synced_feeds,
                 failed_feeds, total_articles, start_time, end_time, total_time,
                 fetch_time, parse_time, feed_url, response_status, entries_found,
                 new_articles, error_message, triggered_by, details)
            VALUES ($1, $2, $3, $4, 1,
                    CASE WHEN $4 = 'ok' THEN 1 ELSE 0 END,
                    CASE WHEN $4 = 'failed' THEN 1 ELSE 0 END,
                    COALESCE($15, 0),
                    NOW() - make_interval(secs => COALESCE($5, 0)), NOW(),
                    $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(log.sync_id)
        .bind(&log.feed_id)
        .bind(&log.crawler_id)
        .bind(&log.status)
        .bind(log.total_time)
        .bind(log.fetch_time)
        .bind(log.parse_time)
        .bind(&log.feed_url)
        .bind(log.response_status)
        .bind(log.entries_found)
        .bind(log.new_articles)
        .bind(&log.error_message)
        .bind(&log.triggered_by)
        .bind(&log.details)
        .bind(log.new_articles)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_for_feed(&self, feed_id: &str, params: PageParams) -> Result<Page<FeedSyncLog>> {
        let params = params.normalized();
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feed_sync_logs WHERE feed_id = $1")
                .bind(feed_id)
                .fetch_one(&self.pool)
                .await?;

        let logs = sqlx::query_as::<_, FeedSyncLog>(
            r#"
            SELECT * FROM feed_sync_logs
            WHERE feed_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(feed_id)
        .bind(params.per_page)
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Page::new(logs, total, params))
    }

    /// Success/failure counts over the trailing 24 hours.
    pub async fn recent_counts(&self) -> Result<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'ok'),
                COUNT(*) FILTER (WHERE status = 'failed')
            FROM feed_sync_logs
            WHERE created_at >= NOW() - INTERVAL '24 hours'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
