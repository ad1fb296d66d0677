//! Feed persistence and the sync-queue selection / lease SQL.

use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::{AppError, Result};
use crate::models::{CreateFeedRequest, Feed, FeedFilters, FeedSyncStats, Page, PageParams};

#[derive(Clone)]
pub struct FeedStore {
    pool: PgPool,
}

impl FeedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, feed_id: &str) -> Result<Feed> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = $1")
            .bind(feed_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Feed {}", feed_id)))?;
        Ok(feed)
    }

    pub async fn create(&self, req: &CreateFeedRequest) -> Result<Feed> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (id, url, category_id, title, description, logo,
                               crawl_with_js, crawl_delay_s, custom_headers, use_proxy)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&req.id)
        .bind(&req.url)
        .bind(&req.category_id)
        .bind(&req.title)
        .bind(&req.description)
        .bind(&req.logo)
        .bind(req.crawl_with_js)
        .bind(req.crawl_delay_s)
        .bind(&req.custom_headers)
        .bind(req.use_proxy)
        .fetch_one(&self.pool)
        .await?;
        Ok(feed)
    }

    pub async fn set_active(&self, feed_id: &str, is_active: bool) -> Result<Feed> {
        let feed = sqlx::query_as::<_, Feed>(
            "UPDATE feeds SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(feed_id)
        .bind(is_active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Feed {}", feed_id)))?;
        Ok(feed)
    }

    /// Filtered, paginated admin listing.
    pub async fn list(&self, filters: &FeedFilters, params: PageParams) -> Result<Page<Feed>> {
        let params = params.normalized();

        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM feeds WHERE 1=1");
        let mut list_qb = QueryBuilder::<Postgres>::new("SELECT * FROM feeds WHERE 1=1");
        for qb in [&mut count_qb, &mut list_qb] {
            if let Some(title) = &filters.title {
                qb.push(" AND title ILIKE ").push_bind(format!("%{}%", title));
            }
            if let Some(url) = &filters.url {
                qb.push(" AND url ILIKE ").push_bind(format!("%{}%", url));
            }
            if let Some(category_id) = &filters.category_id {
                qb.push(" AND category_id = ").push_bind(category_id.clone());
            }
            if let Some(is_active) = filters.is_active {
                qb.push(" AND is_active = ").push_bind(is_active);
            }
        }

        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        list_qb.push(" ORDER BY id DESC LIMIT ");
        list_qb.push_bind(params.per_page);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(params.offset());

        let feeds = list_qb
            .build_query_as::<Feed>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(feeds, total, params))
    }

    /// Flip every feed at or past the failure threshold to inactive,
    /// recording the disable reason. Returns the affected feed ids.
    pub async fn auto_disable_failed(&self, threshold: i32) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            r#"
            UPDATE feeds
            SET is_active = FALSE,
                last_sync_error = 'auto-disabled after ' || consecutive_failures || ' consecutive failures',
                updated_at = NOW()
            WHERE is_active = TRUE AND consecutive_failures >= $1
            RETURNING id
            "#,
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Sync-queue selection: active feeds below the failure threshold whose
    /// lease is free or expired, never-synced first, then healthiest, then
    /// oldest.
    pub async fn pending_for_sync(
        &self,
        limit: i64,
        threshold: i32,
        lease_timeout: Duration,
        skip_recent_success: bool,
        success_interval_minutes: i64,
    ) -> Result<Vec<Feed>> {
        let now = Utc::now();
        let lease_cutoff = now - lease_timeout;
        let success_cutoff = now - Duration::minutes(success_interval_minutes);

        let mut qb = QueryBuilder::<Postgres>::new(
            r#"SELECT * FROM feeds
               WHERE is_active = TRUE
                 AND consecutive_failures < "#,
        );
        qb.push_bind(threshold);
        qb.push(" AND (last_sync_crawler_id IS NULL OR last_sync_started_at < ");
        qb.push_bind(lease_cutoff);
        qb.push(")");
        if skip_recent_success {
            qb.push(" AND (last_successful_sync_at IS NULL OR last_successful_sync_at < ");
            qb.push_bind(success_cutoff);
            qb.push(")");
        }
        qb.push(
            r#" ORDER BY
                 CASE WHEN last_sync_at IS NULL THEN 0 ELSE 1 END,
                 consecutive_failures ASC,
                 last_sync_at ASC NULLS FIRST
               LIMIT "#,
        );
        qb.push_bind(limit.max(1));

        let feeds = qb.build_query_as::<Feed>().fetch_all(&self.pool).await?;
        Ok(feeds)
    }

    /// Compare-and-set lease acquisition. Succeeds only when the feed is
    /// active, below the disable threshold, and unleased / expired / already
    /// held by the requester. Returns `None` when the CAS loses.
    pub async fn claim(
        &self,
        feed_id: &str,
        crawler_id: &str,
        threshold: i32,
        lease_timeout: Duration,
    ) -> Result<Option<Feed>> {
        let lease_cutoff = Utc::now() - lease_timeout;
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            UPDATE feeds
            SET last_sync_started_at = NOW(),
                last_sync_crawler_id = $2,
                updated_at = NOW()
            WHERE id = $1
              AND is_active = TRUE
              AND consecutive_failures < $3
              AND (last_sync_crawler_id IS NULL
                   OR last_sync_started_at < $4
                   OR last_sync_crawler_id = $2)
            RETURNING *
            "#,
        )
        .bind(feed_id)
        .bind(crawler_id)
        .bind(threshold)
        .bind(lease_cutoff)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Successful submission: reset health, release the lease.
    pub async fn record_sync_success(&self, feed_id: &str) -> Result<Feed> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            UPDATE feeds
            SET last_sync_at = NOW(),
                last_successful_sync_at = NOW(),
                last_sync_status = 'ok',
                consecutive_failures = 0,
                last_sync_error = NULL,
                last_sync_crawler_id = NULL,
                total_sync_successes = total_sync_successes + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Feed {}", feed_id)))?;
        Ok(feed)
    }

    /// Failed submission: bump the failure counter, release the lease, and
    /// auto-disable in the same statement once the threshold is reached.
    pub async fn record_sync_failure(
        &self,
        feed_id: &str,
        error_message: &str,
        threshold: i32,
    ) -> Result<Feed> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            UPDATE feeds
            SET last_sync_at = NOW(),
                last_sync_status = 'failed',
                consecutive_failures = consecutive_failures + 1,
                last_sync_error = $2,
                last_sync_crawler_id = NULL,
                total_sync_failures = total_sync_failures + 1,
                is_active = CASE
                    WHEN consecutive_failures + 1 >= $3 THEN FALSE
                    ELSE is_active
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(feed_id)
        .bind(error_message)
        .bind(threshold)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Feed {}", feed_id)))?;
        Ok(feed)
    }

    /// Operator reset: zero the failure counter and optionally reactivate.
    /// Safe to run concurrently with a sync in progress.
    pub async fn reset_failures(
        &self,
        feed_id: Option<&str>,
        reactivate: bool,
    ) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"UPDATE feeds
               SET consecutive_failures = 0,
                   last_sync_error = NULL,
                   updated_at = NOW()"#,
        );
        if reactivate {
            qb.push(", is_active = TRUE");
        }
        if let Some(feed_id) = feed_id {
            qb.push(" WHERE id = ").push_bind(feed_id.to_string());
        }
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn sync_stats(&self, threshold: i32, lease_timeout: Duration) -> Result<FeedSyncStats> {
        let lease_cutoff = Utc::now() - lease_timeout;
        let row: (i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE is_active),
                COUNT(*) FILTER (WHERE is_active
                                   AND consecutive_failures < $1
                                   AND (last_sync_crawler_id IS NULL OR last_sync_started_at < $2)),
                COUNT(*) FILTER (WHERE last_sync_crawler_id IS NOT NULL
                                   AND last_sync_started_at >= $2),
                COUNT(*) FILTER (WHERE is_active AND consecutive_failures >= 15),
                COUNT(*) FILTER (WHERE NOT is_active AND updated_at >= NOW() - INTERVAL '24 hours'),
                COUNT(*) FILTER (WHERE consecutive_failures >= 10)
            FROM feeds
            "#,
        )
        .bind(threshold)
        .bind(lease_cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedSyncStats {
            total_feeds: row.0,
            pending_feeds: row.1,
            syncing_feeds: row.2,
            feeds_near_disable: row.3,
            recently_disabled_feeds: row.4,
            high_failure_feeds: row.5,
            // Filled in from the sync log by the service layer.
            recent_success: 0,
            recent_failures: 0,
        })
    }

    /// Feeds with at least one crawled article published on `date` in scope
    /// for a daily digest.
    pub async fn feeds_with_articles_on(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT a.feed_id
            FROM articles a
            WHERE a.status = 'ok'
              AND (
                (a.published_date IS NOT NULL AND a.published_date BETWEEN $1 AND $2)
                OR (a.published_date IS NULL AND a.created_at BETWEEN $1 AND $2)
              )
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
