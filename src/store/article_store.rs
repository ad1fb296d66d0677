//! Article persistence: ingestion dedup, crawl/vector leases, summaries.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::error::{AppError, Result};
use crate::models::{
    Article, ArticleEntry, ArticleFilters, ArticleStatus, Page, PageParams, VectorizationCounts,
};

#[derive(Clone)]
pub struct ArticleStore {
    pool: PgPool,
}

impl ArticleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, article_id: i64) -> Result<Article> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = $1")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Article {}", article_id)))?;
        Ok(article)
    }

    pub async fn get_many(&self, ids: &[i64]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let articles = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    /// Batch-insert entries from a feed sync. Entries whose `link` already
    /// exists are silently dropped; the unique index backstops races between
    /// concurrent ingestion calls. Returns the number actually inserted.
    pub async fn insert_entries(
        &self,
        feed_id: &str,
        max_retries: i32,
        entries: &[ArticleEntry],
    ) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT INTO articles
                    (feed_id, link, title, summary, thumbnail_url, published_date, max_retries)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (link) DO NOTHING
                "#,
            )
            .bind(feed_id)
            .bind(&entry.link)
            .bind(&entry.title)
            .bind(&entry.summary)
            .bind(&entry.thumbnail_url)
            .bind(entry.published_date.unwrap_or_else(Utc::now))
            .bind(max_retries)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn list(&self, filters: &ArticleFilters, params: PageParams) -> Result<Page<Article>> {
        let params = params.normalized();

        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM articles WHERE 1=1");
        let mut list_qb = QueryBuilder::<Postgres>::new("SELECT * FROM articles WHERE 1=1");
        for qb in [&mut count_qb, &mut list_qb] {
            if let Some(feed_id) = &filters.feed_id {
                qb.push(" AND feed_id = ").push_bind(feed_id.clone());
            }
            if let Some(status) = filters.status {
                qb.push(" AND status = ").push_bind(status);
            }
            if let Some(vs) = filters.vectorization_status {
                qb.push(" AND vectorization_status = ").push_bind(vs);
            }
            if let Some(title) = &filters.title {
                qb.push(" AND title ILIKE ").push_bind(format!("%{}%", title));
            }
            if let Some(range) = &filters.date_range {
                if let Some(start) = range.start {
                    qb.push(" AND published_date >= ").push_bind(start);
                }
                if let Some(end) = range.end {
                    qb.push(" AND published_date <= ").push_bind(end);
                }
            }
            if let Some(range) = &filters.retry_range {
                if let Some(min) = range.min {
                    qb.push(" AND retry_count >= ").push_bind(min);
                }
                if let Some(max) = range.max {
                    qb.push(" AND retry_count <= ").push_bind(max);
                }
            }
        }

        let total: i64 = count_qb.build_query_scalar().fetch_one(&self.pool).await?;

        list_qb.push(" ORDER BY id DESC LIMIT ");
        list_qb.push_bind(params.per_page);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(params.offset());

        let articles = list_qb
            .build_query_as::<Article>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(articles, total, params))
    }

    /// Crawl queue: unlocked pending articles with retries left, fewest
    /// retries first, then newest publications.
    pub async fn pending_for_crawl(&self, limit: i64) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE status = 'pending'
              AND is_locked = FALSE
              AND retry_count < max_retries
            ORDER BY retry_count ASC, published_date DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Compare-and-set crawl lease. Returns `None` when the article is
    /// already locked (the caller distinguishes that from not-found).
    pub async fn lock(&self, article_id: i64, crawler_id: &str) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET is_locked = TRUE,
                lock_timestamp = NOW(),
                crawler_id = $2,
                updated_at = NOW()
            WHERE id = $1 AND is_locked = FALSE
            RETURNING *
            "#,
        )
        .bind(article_id)
        .bind(crawler_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    pub async fn record_crawl_success(
        &self,
        article_id: i64,
        content_id: i64,
        generated_summary: Option<&str>,
    ) -> Result<Article> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET status = 'ok',
                content_id = $2,
                generated_summary = COALESCE($3, generated_summary),
                is_locked = FALSE,
                lock_timestamp = NULL,
                crawler_id = NULL,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(article_id)
        .bind(content_id)
        .bind(generated_summary)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Article {}", article_id)))?;
        Ok(article)
    }

    pub async fn record_crawl_failure(&self, article_id: i64, error_message: &str) -> Result<Article> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET status = 'failed',
                retry_count = retry_count + 1,
                is_locked = FALSE,
                lock_timestamp = NULL,
                crawler_id = NULL,
                error_message = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(article_id)
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Article {}", article_id)))?;
        Ok(article)
    }

    /// Administrative reset back to the crawl queue.
    pub async fn reset(&self, article_id: i64) -> Result<Article> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET status = 'pending',
                retry_count = 0,
                is_locked = FALSE,
                lock_timestamp = NULL,
                crawler_id = NULL,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Article {}", article_id)))?;
        Ok(article)
    }

    /// Vectorization queue: crawled articles not yet embedded.
    pub async fn candidates_for_vectorization(&self, limit: i64) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE vectorization_status = 'pending'
              AND content_id IS NOT NULL
            ORDER BY published_date DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    /// Compare-and-set the vector lease (`pending -> in_progress`).
    pub async fn claim_vectorization(&self, article_id: i64) -> Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET vectorization_status = 'in_progress',
                vectorization_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND vectorization_status = 'pending'
            RETURNING *
            "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(article)
    }

    pub async fn mark_in_progress(&self, article_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE articles
            SET vectorization_status = 'in_progress', vectorization_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_vectorized(
        &self,
        article_id: i64,
        vector_id: &str,
        embedding_model: &str,
        vector_dimension: i32,
    ) -> Result<Article> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET is_vectorized = TRUE,
                vector_id = $2,
                vectorized_at = NOW(),
                embedding_model = $3,
                vector_dimension = $4,
                vectorization_status = 'ok',
                vectorization_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(article_id)
        .bind(vector_id)
        .bind(embedding_model)
        .bind(vector_dimension)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Article {}", article_id)))?;
        Ok(article)
    }

    /// Failure releases the vector lease; the message is capped at 1000
    /// chars before it reaches the column.
    pub async fn mark_vectorization_failed(
        &self,
        article_id: i64,
        error_message: &str,
    ) -> Result<()> {
        let truncated: String = error_message.chars().take(1000).collect();
        sqlx::query(
            r#"
            UPDATE articles
            SET vectorization_status = 'failed',
                vectorization_error = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .bind(truncated)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reset_vectorization(&self, article_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE articles
            SET vectorization_status = 'pending',
                is_vectorized = FALSE,
                vectorization_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Write back generated summaries; optionally clear an invalid upstream
    /// summary in the same statement.
    pub async fn update_summaries(
        &self,
        article_id: i64,
        chinese_summary: Option<&str>,
        english_summary: Option<&str>,
        clear_original: bool,
    ) -> Result<Article> {
        let article = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
            SET chinese_summary = COALESCE($2, chinese_summary),
                english_summary = COALESCE($3, english_summary),
                summary = CASE WHEN $4 THEN NULL ELSE summary END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(article_id)
        .bind(chinese_summary)
        .bind(english_summary)
        .bind(clear_original)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Article {}", article_id)))?;
        Ok(article)
    }

    /// Step recorder: worker reports content saved out of band.
    pub async fn record_content_saved(
        &self,
        article_id: i64,
        content_id: i64,
        generated_summary: Option<&str>,
    ) -> Result<Article> {
        self.record_crawl_success(article_id, content_id, generated_summary)
            .await
    }

    /// Step recorder: generic failure clears the crawl lease.
    pub async fn record_step_failure(
        &self,
        article_id: i64,
        status: ArticleStatus,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE articles
            SET status = $2,
                is_locked = FALSE,
                lock_timestamp = NULL,
                crawler_id = NULL,
                error_message = $3,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .bind(status)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn vectorization_counts(&self) -> Result<VectorizationCounts> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE vectorization_status = 'pending'),
                COUNT(*) FILTER (WHERE vectorization_status = 'in_progress'),
                COUNT(*) FILTER (WHERE vectorization_status = 'ok'),
                COUNT(*) FILTER (WHERE vectorization_status = 'failed')
            FROM articles
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(VectorizationCounts {
            pending: row.0,
            in_progress: row.1,
            ok: row.2,
            failed: row.3,
        })
    }

    pub async fn crawl_counts(&self) -> Result<(i64, i64, i64, i64, i64)> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending' AND is_locked = FALSE
                                   AND retry_count < max_retries),
                COUNT(*) FILTER (WHERE is_locked),
                COUNT(*) FILTER (WHERE status = 'ok'),
                COUNT(*) FILTER (WHERE status = 'failed'),
                COUNT(*) FILTER (WHERE status = 'failed' AND retry_count >= max_retries)
            FROM articles
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Crawled articles for one feed inside a day window, newest first.
    /// `created_at` stands in when `published_date` is absent.
    pub async fn for_feed_between(
        &self,
        feed_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            WHERE feed_id = $1
              AND status = 'ok'
              AND (
                (published_date IS NOT NULL AND published_date BETWEEN $2 AND $3)
                OR (published_date IS NULL AND created_at BETWEEN $2 AND $3)
              )
            ORDER BY published_date DESC NULLS LAST
            "#,
        )
        .bind(feed_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }
}
