//! Daily per-feed digest rows, unique on (feed, date, language).

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{DailySummary, SummaryLanguage};

/// Insert shape produced by the digest engine.
#[derive(Debug, Clone)]
pub struct NewDailySummary {
    pub feed_id: String,
    pub summary_date: NaiveDate,
    pub language: SummaryLanguage,
    pub summary_title: String,
    pub summary_content: String,
    pub article_count: i32,
    pub article_ids: Vec<i64>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub generation_cost_tokens: i64,
}

#[derive(Clone)]
pub struct DigestStore {
    pool: PgPool,
}

impl DigestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a digest; a re-run for an existing key is a no-op that returns
    /// the existing row.
    pub async fn create(&self, summary: &NewDailySummary) -> Result<DailySummary> {
        let inserted = sqlx::query_as::<_, DailySummary>(
            r#"
            INSERT INTO daily_summaries
                (feed_id, summary_date, language, summary_title, summary_content,
                 article_count, article_ids, llm_provider, llm_model,
                 generation_cost_tokens, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'ok')
            ON CONFLICT (feed_id, summary_date, language) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&summary.feed_id)
        .bind(summary.summary_date)
        .bind(summary.language)
        .bind(&summary.summary_title)
        .bind(&summary.summary_content)
        .bind(summary.article_count)
        .bind(serde_json::json!(summary.article_ids))
        .bind(&summary.llm_provider)
        .bind(&summary.llm_model)
        .bind(summary.generation_cost_tokens)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(row),
            None => self
                .get(&summary.feed_id, summary.summary_date, summary.language)
                .await?
                .ok_or_else(|| {
                    crate::error::AppError::internal(format!(
                        "daily summary for {} {} vanished during upsert",
                        summary.feed_id, summary.summary_date
                    ))
                }),
        }
    }

    pub async fn get(
        &self,
        feed_id: &str,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<Option<DailySummary>> {
        let summary = sqlx::query_as::<_, DailySummary>(
            r#"
            SELECT * FROM daily_summaries
            WHERE feed_id = $1 AND summary_date = $2 AND language = $3
            "#,
        )
        .bind(feed_id)
        .bind(date)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;
        Ok(summary)
    }

    pub async fn list_by_date(
        &self,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<Vec<DailySummary>> {
        let summaries = sqlx::query_as::<_, DailySummary>(
            r#"
            SELECT * FROM daily_summaries
            WHERE summary_date = $1 AND language = $2
            ORDER BY article_count DESC
            "#,
        )
        .bind(date)
        .bind(language)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    /// Feed ids that already have a digest for the key.
    pub async fn feeds_with_summary(
        &self,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT feed_id FROM daily_summaries WHERE summary_date = $1 AND language = $2",
        )
        .bind(date)
        .bind(language)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
