//! Raw and unified hot-topic rows.

use chrono::NaiveDate;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{NewUnifiedHotTopic, RawHotTopic, UnifiedHotTopic};

#[derive(Clone)]
pub struct HotTopicStore {
    pool: PgPool,
}

impl HotTopicStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn raw_topics_for_date(&self, date: NaiveDate) -> Result<Vec<RawHotTopic>> {
        let topics = sqlx::query_as::<_, RawHotTopic>(
            r#"
            SELECT * FROM raw_hot_topics
            WHERE topic_date = $1 AND status = 'active'
            ORDER BY heat_value DESC NULLS LAST
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    pub async fn unified_topics_for_date(&self, date: NaiveDate) -> Result<Vec<UnifiedHotTopic>> {
        let topics = sqlx::query_as::<_, UnifiedHotTopic>(
            r#"
            SELECT * FROM unified_hot_topics
            WHERE topic_date = $1
            ORDER BY topic_count DESC
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(topics)
    }

    /// Replace the date's unified groups: delete then bulk-insert in one
    /// transaction so readers never observe a half-written date.
    pub async fn replace_for_date(
        &self,
        date: NaiveDate,
        topics: &[NewUnifiedHotTopic],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM unified_hot_topics WHERE topic_date = $1")
            .bind(date)
            .execute(&mut *tx)
            .await?;

        for topic in topics {
            sqlx::query(
                r#"
                INSERT INTO unified_hot_topics
                    (topic_date, unified_title, unified_summary, keywords, category,
                     related_topic_hashes, source_platforms, topic_count,
                     representative_url, ai_model_used)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(topic.topic_date)
            .bind(&topic.unified_title)
            .bind(&topic.unified_summary)
            .bind(serde_json::json!(topic.keywords))
            .bind(&topic.category)
            .bind(serde_json::json!(topic.related_topic_hashes))
            .bind(serde_json::json!(topic.source_platforms))
            .bind(topic.topic_count)
            .bind(&topic.representative_url)
            .bind(&topic.ai_model_used)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(topics.len())
    }
}
