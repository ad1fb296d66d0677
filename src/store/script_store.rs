//! Versioned extraction scripts; one published row per feed.

use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::FeedScript;

#[derive(Clone)]
pub struct ScriptStore {
    pool: PgPool,
}

impl ScriptStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new version; the version number is allocated per feed.
    pub async fn create(
        &self,
        feed_id: &str,
        script: &str,
        description: Option<&str>,
    ) -> Result<FeedScript> {
        let row = sqlx::query_as::<_, FeedScript>(
            r#"
            INSERT INTO feed_scripts (feed_id, version, script, description)
            VALUES (
                $1,
                COALESCE((SELECT MAX(version) FROM feed_scripts WHERE feed_id = $1), 0) + 1,
                $2,
                $3
            )
            RETURNING *
            "#,
        )
        .bind(feed_id)
        .bind(script)
        .bind(description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Publish one version, demoting any previously published row in the
    /// same transaction. The partial unique index enforces the invariant.
    pub async fn publish(&self, script_id: i64) -> Result<FeedScript> {
        let mut tx = self.pool.begin().await?;

        let feed_id: Option<(String,)> =
            sqlx::query_as("SELECT feed_id FROM feed_scripts WHERE id = $1")
                .bind(script_id)
                .fetch_optional(&mut *tx)
                .await?;
        let (feed_id,) =
            feed_id.ok_or_else(|| AppError::not_found(format!("FeedScript {}", script_id)))?;

        sqlx::query("UPDATE feed_scripts SET is_published = FALSE WHERE feed_id = $1")
            .bind(&feed_id)
            .execute(&mut *tx)
            .await?;

        let script = sqlx::query_as::<_, FeedScript>(
            "UPDATE feed_scripts SET is_published = TRUE WHERE id = $1 RETURNING *",
        )
        .bind(script_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(script)
    }

    /// The one script workers receive for a feed, if any version is live.
    pub async fn get_published(&self, feed_id: &str) -> Result<Option<FeedScript>> {
        let script = sqlx::query_as::<_, FeedScript>(
            "SELECT * FROM feed_scripts WHERE feed_id = $1 AND is_published = TRUE",
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(script)
    }

    pub async fn list_for_feed(&self, feed_id: &str) -> Result<Vec<FeedScript>> {
        let scripts = sqlx::query_as::<_, FeedScript>(
            "SELECT * FROM feed_scripts WHERE feed_id = $1 ORDER BY version DESC",
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(scripts)
    }
}
