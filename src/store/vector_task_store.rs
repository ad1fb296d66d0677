//! Vectorization attempt bookkeeping.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::VectorizationTask;

#[derive(Clone)]
pub struct VectorTaskStore {
    pool: PgPool,
}

impl VectorTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn start(
        &self,
        article_id: i64,
        worker_id: Option<&str>,
        embedding_model: &str,
    ) -> Result<VectorizationTask> {
        let task = sqlx::query_as::<_, VectorizationTask>(
            r#"
            INSERT INTO vectorization_tasks
                (batch_id, article_id, worker_id, total_count, embedding_model,
                 status, started_at)
            VALUES ($1, $2, $3, 1, $4, 'in_progress', NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(article_id)
        .bind(worker_id)
        .bind(embedding_model)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    pub async fn finish(
        &self,
        batch_id: Uuid,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE vectorization_tasks
            SET processed_count = 1,
                success_count = CASE WHEN $2 THEN 1 ELSE 0 END,
                failed_count = CASE WHEN $2 THEN 0 ELSE 1 END,
                status = CASE WHEN $2 THEN 'ok' ELSE 'failed' END,
                error_message = $3,
                ended_at = NOW()
            WHERE batch_id = $1
            "#,
        )
        .bind(batch_id)
        .bind(success)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
