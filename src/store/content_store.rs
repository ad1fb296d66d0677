//! Immutable article-content rows.

use sqlx::PgPool;

use crate::error::{AppError, Result};
use crate::models::ArticleContent;

#[derive(Clone)]
pub struct ContentStore {
    pool: PgPool,
}

impl ContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Rows are never updated; a crawl reset simply allocates a new one.
    pub async fn insert(&self, html_content: &str, text_content: &str) -> Result<ArticleContent> {
        let content = sqlx::query_as::<_, ArticleContent>(
            r#"
            INSERT INTO article_contents (html_content, text_content)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(html_content)
        .bind(text_content)
        .fetch_one(&self.pool)
        .await?;
        Ok(content)
    }

    pub async fn get(&self, content_id: i64) -> Result<ArticleContent> {
        let content =
            sqlx::query_as::<_, ArticleContent>("SELECT * FROM article_contents WHERE id = $1")
                .bind(content_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::not_found(format!("ArticleContent {}", content_id)))?;
        Ok(content)
    }
}
