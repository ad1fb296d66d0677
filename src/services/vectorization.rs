//! Vectorization dispatch: embed finished articles into the vector store.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::VectorConfig;
use crate::error::{AppError, Result};
use crate::llm::LlmProviderFactory;
use crate::models::{Article, VectorizationStats, VectorizationTask};
use crate::store::{ArticleStore, VectorTaskStore};
use crate::vector_store::{VectorRecord, VectorStore};

#[derive(Debug, Serialize)]
pub struct VectorizationOutcome {
    pub article_id: i64,
    pub vector_id: String,
    pub embedding_model: String,
    pub vector_dimension: usize,
}

pub struct VectorizationService {
    articles: ArticleStore,
    tasks: VectorTaskStore,
    vectors: Arc<dyn VectorStore>,
    providers: LlmProviderFactory,
    config: VectorConfig,
}

impl VectorizationService {
    pub fn new(
        articles: ArticleStore,
        tasks: VectorTaskStore,
        vectors: Arc<dyn VectorStore>,
        providers: LlmProviderFactory,
        config: VectorConfig,
    ) -> Self {
        Self {
            articles,
            tasks,
            vectors,
            providers,
            config,
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    /// Bootstrap-on-missing: the default collection is created with the
    /// embedding model's dimension on first use.
    pub async fn ensure_collection(&self) -> Result<()> {
        if !self.vectors.index_exists(&self.config.collection_name).await? {
            self.vectors
                .create_index(
                    &self.config.collection_name,
                    self.config.vector_dimension,
                    "cosine",
                )
                .await?;
        }
        Ok(())
    }

    pub async fn pending_articles(&self, limit: i64) -> Result<Vec<Article>> {
        self.articles.candidates_for_vectorization(limit).await
    }

    /// CAS over the vector lease (`pending -> in_progress`).
    pub async fn claim_article(&self, article_id: i64) -> Result<Article> {
        match self.articles.claim_vectorization(article_id).await? {
            Some(article) => Ok(article),
            None => {
                let article = self.articles.get(article_id).await?;
                Err(AppError::conflict(format!(
                    "Article {} is not pending vectorization (status: {:?})",
                    article_id, article.vectorization_status
                )))
            }
        }
    }

    /// Worker-surface claim: acquire the lease and open a bookkeeping task
    /// whose id the worker echoes back on completion.
    pub async fn claim_article_with_task(
        &self,
        article_id: i64,
        worker_id: Option<&str>,
        model: Option<&str>,
    ) -> Result<(Article, VectorizationTask)> {
        let article = self.claim_article(article_id).await?;
        let task = self
            .tasks
            .start(
                article_id,
                worker_id,
                model.unwrap_or(&self.config.embedding_model),
            )
            .await?;
        Ok((article, task))
    }

    /// Text handed to the embedding model: title plus the richest summary.
    pub fn vector_text(article: &Article) -> String {
        let summary = article.best_summary().unwrap_or("");
        format!("{}\n{}", article.title, summary).trim().to_string()
    }

    fn vector_id_for(article: &Article) -> String {
        format!("article_{}_{}", article.feed_id, article.id)
    }

    /// Full vectorization pass for one article. Any failure marks the
    /// article failed (error capped at 1000 chars), releases the lease and
    /// closes the bookkeeping row.
    pub async fn process_article_vectorization(
        &self,
        article_id: i64,
        worker_id: Option<&str>,
        task_id: Option<Uuid>,
        provider_name: Option<&str>,
        model: Option<&str>,
    ) -> Result<VectorizationOutcome> {
        let model_name = model.unwrap_or(&self.config.embedding_model).to_string();
        let batch_id = match task_id {
            Some(batch_id) => batch_id,
            None => {
                self.tasks
                    .start(article_id, worker_id, &model_name)
                    .await?
                    .batch_id
            }
        };

        let result = self
            .vectorize(article_id, provider_name, &model_name)
            .await;

        match result {
            Ok(outcome) => {
                self.tasks.finish(batch_id, true, None).await?;
                Ok(outcome)
            }
            Err(err) => {
                self.articles
                    .mark_vectorization_failed(article_id, &err.to_string())
                    .await?;
                self.tasks
                    .finish(batch_id, false, Some(&err.to_string()))
                    .await?;
                tracing::error!(article_id, error = %err, "Article vectorization failed");
                Err(err)
            }
        }
    }

    async fn vectorize(
        &self,
        article_id: i64,
        provider_name: Option<&str>,
        model_name: &str,
    ) -> Result<VectorizationOutcome> {
        self.ensure_collection().await?;
        self.articles.mark_in_progress(article_id).await?;

        let article = self.articles.get(article_id).await?;

        let text = Self::vector_text(&article);
        if text.is_empty() {
            return Err(AppError::conflict(format!(
                "Article {} has neither title nor summary to embed",
                article_id
            )));
        }

        let provider = match provider_name {
            Some(name) => self.providers.create_provider(Some(name), None).await?,
            None => self.providers.create_embedding_provider().await?,
        };

        let embeddings = provider
            .embeddings(&[text.clone()], Some(model_name))
            .await?;
        let vector = embeddings
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ProviderFatal {
                provider: provider.provider_name().to_string(),
                message: "provider returned no embedding".to_string(),
            })?;
        let dimension = vector.len();

        let vector_id = Self::vector_id_for(&article);
        let metadata = json!({
            "article_id": article.id,
            "feed_id": article.feed_id,
            "title": article.title,
            "summary": article.best_summary().unwrap_or(""),
            "published_date": article.published_date,
            "vectorized_at": Utc::now(),
        });

        self.vectors
            .upsert(
                &self.config.collection_name,
                vec![VectorRecord {
                    id: vector_id.clone(),
                    vector,
                    metadata,
                }],
            )
            .await?;

        self.articles
            .mark_vectorized(article_id, &vector_id, model_name, dimension as i32)
            .await?;

        tracing::info!(
            article_id,
            vector_id = %vector_id,
            model = %model_name,
            dimension,
            "Article vectorized"
        );

        Ok(VectorizationOutcome {
            article_id,
            vector_id,
            embedding_model: model_name.to_string(),
            vector_dimension: dimension,
        })
    }

    pub async fn reset_article(&self, article_id: i64) -> Result<()> {
        self.articles.reset_vectorization(article_id).await
    }

    pub async fn stats(&self) -> Result<VectorizationStats> {
        let counts = self.articles.vectorization_counts().await?;
        let exists = self.vectors.index_exists(&self.config.collection_name).await?;
        let collection_count = if exists {
            Some(self.vectors.count(&self.config.collection_name, None).await?)
        } else {
            None
        };

        Ok(VectorizationStats {
            pending: counts.pending,
            in_progress: counts.in_progress,
            ok: counts.ok,
            failed: counts.failed,
            collection_exists: exists,
            collection_count,
            embedding_model: self.config.embedding_model.clone(),
            vector_dimension: self.config.vector_dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleStatus, VectorizationStatus};

    fn article(title: &str, summary: Option<&str>, generated: Option<&str>) -> Article {
        Article {
            id: 7,
            feed_id: "f1".to_string(),
            link: "https://example.com/a".to_string(),
            title: title.to_string(),
            summary: summary.map(str::to_string),
            generated_summary: generated.map(str::to_string),
            chinese_summary: None,
            english_summary: None,
            thumbnail_url: None,
            published_date: None,
            status: ArticleStatus::Ok,
            is_locked: false,
            lock_timestamp: None,
            crawler_id: None,
            retry_count: 0,
            max_retries: 3,
            error_message: None,
            content_id: Some(1),
            is_vectorized: false,
            vector_id: None,
            vectorized_at: None,
            embedding_model: None,
            vector_dimension: None,
            vectorization_status: VectorizationStatus::Pending,
            vectorization_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn vector_text_prefers_generated_summary() {
        let a = article("Title", Some("feed summary"), Some("worker extraction summary"));
        assert_eq!(
            VectorizationService::vector_text(&a),
            "Title\nworker extraction summary"
        );
    }

    #[test]
    fn vector_text_falls_back_to_feed_summary_then_title() {
        let a = article("Title", Some("feed summary"), None);
        assert_eq!(VectorizationService::vector_text(&a), "Title\nfeed summary");

        let a = article("Title", None, None);
        assert_eq!(VectorizationService::vector_text(&a), "Title");
    }

    #[test]
    fn vector_id_keys_by_feed_and_article() {
        let a = article("Title", None, None);
        assert_eq!(VectorizationService::vector_id_for(&a), "article_f1_7");
    }
}
