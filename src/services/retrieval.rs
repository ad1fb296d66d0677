//! Read-side assembly: relational article state joined with the vector
//! similarity index.

use std::sync::Arc;

use serde::Serialize;

use crate::config::VectorConfig;
use crate::error::{AppError, Result};
use crate::llm::LlmProviderFactory;
use crate::models::{Article, ArticleContent, ArticleFilters, Page, PageParams};
use crate::store::{ArticleStore, ContentStore};
use crate::vector_store::VectorStore;

const SIMILAR_ATTACH_LIMIT: usize = 5;

#[derive(Debug, Serialize)]
pub struct SimilarArticle {
    #[serde(flatten)]
    pub article: Article,
    pub similarity: f32,
}

#[derive(Debug, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub content: Option<ArticleContent>,
    pub similar_articles: Vec<SimilarArticle>,
}

pub struct ArticleQueryService {
    articles: ArticleStore,
    contents: ContentStore,
    vectors: Arc<dyn VectorStore>,
    providers: LlmProviderFactory,
    config: VectorConfig,
}

impl ArticleQueryService {
    pub fn new(
        articles: ArticleStore,
        contents: ContentStore,
        vectors: Arc<dyn VectorStore>,
        providers: LlmProviderFactory,
        config: VectorConfig,
    ) -> Self {
        Self {
            articles,
            contents,
            vectors,
            providers,
            config,
        }
    }

    pub async fn list_articles(
        &self,
        filters: &ArticleFilters,
        params: PageParams,
    ) -> Result<Page<Article>> {
        self.articles.list(filters, params).await
    }

    /// Relational read plus, for vectorized articles, up to five similar
    /// articles from the vector index (self excluded). Similarity lookups
    /// are best-effort: a missing vector degrades to an empty list.
    pub async fn article_detail(&self, article_id: i64) -> Result<ArticleDetail> {
        let article = self.articles.get(article_id).await?;

        let content = match article.content_id {
            Some(content_id) => Some(self.contents.get(content_id).await?),
            None => None,
        };

        let similar_articles = if article.is_vectorized {
            match self.similar_articles(&article, SIMILAR_ATTACH_LIMIT).await {
                Ok(similar) => similar,
                Err(e) => {
                    tracing::warn!(article_id, error = %e, "Similar-article lookup failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(ArticleDetail {
            article,
            content,
            similar_articles,
        })
    }

    pub async fn similar_articles(
        &self,
        article: &Article,
        limit: usize,
    ) -> Result<Vec<SimilarArticle>> {
        let Some(vector_id) = article.vector_id.as_deref() else {
            return Ok(Vec::new());
        };

        let records = self
            .vectors
            .get(&self.config.collection_name, &[vector_id.to_string()])
            .await?;
        let Some(record) = records.into_iter().next() else {
            tracing::warn!(
                article_id = article.id,
                vector_id,
                "Article is marked vectorized but its vector is missing"
            );
            return Ok(Vec::new());
        };

        // One extra result because the query vector matches itself.
        let hits = self
            .vectors
            .search(&self.config.collection_name, &record.vector, limit + 1, None)
            .await?;

        self.hydrate_hits(hits, Some(article.id), limit).await
    }

    /// Text-query search: embed with the default embedding model, search the
    /// default collection, hydrate each hit with its relational row.
    pub async fn search_articles(
        &self,
        query: &str,
        limit: usize,
        model: Option<&str>,
    ) -> Result<Vec<SimilarArticle>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::MissingField {
                field: "query".to_string(),
            });
        }

        if !self.vectors.index_exists(&self.config.collection_name).await? {
            return Ok(Vec::new());
        }

        let provider = self.providers.create_embedding_provider().await?;
        let embeddings = provider
            .embeddings(
                &[query.to_string()],
                Some(model.unwrap_or(&self.config.embedding_model)),
            )
            .await?;
        let query_vector = embeddings
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::ProviderFatal {
                provider: provider.provider_name().to_string(),
                message: "provider returned no embedding for query".to_string(),
            })?;

        let hits = self
            .vectors
            .search(&self.config.collection_name, &query_vector, limit, None)
            .await?;

        self.hydrate_hits(hits, None, limit).await
    }

    async fn hydrate_hits(
        &self,
        hits: Vec<crate::vector_store::VectorSearchHit>,
        exclude_article_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SimilarArticle>> {
        let mut scored: Vec<(i64, f32)> = Vec::new();
        for hit in hits {
            let Some(article_id) = hit.metadata.get("article_id").and_then(|v| v.as_i64()) else {
                continue;
            };
            if exclude_article_id == Some(article_id) {
                continue;
            }
            scored.push((article_id, hit.score));
        }
        scored.truncate(limit);

        let ids: Vec<i64> = scored.iter().map(|(id, _)| *id).collect();
        let articles = self.articles.get_many(&ids).await?;

        // Preserve similarity ordering through hydration.
        let mut result = Vec::with_capacity(scored.len());
        for (article_id, score) in scored {
            if let Some(article) = articles.iter().find(|a| a.id == article_id) {
                result.push(SimilarArticle {
                    article: article.clone(),
                    similarity: score,
                });
            }
        }
        Ok(result)
    }
}
