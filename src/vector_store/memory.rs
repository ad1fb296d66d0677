//! In-memory vector collections with cosine similarity search.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MetadataFilter, VectorRecord, VectorSearchHit, VectorStore};
use crate::error::{AppError, Result};

struct Collection {
    dimension: usize,
    metric: String,
    records: HashMap<String, VectorRecord>,
}

/// Process-local vector store keyed by collection name.
#[derive(Clone, Default)]
pub struct MemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(filter: Option<&MetadataFilter>, metadata: &serde_json::Value) -> bool {
        let Some(filter) = filter else {
            return true;
        };
        filter.iter().all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn index_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_index(&self, name: &str, dimension: usize, metric: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(AppError::conflict(format!(
                "Vector collection {} already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                metric: metric.to_string(),
                records: HashMap::new(),
            },
        );
        tracing::info!(collection = %name, dimension, metric, "Created vector collection");
        Ok(())
    }

    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| AppError::not_found(format!("Vector collection {}", name)))?;

        for record in records {
            if record.vector.len() != collection.dimension {
                return Err(AppError::InvalidFieldValue {
                    field: "vector".to_string(),
                    message: format!(
                        "dimension mismatch: expected {}, got {}",
                        collection.dimension,
                        record.vector.len()
                    ),
                });
            }
            collection.records.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchHit>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("Vector collection {}", name)))?;

        if query_vector.len() != collection.dimension {
            return Err(AppError::InvalidFieldValue {
                field: "query_vector".to_string(),
                message: format!(
                    "dimension mismatch: expected {}, got {}",
                    collection.dimension,
                    query_vector.len()
                ),
            });
        }

        let mut hits: Vec<VectorSearchHit> = collection
            .records
            .values()
            .filter(|record| Self::matches(filter, &record.metadata))
            .map(|record| VectorSearchHit {
                id: record.id.clone(),
                score: cosine_similarity(query_vector, &record.vector),
                metadata: record.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);

        tracing::debug!(
            collection = %name,
            count = hits.len(),
            top_k,
            "Searched vector collection"
        );
        Ok(hits)
    }

    async fn get(&self, name: &str, ids: &[String]) -> Result<Vec<VectorRecord>> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("Vector collection {}", name)))?;

        Ok(ids
            .iter()
            .filter_map(|id| collection.records.get(id).cloned())
            .collect())
    }

    async fn count(&self, name: &str, filter: Option<&MetadataFilter>) -> Result<usize> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("Vector collection {}", name)))?;

        Ok(collection
            .records
            .values()
            .filter(|record| Self::matches(filter, &record.metadata))
            .count())
    }
}

/// Calculate cosine similarity between two vectors
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, vector: Vec<f32>, article_id: i64) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata: json!({ "article_id": article_id }),
        }
    }

    #[tokio::test]
    async fn create_and_bootstrap_semantics() {
        let store = MemoryVectorStore::new();
        assert!(!store.index_exists("rss_articles").await.unwrap());
        store.create_index("rss_articles", 3, "cosine").await.unwrap();
        assert!(store.index_exists("rss_articles").await.unwrap());

        // Recreating is a conflict, not a silent overwrite.
        let err = store.create_index("rss_articles", 3, "cosine").await.unwrap_err();
        assert_eq!(err.error_code(), "RESOURCE_CONFLICT");
    }

    #[tokio::test]
    async fn upsert_rejects_dimension_mismatch() {
        let store = MemoryVectorStore::new();
        store.create_index("c", 3, "cosine").await.unwrap();
        let err = store
            .upsert("c", vec![record("a", vec![1.0, 0.0], 1)])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FIELD_VALUE");
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::new();
        store.create_index("c", 2, "cosine").await.unwrap();
        store
            .upsert(
                "c",
                vec![
                    record("near", vec![1.0, 0.1], 1),
                    record("far", vec![-1.0, 0.0], 2),
                    record("mid", vec![0.5, 0.5], 3),
                ],
            )
            .await
            .unwrap();

        let hits = store.search("c", &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "near");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].score > 0.0);
    }

    #[tokio::test]
    async fn search_honors_metadata_filter() {
        let store = MemoryVectorStore::new();
        store.create_index("c", 2, "cosine").await.unwrap();
        store
            .upsert(
                "c",
                vec![record("a", vec![1.0, 0.0], 1), record("b", vec![1.0, 0.0], 2)],
            )
            .await
            .unwrap();

        let mut filter = MetadataFilter::new();
        filter.insert("article_id".to_string(), json!(2));
        let hits = store.search("c", &[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
        assert_eq!(store.count("c", Some(&filter)).await.unwrap(), 1);
        assert_eq!(store.count("c", None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let store = MemoryVectorStore::new();
        store.create_index("c", 2, "cosine").await.unwrap();
        store.upsert("c", vec![record("a", vec![1.0, 0.0], 1)]).await.unwrap();
        store.upsert("c", vec![record("a", vec![0.0, 1.0], 1)]).await.unwrap();

        assert_eq!(store.count("c", None).await.unwrap(), 1);
        let records = store.get("c", &["a".to_string()]).await.unwrap();
        assert_eq!(records[0].vector, vec![0.0, 1.0]);
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }
}
