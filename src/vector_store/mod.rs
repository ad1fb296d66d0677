//! Vector store abstraction.
//!
//! Named collections hold `{id, vector, metadata}` records. The coordinator
//! only depends on this capability interface; the shipped implementation is
//! the in-memory cosine store in [`memory`].

pub mod memory;

pub use memory::MemoryVectorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// One similarity hit, highest score first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Equality filter over metadata fields.
pub type MetadataFilter = serde_json::Map<String, serde_json::Value>;

/// Capability interface over a vector engine.
///
/// Failures bubble up as typed errors; retry policy belongs to the caller.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn index_exists(&self, name: &str) -> Result<bool>;

    /// Create a collection. `metric` defaults to cosine; creating an
    /// existing collection is a conflict.
    async fn create_index(&self, name: &str, dimension: usize, metric: &str) -> Result<()>;

    /// Insert or overwrite records by id.
    async fn upsert(&self, name: &str, records: Vec<VectorRecord>) -> Result<()>;

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<VectorSearchHit>>;

    async fn get(&self, name: &str, ids: &[String]) -> Result<Vec<VectorRecord>>;

    async fn count(&self, name: &str, filter: Option<&MetadataFilter>) -> Result<usize>;
}
