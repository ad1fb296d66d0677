use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Bookkeeping for a vector-store write attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VectorizationTask {
    pub batch_id: Uuid,
    pub article_id: i64,
    pub worker_id: Option<String>,
    pub total_count: i32,
    pub processed_count: i32,
    pub success_count: i32,
    pub failed_count: i32,
    pub embedding_model: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Combined relational + collection statistics for the vector pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct VectorizationStats {
    pub pending: i64,
    pub in_progress: i64,
    pub ok: i64,
    pub failed: i64,
    pub collection_exists: bool,
    pub collection_count: Option<usize>,
    pub embedding_model: String,
    pub vector_dimension: usize,
}
