use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::pagination::{DateRange, RetryRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "article_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Pending,
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vectorization_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VectorizationStatus {
    Pending,
    InProgress,
    Ok,
    Failed,
}

/// A single RSS entry.
///
/// `link` is globally unique; insertion dedup relies on it. The crawl-lease
/// block (`is_locked`, `lock_timestamp`, `crawler_id`) is only ever mutated
/// through atomic compare-and-set updates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: String,
    pub link: String,
    pub title: String,
    pub summary: Option<String>,
    /// Extraction summary produced worker-side during the crawl; distinct
    /// from the bilingual summaries the summarization engine writes.
    pub generated_summary: Option<String>,
    pub chinese_summary: Option<String>,
    pub english_summary: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub status: ArticleStatus,

    // crawl lease block
    pub is_locked: bool,
    pub lock_timestamp: Option<DateTime<Utc>>,
    pub crawler_id: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub content_id: Option<i64>,

    // vector block
    pub is_vectorized: bool,
    pub vector_id: Option<String>,
    pub vectorized_at: Option<DateTime<Utc>>,
    pub embedding_model: Option<String>,
    pub vector_dimension: Option<i32>,
    pub vectorization_status: VectorizationStatus,
    pub vectorization_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    /// Preferred summary text: the worker-generated extraction summary when
    /// present, else the feed summary. Callers fall back to the title.
    pub fn best_summary(&self) -> Option<&str> {
        [self.generated_summary.as_deref(), self.summary.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }
}

/// Immutable post-extraction payload, one-to-one with `Article::content_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ArticleContent {
    pub id: i64,
    pub html_content: String,
    pub text_content: String,
    pub created_at: DateTime<Utc>,
}

/// One feed entry reported by a worker inside `submit_feed_result`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArticleEntry {
    pub link: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

/// Filters for the admin article listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ArticleFilters {
    pub feed_id: Option<String>,
    pub status: Option<ArticleStatus>,
    pub vectorization_status: Option<VectorizationStatus>,
    pub title: Option<String>,
    pub date_range: Option<DateRange>,
    pub retry_range: Option<RetryRange>,
}

/// Per-status counts used by the retrieval façade statistics.
#[derive(Debug, Clone, Serialize, Default)]
pub struct VectorizationCounts {
    pub pending: i64,
    pub in_progress: i64,
    pub ok: i64,
    pub failed: i64,
}
