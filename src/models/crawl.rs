use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::pagination::DateRange;

/// One completed crawl attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CrawlBatch {
    pub batch_id: Uuid,
    pub article_id: i64,
    pub feed_id: String,
    pub crawler_id: String,
    pub article_url: Option<String>,
    pub final_status: String,
    pub error_stage: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub original_html_length: Option<i64>,
    pub processed_html_length: Option<i64>,
    pub processed_text_length: Option<i64>,
    pub content_hash: Option<String>,
    pub image_count: Option<i32>,
    pub link_count: Option<i32>,
    pub video_count: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_processing_time: Option<f64>,
    pub max_memory_usage: Option<f64>,
    pub avg_cpu_usage: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Sub-stage timing row inside a batch. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CrawlLog {
    pub id: i64,
    pub batch_id: Uuid,
    pub article_id: i64,
    pub feed_id: String,
    pub crawler_id: String,
    pub status: String,
    pub stage: Option<String>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: Option<i32>,
    pub http_status_code: Option<i32>,
    pub request_duration: Option<f64>,
    pub parsing_time: Option<f64>,
    pub total_processing_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CrawlLogFilters {
    pub feed_id: Option<String>,
    pub article_id: Option<i64>,
    pub crawler_id: Option<String>,
    pub status: Option<String>,
    pub date_range: Option<DateRange>,
}

/// Aggregate counters for the crawl surface.
#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    pub pending_articles: i64,
    pub locked_articles: i64,
    pub completed_articles: i64,
    pub failed_articles: i64,
    pub terminal_failures: i64,
    pub batches_last_24h: i64,
}
