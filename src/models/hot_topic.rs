use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One per-platform hot topic row as ingested upstream.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RawHotTopic {
    pub id: i64,
    pub platform: String,
    pub topic_title: String,
    pub topic_description: Option<String>,
    pub topic_url: Option<String>,
    pub stable_hash: String,
    pub heat_value: Option<i64>,
    pub topic_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A clustered topic group for a date; roughly ten exist per date.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UnifiedHotTopic {
    pub id: i64,
    pub topic_date: NaiveDate,
    pub unified_title: String,
    pub unified_summary: Option<String>,
    pub keywords: serde_json::Value,
    pub category: String,
    pub related_topic_hashes: serde_json::Value,
    pub source_platforms: serde_json::Value,
    pub topic_count: i32,
    pub representative_url: Option<String>,
    pub ai_model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert shape produced by the aggregation pass.
#[derive(Debug, Clone)]
pub struct NewUnifiedHotTopic {
    pub topic_date: NaiveDate,
    pub unified_title: String,
    pub unified_summary: Option<String>,
    pub keywords: Vec<String>,
    pub category: String,
    pub related_topic_hashes: Vec<String>,
    pub source_platforms: Vec<String>,
    pub topic_count: i32,
    pub representative_url: Option<String>,
    pub ai_model_used: Option<String>,
}
