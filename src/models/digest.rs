use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "summary_language", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SummaryLanguage {
    Zh,
    En,
}

impl SummaryLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }
}

/// Per-feed, per-date, per-language digest. Unique on that triple.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailySummary {
    pub id: i64,
    pub feed_id: String,
    pub summary_date: NaiveDate,
    pub language: SummaryLanguage,
    pub summary_title: String,
    pub summary_content: String,
    pub article_count: i32,
    pub article_ids: serde_json::Value,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub generation_cost_tokens: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
