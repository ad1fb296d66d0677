use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Outcome of the most recent sync attempt for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sync_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    None,
    Ok,
    Failed,
}

/// An RSS subscription source.
///
/// The sync-health block doubles as the lease record: `last_sync_crawler_id`
/// plus `last_sync_started_at` identify the current holder, and a holder
/// whose lease is older than the configured timeout is considered expired.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feed {
    pub id: String,
    pub url: String,
    pub category_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    pub is_active: bool,

    // sync health block
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_successful_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub consecutive_failures: i32,
    pub last_sync_error: Option<String>,
    pub last_sync_crawler_id: Option<String>,
    pub last_sync_started_at: Option<DateTime<Utc>>,
    pub total_sync_successes: i64,
    pub total_sync_failures: i64,

    // crawl hints shipped to workers
    pub crawl_with_js: bool,
    pub crawl_delay_s: Option<i32>,
    pub custom_headers: Option<serde_json::Value>,
    pub use_proxy: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeedRequest {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(url)]
    pub url: String,
    pub category_id: Option<String>,
    #[validate(length(min = 1, max = 512))]
    pub title: String,
    pub description: Option<String>,
    pub logo: Option<String>,
    #[serde(default)]
    pub crawl_with_js: bool,
    pub crawl_delay_s: Option<i32>,
    pub custom_headers: Option<serde_json::Value>,
    #[serde(default)]
    pub use_proxy: bool,
}

/// Optional filters for the admin feed listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FeedFilters {
    pub title: Option<String>,
    pub url: Option<String>,
    pub category_id: Option<String>,
    pub is_active: Option<bool>,
}

/// One appended row per worker submission on the feed-sync surface.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedSyncLog {
    pub sync_id: Uuid,
    pub feed_id: Option<String>,
    pub crawler_id: Option<String>,
    pub status: String,
    pub total_feeds: i32,
    pub synced_feeds: i32,
    pub failed_feeds: i32,
    pub total_articles: i32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_time: Option<f64>,
    pub fetch_time: Option<f64>,
    pub parse_time: Option<f64>,
    pub feed_url: Option<String>,
    pub response_status: Option<i32>,
    pub entries_found: Option<i32>,
    pub new_articles: Option<i32>,
    pub error_message: Option<String>,
    pub triggered_by: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters for the feed-sync surface.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSyncStats {
    pub total_feeds: i64,
    pub pending_feeds: i64,
    pub syncing_feeds: i64,
    pub recent_success: i64,
    pub recent_failures: i64,
    pub feeds_near_disable: i64,
    pub recently_disabled_feeds: i64,
    pub high_failure_feeds: i64,
}
