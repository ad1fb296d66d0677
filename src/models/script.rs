use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// A versioned, opaque extraction script for one feed.
///
/// The coordinator stores and ships these verbatim; it never parses or
/// executes them. At most one row per feed is published at a time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedScript {
    pub id: i64,
    pub feed_id: String,
    pub version: i32,
    pub script: String,
    pub description: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateScriptRequest {
    #[validate(length(min = 1))]
    pub script: String,
    pub description: Option<String>,
    /// Publish immediately, demoting any previously published version.
    #[serde(default)]
    pub publish: bool,
}
