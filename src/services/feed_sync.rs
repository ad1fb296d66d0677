//! Feed-sync dispatch: queue selection, leases, result ingestion, health.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::config::SchedulerConfig;
use crate::error::{AppError, Result};
use crate::models::{ArticleEntry, Feed, FeedSyncStats, SyncStatus};
use crate::store::sync_log_store::NewFeedSyncLog;
use crate::store::{ArticleStore, FeedStore, SyncLogStore};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitFeedResultRequest {
    #[validate(length(min = 1))]
    pub feed_id: String,
    pub status: SyncStatus,
    #[serde(default)]
    pub articles: Vec<ArticleEntry>,
    pub error_message: Option<String>,
    pub error_type: Option<String>,
    pub fetch_time: Option<f64>,
    pub parse_time: Option<f64>,
    pub total_time: Option<f64>,
    pub feed_url: Option<String>,
    pub response_status: Option<i32>,
    pub entries_found: Option<i32>,
    pub new_articles: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SubmitFeedResultResponse {
    pub sync_id: Uuid,
    pub feed_id: String,
    pub status: SyncStatus,
    pub new_articles: usize,
    pub consecutive_failures: i32,
    pub auto_disabled: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PendingFeedsResponse {
    pub feeds: Vec<Feed>,
    pub disabled_feeds_count: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct FeedSyncService {
    feeds: FeedStore,
    articles: ArticleStore,
    sync_logs: SyncLogStore,
    config: SchedulerConfig,
}

impl FeedSyncService {
    pub fn new(
        feeds: FeedStore,
        articles: ArticleStore,
        sync_logs: SyncLogStore,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            feeds,
            articles,
            sync_logs,
            config,
        }
    }

    /// Queue selection. Chronically failing feeds are force-disabled before
    /// candidates are picked, so a disabled feed can never be handed out.
    pub async fn pending_feeds(
        &self,
        limit: i64,
        skip_recent_success: bool,
        success_interval_minutes: Option<i64>,
    ) -> Result<PendingFeedsResponse> {
        let disabled = self
            .feeds
            .auto_disable_failed(self.config.auto_disable_threshold)
            .await?;
        if !disabled.is_empty() {
            tracing::warn!(
                count = disabled.len(),
                feeds = ?disabled,
                "Auto-disabled chronically failing feeds"
            );
        }

        let feeds = self
            .feeds
            .pending_for_sync(
                limit,
                self.config.auto_disable_threshold,
                self.config.lease_timeout,
                skip_recent_success,
                success_interval_minutes.unwrap_or(self.config.sync_success_interval_minutes),
            )
            .await?;

        tracing::info!(count = feeds.len(), limit, "Selected feeds for sync");

        Ok(PendingFeedsResponse {
            feeds,
            disabled_feeds_count: disabled.len(),
            timestamp: chrono::Utc::now(),
        })
    }

    /// Lease acquisition. Exactly one of two racing workers wins; the loser
    /// sees a conflict naming the current holder.
    pub async fn claim_feed(&self, feed_id: &str, crawler_id: &str) -> Result<Feed> {
        let claimed = self
            .feeds
            .claim(
                feed_id,
                crawler_id,
                self.config.auto_disable_threshold,
                self.config.lease_timeout,
            )
            .await?;

        match claimed {
            Some(feed) => {
                tracing::info!(feed_id, crawler_id, "Feed claimed");
                Ok(feed)
            }
            None => {
                // Distinguish why the CAS lost.
                let feed = self.feeds.get(feed_id).await?;
                if !feed.is_active {
                    return Err(AppError::conflict(format!("Feed {} is not active", feed_id)));
                }
                if feed.consecutive_failures >= self.config.auto_disable_threshold {
                    return Err(AppError::conflict(format!(
                        "Feed {} is disabled after {} consecutive failures",
                        feed_id, feed.consecutive_failures
                    )));
                }
                Err(AppError::LeaseConflict {
                    holder: feed.last_sync_crawler_id.unwrap_or_else(|| "unknown".to_string()),
                })
            }
        }
    }

    /// Result ingestion. Success inserts deduplicated articles and resets the
    /// health block; failure bumps the counter and may auto-disable in the
    /// same statement. Either way a sync log row is appended and the lease
    /// released.
    pub async fn submit_feed_result(
        &self,
        crawler_id: &str,
        request: SubmitFeedResultRequest,
    ) -> Result<SubmitFeedResultResponse> {
        let sync_id = Uuid::new_v4();
        let feed_id = request.feed_id.clone();

        // Idempotence guard: the feed must exist before anything mutates.
        self.feeds.get(&feed_id).await?;

        let (feed, inserted) = match request.status {
            SyncStatus::Ok => {
                let inserted = self
                    .articles
                    .insert_entries(&feed_id, self.config.max_article_retries, &request.articles)
                    .await?;
                tracing::info!(
                    feed_id = %feed_id,
                    received = request.articles.len(),
                    inserted,
                    "Ingested feed sync articles"
                );
                let feed = self.feeds.record_sync_success(&feed_id).await?;
                (feed, inserted)
            }
            SyncStatus::Failed | SyncStatus::None => {
                let error_message = request
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "sync failed".to_string());
                let feed = self
                    .feeds
                    .record_sync_failure(&feed_id, &error_message, self.config.auto_disable_threshold)
                    .await?;
                (feed, 0)
            }
        };

        let auto_disabled = !feed.is_active && feed.last_sync_status == SyncStatus::Failed;
        let status_str = match request.status {
            SyncStatus::Ok => "ok",
            _ => "failed",
        };

        self.sync_logs
            .append(&NewFeedSyncLog {
                sync_id,
                feed_id: Some(feed_id.clone()),
                crawler_id: Some(crawler_id.to_string()),
                status: status_str.to_string(),
                total_time: request.total_time,
                fetch_time: request.fetch_time,
                parse_time: request.parse_time,
                feed_url: request.feed_url.clone(),
                response_status: request.response_status,
                entries_found: request.entries_found,
                new_articles: Some(inserted as i32),
                error_message: request.error_message.clone(),
                triggered_by: Some("crawler".to_string()),
                details: Some(json!({
                    "error_type": request.error_type,
                    "consecutive_failures": feed.consecutive_failures,
                    "auto_disabled": auto_disabled,
                })),
            })
            .await?;

        let message = match request.status {
            SyncStatus::Ok => format!("sync ok, {} new articles", inserted),
            _ if auto_disabled => format!(
                "sync failed, feed auto-disabled after {} consecutive failures",
                feed.consecutive_failures
            ),
            _ => format!("sync failed, {} consecutive failures", feed.consecutive_failures),
        };

        tracing::info!(
            feed_id = %feed_id,
            crawler_id,
            status = status_str,
            consecutive_failures = feed.consecutive_failures,
            auto_disabled,
            "Recorded feed sync result"
        );

        Ok(SubmitFeedResultResponse {
            sync_id,
            feed_id,
            status: request.status,
            new_articles: inserted,
            consecutive_failures: feed.consecutive_failures,
            auto_disabled,
            message,
        })
    }

    pub async fn sync_stats(&self) -> Result<FeedSyncStats> {
        let mut stats = self
            .feeds
            .sync_stats(self.config.auto_disable_threshold, self.config.lease_timeout)
            .await?;
        let (success, failures) = self.sync_logs.recent_counts().await?;
        stats.recent_success = success;
        stats.recent_failures = failures;
        Ok(stats)
    }

    /// Operator reset; safe concurrently with an in-flight sync.
    pub async fn reset_feed_failures(
        &self,
        feed_id: Option<&str>,
        reactivate: bool,
    ) -> Result<u64> {
        let affected = self.feeds.reset_failures(feed_id, reactivate).await?;
        tracing::info!(?feed_id, reactivate, affected, "Reset feed failure counters");
        Ok(affected)
    }
}
