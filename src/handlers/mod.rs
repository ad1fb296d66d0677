//! HTTP surfaces: worker job endpoints and consumer read/transform APIs.

pub mod articles;
pub mod assistant;
pub mod crawler;
pub mod daily_summary;
pub mod feed_sync;
pub mod feeds;
pub mod hot_topics;
pub mod vectorization;
